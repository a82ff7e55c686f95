use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    // Only bare-metal ARM builds link against cortex-m-rt's link.x.
    let target = env::var("TARGET").unwrap();
    if !target.starts_with("thumb") {
        return;
    }

    // Copy memory.x into OUT_DIR so the linker can find it
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::copy("memory.x", out_dir.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
}
