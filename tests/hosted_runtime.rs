//! End-to-end runs of the two-context runtime on the hosted port.
//!
//! Each machine's background thread stays parked after the test ends and
//! is reclaimed when the test process exits.

use serial_test::serial;

use twotask::arch::hosted::Machine;
use twotask::{Guarded, HandoffQueue};

/// Each background slice reports its number here.
static REPORTS: HandoffQueue<u32, ()> = HandoffQueue::new();
static SLICE: Guarded<u32> = Guarded::new(0);

fn reporting_worker() {
    let n = SLICE.update(|n| n + 1);
    REPORTS.try_provide(n);
}

/// Foreground: acknowledge the pending report, if any.
fn next_report() -> Option<u32> {
    let n = REPORTS.try_process()?;
    assert!(REPORTS.try_complete(()));
    assert_eq!(REPORTS.try_consume(), Some(()));
    Some(n)
}

#[test]
#[serial]
fn test_yield_runs_worker_without_advancing_tick() {
    let machine = Machine::with_background(reporting_worker, 256 * 1024).unwrap();
    assert_eq!(machine.current_tick(), 0);
    assert_eq!(next_report(), None, "bootstrap does not run the worker");

    for expected in 1..=3 {
        machine.advance(1);
        assert_eq!(next_report(), Some(expected));
    }
    assert_eq!(machine.current_tick(), 3);

    machine.yield_now();
    assert_eq!(machine.current_tick(), 3, "yield is not elapsed time");
    assert_eq!(next_report(), Some(4), "worker ran once more");
    assert!(REPORTS.is_idle());
}

static WORK: Guarded<u64> = Guarded::new(0);

fn busy_worker() {
    WORK.update(|n| n.wrapping_mul(31).wrapping_add(7));
}

#[test]
#[serial]
fn test_stack_high_water_mark_is_bounded() {
    const STACK: usize = 64 * 1024;

    let machine = Machine::with_background(busy_worker, STACK).unwrap();
    assert_eq!(machine.max_background_stack_usage(), 0);

    let mut previous = 0;
    for _ in 0..20 {
        machine.advance(1);
        machine.yield_now();
        let mark = machine.max_background_stack_usage();
        assert!(mark >= previous);
        assert!(mark <= STACK);
        previous = mark;
    }
    assert!(previous > 0);
    assert_eq!(machine.current_tick(), 20);
}

#[test]
#[serial]
fn test_timer_only_never_switches() {
    let machine = Machine::timer_only().unwrap();
    machine.advance(7);
    machine.yield_now();
    assert_eq!(machine.current_tick(), 7);
    assert_eq!(machine.max_background_stack_usage(), 0);
}
