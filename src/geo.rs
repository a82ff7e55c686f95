//! # Geospatial Handoff
//!
//! A [`HandoffQueue`] specialised for position fixes. The provider pushes
//! raw points; each fix also carries the configured start point and the
//! previously provided point, so the processor can derive bearing and
//! distance to both without keeping state of its own. The result stage
//! carries those four figures back as a [`GeoLeg`].

use crate::handoff::HandoffQueue;
use crate::sync::Guarded;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// What the processor receives for every provided point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub current: GeoPoint,
    /// Start point as configured when `current` was provided.
    pub start: GeoPoint,
    /// The point provided before `current`.
    pub last: GeoPoint,
}

/// Processor result for one fix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoLeg {
    pub bearing_start: f64,
    pub bearing_current: f64,
    pub distance_start: f64,
    pub distance_current: f64,
}

/// Position channel with a configurable start point.
///
/// ```
/// use twotask::geo::{GeoChannel, GeoLeg, GeoPoint};
///
/// static ROUTE: GeoChannel = GeoChannel::new(GeoPoint::new(51.5, -0.12));
///
/// assert!(ROUTE.try_provide(GeoPoint::new(51.6, -0.10)));
/// let fix = ROUTE.try_process().unwrap();
/// assert_eq!(fix.last, GeoPoint::new(51.5, -0.12));
/// assert!(ROUTE.try_complete(GeoLeg::default()));
/// ```
pub struct GeoChannel {
    queue: HandoffQueue<GeoFix, GeoLeg>,
    start: Guarded<GeoPoint>,
    /// Reported as the last point until the first fix is provided.
    origin: GeoPoint,
}

impl GeoChannel {
    /// A channel whose start point and initial last point are `start`.
    pub const fn new(start: GeoPoint) -> Self {
        Self {
            queue: HandoffQueue::new(),
            start: Guarded::new(start),
            origin: start,
        }
    }

    /// Change the start point attached to subsequent fixes.
    pub fn set_start(&self, point: GeoPoint) {
        self.start.set(point);
    }

    /// Most recently provided point, or the initial start point.
    pub fn last_point(&self) -> GeoPoint {
        self.queue
            .last_provided()
            .map_or(self.origin, |fix| fix.current)
    }

    /// Provider: hand `point` to the processor.
    ///
    /// The start point is read in the same critical section as the publish,
    /// so a concurrent `set_start` lands either wholly before or after it.
    pub fn try_provide(&self, point: GeoPoint) -> bool {
        let origin = self.origin;
        self.queue.try_provide_with(|cs, previous| GeoFix {
            current: point,
            start: self.start.get_in(cs),
            last: previous.map_or(origin, |fix| fix.current),
        })
    }

    /// Processor: take the pending fix.
    pub fn try_process(&self) -> Option<GeoFix> {
        self.queue.try_process()
    }

    /// Processor: publish the leg for the pending fix.
    pub fn try_complete(&self, leg: GeoLeg) -> bool {
        self.queue.try_complete(leg)
    }

    /// Consumer: take the latest leg.
    pub fn try_consume(&self) -> Option<GeoLeg> {
        self.queue.try_consume()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
