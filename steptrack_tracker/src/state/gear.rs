//! Gear train projection.
//!
//! A driven axis never stores its own bearing; it is recomputed on every
//! read from the driving axis's unwrapped bearing so rounding error does
//! not compound across wraps.

use crate::reconcile::normalize_bearing;

/// Fixed gear pair between a driving and a driven axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearCoupling {
    /// Driving teeth / driven teeth.
    ratio: f64,
}

impl GearCoupling {
    pub const fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    /// Coupling from tooth counts.
    pub fn from_teeth(driving_teeth: u32, driven_teeth: u32) -> Self {
        Self::new(f64::from(driving_teeth) / f64::from(driven_teeth.max(1)))
    }

    /// Direct drive (motor axis).
    pub const fn direct() -> Self {
        Self::new(1.0)
    }

    #[inline]
    pub const fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Driven-axis bearing for a driving-axis unwrapped bearing.
    #[inline]
    pub fn project(&self, driving_bearing: f64) -> f64 {
        project(driving_bearing, self.ratio)
    }
}

/// `(driving_bearing * ratio) mod 360`, normalized to `[0, 360)`.
#[inline]
pub fn project(driving_bearing: f64, ratio: f64) -> f64 {
    normalize_bearing(driving_bearing * ratio)
}
