//! Calibration record: the last known raw-sensor ↔ bearing pair.
//!
//! The record lets a restarted tracker re-align its unwrapped bearing from
//! the first sensor reading instead of homing. Only the data model lives
//! here; storage backends belong to the tracker crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::FULL_TURN_DEG;

/// Last known `(raw_sensor_value, bearing)` pair.
///
/// Serialized as `{ last_bearing, last_raw }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Raw angle-sensor count observed at `bearing_at_that_raw`.
    #[serde(rename = "last_raw")]
    pub raw_sensor_value: i32,
    /// Unwrapped bearing [deg] at that raw count.
    #[serde(rename = "last_bearing")]
    pub bearing_at_that_raw: f64,
}

impl CalibrationRecord {
    pub const fn new(raw_sensor_value: i32, bearing_at_that_raw: f64) -> Self {
        Self {
            raw_sensor_value,
            bearing_at_that_raw,
        }
    }

    /// Signed shortest rotation [deg] from the stored raw count to `observed_raw`.
    ///
    /// The result lies in `[-180, 180)`.
    pub fn raw_delta_degrees(&self, observed_raw: i32, counts_per_rev: u32) -> f64 {
        let counts = i64::from(counts_per_rev.max(1));
        let mut delta = (i64::from(observed_raw) - i64::from(self.raw_sensor_value)).rem_euclid(counts);
        if delta * 2 >= counts {
            delta -= counts;
        }
        delta as f64 * FULL_TURN_DEG / counts as f64
    }

    /// Unwrapped bearing implied by a fresh raw reading.
    ///
    /// The stored bearing stays authoritative; only the raw movement since
    /// the record was written is carried into it.
    pub fn aligned_bearing(&self, observed_raw: i32, counts_per_rev: u32) -> f64 {
        self.bearing_at_that_raw + self.raw_delta_degrees(observed_raw, counts_per_rev)
    }

    /// Raw count the sensor should report at `bearing_deg`.
    pub fn predicted_raw(&self, bearing_deg: f64, counts_per_rev: u32) -> i32 {
        let counts = i64::from(counts_per_rev.max(1));
        let offset_deg = bearing_deg - self.bearing_at_that_raw;
        let offset_counts = (offset_deg / FULL_TURN_DEG * counts as f64).round() as i64;
        (i64::from(self.raw_sensor_value) + offset_counts).rem_euclid(counts) as i32
    }

    /// Predicted raw count for every integer degree `0..360`.
    pub fn lookup_table(&self, counts_per_rev: u32) -> BTreeMap<u16, i32> {
        (0..360u16)
            .map(|deg| (deg, self.predicted_raw(f64::from(deg), counts_per_rev)))
            .collect()
    }
}
