//! Knob accumulator: jog-wheel deltas → motor steps.
//!
//! Raw rotation deltas arrive at device rate and are summed into
//! `pending_delta`. Once per tick the sum is scaled by the gain curve and
//! added to a fractional `remainder`; the whole part is emitted as steps and
//! the fraction carries into the next tick exactly once.

use steptrack_common::config::KnobGainConfig;

/// Non-linear gain selected from the tick total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainCurve {
    fast_threshold: u32,
    slow_scale: f64,
    fast_scale: f64,
}

impl GainCurve {
    pub const fn new(fast_threshold: u32, slow_scale: f64, fast_scale: f64) -> Self {
        Self {
            fast_threshold,
            slow_scale,
            fast_scale,
        }
    }

    /// Scale for a tick whose raw deltas sum to `tick_total`.
    #[inline]
    pub fn scale(&self, tick_total: i32) -> f64 {
        if tick_total.unsigned_abs() <= self.fast_threshold {
            self.slow_scale
        } else {
            self.fast_scale
        }
    }
}

impl From<&KnobGainConfig> for GainCurve {
    fn from(cfg: &KnobGainConfig) -> Self {
        Self::new(cfg.fast_threshold, cfg.slow_scale, cfg.fast_scale)
    }
}

impl Default for GainCurve {
    fn default() -> Self {
        Self::from(&KnobGainConfig::default())
    }
}

/// Result of one non-empty drain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobTick {
    /// Raw delta summed over the tick.
    pub raw_delta: i32,
    /// Gain applied to it.
    pub scale: f64,
    /// Whole steps emitted (may be 0 with fractional gains).
    pub steps: i32,
}

/// Jog-wheel accumulator.
///
/// Invariant: `remainder` stays in `(-1, 1)`.
#[derive(Debug, Clone)]
pub struct KnobAccumulator {
    gain: GainCurve,
    pending_delta: i32,
    remainder: f64,
}

impl KnobAccumulator {
    pub fn new(gain: GainCurve) -> Self {
        Self {
            gain,
            pending_delta: 0,
            remainder: 0.0,
        }
    }

    /// Record one raw rotation event.
    #[inline]
    pub fn accumulate(&mut self, delta: i32) {
        self.pending_delta = self.pending_delta.saturating_add(delta);
    }

    /// Raw ticks accrued since the last drain.
    #[inline]
    pub fn pending_delta(&self) -> i32 {
        self.pending_delta
    }

    /// Fractional motion not yet emitted.
    #[inline]
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    /// Convert one tick's summed raw delta into whole motor steps.
    ///
    /// Callers skip the call entirely when `raw_delta_sum == 0`.
    pub fn drain(&mut self, raw_delta_sum: i32) -> i32 {
        let scale = self.gain.scale(raw_delta_sum);
        self.remainder +=
            f64::from(raw_delta_sum.signum()) * f64::from(raw_delta_sum.unsigned_abs()) * scale;
        let steps = self.remainder.trunc();
        self.remainder -= steps;
        steps as i32
    }

    /// Drain `pending_delta` if anything accrued this tick.
    pub fn drain_pending(&mut self) -> Option<KnobTick> {
        let raw_delta = std::mem::take(&mut self.pending_delta);
        if raw_delta == 0 {
            return None;
        }
        let scale = self.gain.scale(raw_delta);
        let steps = self.drain(raw_delta);
        Some(KnobTick {
            raw_delta,
            scale,
            steps,
        })
    }
}

impl Default for KnobAccumulator {
    fn default() -> Self {
        Self::new(GainCurve::default())
    }
}
