//! Look-ahead true-peak limiter
//!
//! The audio path is delayed by the look-ahead length so the gain decision,
//! computed from samples the output has not reached yet, lands before the
//! transient does. Peak detection estimates inter-sample overs by linearly
//! interpolating between consecutive raw samples, approximating oversampled
//! detection without the oversampler.
//!
//! Detection is stereo-linked: one gain value drives every channel, so a
//! transient on one side never skews the stereo image.

use super::{params, Result, Stage, MAX_CHANNELS};
use crate::domain::audio::db_to_gain;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Extra ring-buffer slots beyond the look-ahead length
const LOOKAHEAD_MARGIN: usize = 8;

/// Fixed attack time for the applied-gain smoother, seconds
const ATTACK_SECONDS: f32 = 0.001;

/// Fractional positions probed between consecutive samples
const INTERP_FRACTIONS: [f32; 3] = [0.25, 0.5, 0.75];

/// Estimate the true peak of the segment between two consecutive samples
///
/// Compares both endpoints and three interpolated positions; the maximum
/// absolute value approximates what an oversampled detector would see.
#[inline]
pub fn inter_sample_peak(prev: f32, curr: f32) -> f32 {
    let mut peak = prev.abs().max(curr.abs());
    for f in INTERP_FRACTIONS {
        peak = peak.max((prev + (curr - prev) * f).abs());
    }
    peak
}

/// True-peak limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruePeakLimiterParams {
    /// Output ceiling in dBFS
    pub threshold_db: f32,
    /// Look-ahead (and path delay) in milliseconds
    pub lookahead_ms: f32,
    /// Release time in seconds
    pub release: f32,
}

impl Default for TruePeakLimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -1.0,
            lookahead_ms: 1.5,
            release: 0.05,
        }
    }
}

impl TruePeakLimiterParams {
    fn clamped(self) -> Self {
        Self {
            threshold_db: self.threshold_db.clamp(-6.0, 0.0),
            lookahead_ms: self
                .lookahead_ms
                .clamp(params::LOOKAHEAD_MS_MIN, params::LOOKAHEAD_MS_MAX),
            release: self.release.clamp(params::RELEASE_MIN, params::RELEASE_MAX),
        }
    }
}

/// Look-ahead true-peak limiter stage
pub struct TruePeakLimiter {
    bypass: bool,
    sample_rate: f32,
    params: TruePeakLimiterParams,

    // Derived on parameter change, read-only in the block path.
    threshold_lin: f32,
    lookahead_samples: usize,
    attack_coeff: f32,
    release_coeff: f32,

    // Ring buffers sized for the maximum look-ahead at construction so a
    // parameter change never allocates.
    delay: [Vec<f32>; MAX_CHANNELS],
    capacity: usize,
    write_pos: usize,
    prev_raw: [f32; MAX_CHANNELS],

    /// Worst-case gain held across the current transient
    target_gain: f32,
    /// Smoothed gain actually multiplied into the output
    applied_gain: f32,
}

impl TruePeakLimiter {
    pub fn new(sample_rate: f32) -> Self {
        let capacity =
            (params::LOOKAHEAD_MS_MAX / 1000.0 * sample_rate) as usize + LOOKAHEAD_MARGIN;
        let mut limiter = Self {
            bypass: false,
            sample_rate,
            params: TruePeakLimiterParams::default(),
            threshold_lin: 1.0,
            lookahead_samples: 0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            delay: [vec![0.0; capacity], vec![0.0; capacity]],
            capacity,
            write_pos: 0,
            prev_raw: [0.0; MAX_CHANNELS],
            target_gain: 1.0,
            applied_gain: 1.0,
        };
        limiter.update_derived();
        limiter
    }

    pub fn params(&self) -> TruePeakLimiterParams {
        self.params
    }

    pub fn set_params(&mut self, params: TruePeakLimiterParams) {
        self.params = params.clamped();
        self.update_derived();
        trace!(
            threshold_db = self.params.threshold_db,
            lookahead_ms = self.params.lookahead_ms,
            release = self.params.release,
            "limiter updated"
        );
    }

    /// Path delay introduced by the look-ahead buffer, in samples
    pub fn latency_samples(&self) -> usize {
        self.lookahead_samples
    }

    fn update_derived(&mut self) {
        self.threshold_lin = db_to_gain(self.params.threshold_db);
        self.lookahead_samples = ((self.params.lookahead_ms / 1000.0 * self.sample_rate) as usize)
            .min(self.capacity - 1)
            .max(1);
        self.attack_coeff = (-1.0 / (ATTACK_SECONDS * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (self.params.release * self.sample_rate)).exp();
    }
}

impl Stage for TruePeakLimiter {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass || channels.is_empty() {
            return Ok(());
        }
        let samples = channels[0].len();
        let active = channels.len().min(MAX_CHANNELS);

        for i in 0..samples {
            // (a) stereo-linked inter-sample peak over all channels
            let mut peak = 0.0_f32;
            for ch in 0..active {
                let Some(&x) = channels[ch].get(i) else {
                    continue;
                };
                peak = peak.max(inter_sample_peak(self.prev_raw[ch], x));
            }

            // (b) gain only ratchets down while a transient is in flight;
            // otherwise it relaxes toward unity at the release rate
            if peak > self.threshold_lin {
                self.target_gain = self.target_gain.min(self.threshold_lin / peak);
            } else {
                self.target_gain = 1.0 + self.release_coeff * (self.target_gain - 1.0);
            }

            // (c) asymmetric one-pole smoothing of the applied gain
            let coeff = if self.target_gain < self.applied_gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.applied_gain = self.target_gain + coeff * (self.applied_gain - self.target_gain);

            // (d) exchange the raw sample for the delayed one and apply gain
            let read_pos = (self.write_pos + self.capacity - self.lookahead_samples) % self.capacity;
            for ch in 0..active {
                let Some(sample) = channels[ch].get_mut(i) else {
                    continue;
                };
                let x = *sample;
                self.delay[ch][self.write_pos] = x;
                *sample = self.delay[ch][read_pos] * self.applied_gain;
                self.prev_raw[ch] = x;
            }
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for ring in &mut self.delay {
            ring.fill(0.0);
        }
        self.write_pos = 0;
        self.prev_raw = [0.0; MAX_CHANNELS];
        self.target_gain = 1.0;
        self.applied_gain = 1.0;
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "TruePeakLimiter"
    }
}
