//! Velvet Floor: sub-bass warmth
//!
//! Taps a band-limited low-end layer (tunable 50-300 Hz lowpass), warms it
//! with saturation and blends it back under the dry signal scaled by
//! `depth`, so in-band content sees roughly (1 + depth) makeup while the
//! rest of the spectrum passes untouched.

use super::biquad::{BiquadFilter, CoeffCache, FilterKind, FilterSpec};
use super::saturation::SaturationCurve;
use super::{params, Result, Stage, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Velvet Floor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelvetFloorParams {
    /// Lowpass cutoff in Hz (50-300)
    pub frequency: f32,
    /// Saturation amount for the low layer (0-1)
    pub warmth: f32,
    /// Blend of the warmed layer under the dry signal (0-1)
    pub depth: f32,
}

impl Default for VelvetFloorParams {
    fn default() -> Self {
        Self {
            frequency: 120.0,
            warmth: 0.3,
            depth: 0.25,
        }
    }
}

impl VelvetFloorParams {
    fn clamped(self) -> Self {
        Self {
            frequency: self
                .frequency
                .clamp(params::FLOOR_FREQ_MIN, params::FLOOR_FREQ_MAX),
            warmth: self.warmth.clamp(0.0, 1.0),
            depth: self.depth.clamp(0.0, 1.0),
        }
    }
}

/// Sub-bass warmth stage
pub struct VelvetFloor {
    bypass: bool,
    sample_rate: f32,
    params: VelvetFloorParams,
    coeff_cache: CoeffCache,
    // One lowpass per channel; histories must never cross channels.
    lowpass: [BiquadFilter; MAX_CHANNELS],
    curve: SaturationCurve,
}

impl VelvetFloor {
    pub fn new(sample_rate: f32) -> Self {
        let params = VelvetFloorParams::default();
        let mut floor = Self {
            bypass: false,
            sample_rate,
            params,
            coeff_cache: CoeffCache::new(),
            lowpass: [BiquadFilter::bypass(), BiquadFilter::bypass()],
            curve: SaturationCurve::new(params.warmth),
        };
        floor.update_derived();
        floor
    }

    pub fn params(&self) -> VelvetFloorParams {
        self.params
    }

    pub fn set_params(&mut self, params: VelvetFloorParams) {
        self.params = params.clamped();
        self.update_derived();
        trace!(
            frequency = self.params.frequency,
            warmth = self.params.warmth,
            depth = self.params.depth,
            "Velvet Floor updated"
        );
    }

    fn update_derived(&mut self) {
        let spec = FilterSpec::new(
            FilterKind::Lowpass,
            self.params.frequency,
            0.707,
            0.0,
            self.sample_rate,
        );
        let coeffs = self.coeff_cache.get(spec);
        for filter in &mut self.lowpass {
            filter.set_coeffs(coeffs);
        }
        self.curve.set_amount(self.params.warmth);
    }
}

impl Stage for VelvetFloor {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass || self.params.depth == 0.0 {
            return Ok(());
        }

        for (ch, buffer) in channels.iter_mut().take(MAX_CHANNELS).enumerate() {
            let filter = &mut self.lowpass[ch];
            for sample in buffer.iter_mut() {
                let low = filter.process_sample(*sample);
                let warmed = self.curve.shape(low);
                *sample += warmed * self.params.depth;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for filter in &mut self.lowpass {
            filter.reset();
        }
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
        "VelvetFloor"
    }
}
