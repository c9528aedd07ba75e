//! Phase Weave: mid/side stereo width control
//!
//! Encodes stereo to mid `(L+R)/2` and side `(L-R)/2`, scales the side by a
//! width factor and decodes back. With `mono_below` set, each channel is
//! split at that frequency and the low band is forced to mono while width
//! applies only above the split point, preventing low-frequency phase
//! cancellation on mono playback systems.
//!
//! Mono input degrades to pass-through; this stage never errors.

use super::biquad::{BiquadFilter, CoeffCache, FilterKind, FilterSpec};
use super::{params, Result, Stage, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Phase Weave parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseWeaveParams {
    /// Side gain: 0 = mono, 1 = unity, >1 = exaggerated
    pub width: f32,
    /// Frequency below which the signal is forced to mono; 0 disables
    pub mono_below: f32,
}

impl Default for PhaseWeaveParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            mono_below: 0.0,
        }
    }
}

impl PhaseWeaveParams {
    fn clamped(self) -> Self {
        Self {
            width: self.width.clamp(params::WIDTH_MIN, params::WIDTH_MAX),
            mono_below: self.mono_below.clamp(0.0, 300.0),
        }
    }
}

/// Stereo width stage
pub struct PhaseWeave {
    bypass: bool,
    sample_rate: f32,
    params: PhaseWeaveParams,
    low_cache: CoeffCache,
    high_cache: CoeffCache,
    // Band-split filters, one pair per channel, used only when mono_below > 0.
    lowpass: [BiquadFilter; MAX_CHANNELS],
    highpass: [BiquadFilter; MAX_CHANNELS],
}

impl PhaseWeave {
    pub fn new(sample_rate: f32) -> Self {
        let mut weave = Self {
            bypass: false,
            sample_rate,
            params: PhaseWeaveParams::default(),
            low_cache: CoeffCache::new(),
            high_cache: CoeffCache::new(),
            lowpass: [BiquadFilter::bypass(), BiquadFilter::bypass()],
            highpass: [BiquadFilter::bypass(), BiquadFilter::bypass()],
        };
        weave.update_derived();
        weave
    }

    pub fn params(&self) -> PhaseWeaveParams {
        self.params
    }

    pub fn set_params(&mut self, params: PhaseWeaveParams) {
        self.params = params.clamped();
        self.update_derived();
        trace!(
            width = self.params.width,
            mono_below = self.params.mono_below,
            "Phase Weave updated"
        );
    }

    fn update_derived(&mut self) {
        if self.params.mono_below <= 0.0 {
            return;
        }
        let low = self.low_cache.get(FilterSpec::new(
            FilterKind::Lowpass,
            self.params.mono_below,
            0.707,
            0.0,
            self.sample_rate,
        ));
        let high = self.high_cache.get(FilterSpec::new(
            FilterKind::Highpass,
            self.params.mono_below,
            0.707,
            0.0,
            self.sample_rate,
        ));
        for ch in 0..MAX_CHANNELS {
            self.lowpass[ch].set_coeffs(low);
            self.highpass[ch].set_coeffs(high);
        }
    }

    #[inline]
    fn weave(width: f32, left: f32, right: f32) -> (f32, f32) {
        let mid = (left + right) * 0.5;
        let side = (left - right) * 0.5 * width;
        (mid + side, mid - side)
    }
}

impl Stage for PhaseWeave {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        // Width is meaningless without a second channel.
        let Some((left, rest)) = channels.split_first_mut() else {
            return Ok(());
        };
        let Some(right) = rest.first_mut() else {
            return Ok(());
        };

        let width = self.params.width;
        let split = self.params.mono_below > 0.0;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            if split {
                let low_l = self.lowpass[0].process_sample(*l);
                let low_r = self.lowpass[1].process_sample(*r);
                let high_l = self.highpass[0].process_sample(*l);
                let high_r = self.highpass[1].process_sample(*r);

                // Low band collapses to mono on both sides; width only
                // touches the band above the split point.
                let low_mono = (low_l + low_r) * 0.5;
                let (wide_l, wide_r) = Self::weave(width, high_l, high_r);
                *l = low_mono + wide_l;
                *r = low_mono + wide_r;
            } else {
                let (out_l, out_r) = Self::weave(width, *l, *r);
                *l = out_l;
                *r = out_r;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for ch in 0..MAX_CHANNELS {
            self.lowpass[ch].reset();
            self.highpass[ch].reset();
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
        "PhaseWeave"
    }
}
