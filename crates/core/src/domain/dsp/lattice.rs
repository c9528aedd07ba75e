//! Harmonic Lattice: presence/air EQ with saturation
//!
//! Peaking bell around 1 kHz driven by `presence`, high shelf at 8 kHz
//! driven by `airiness`, then a gentle saturation stage driven by
//! `character`. Both filters keep independent per-channel state.

use super::biquad::{BiquadFilter, CoeffCache, FilterKind, FilterSpec};
use super::saturation::SaturationCurve;
use super::{Result, Stage, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Peaking bell center frequency
const PRESENCE_FREQ: f32 = 1000.0;
/// High shelf corner frequency
const AIR_FREQ: f32 = 8000.0;
/// Maximum boost the presence/airiness controls map to, in dB
const MAX_BOOST_DB: f32 = 6.0;

/// Harmonic Lattice parameters, each normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicLatticeParams {
    /// Peaking gain drive around 1 kHz
    pub presence: f32,
    /// High-shelf gain drive above 8 kHz
    pub airiness: f32,
    /// Saturation amount applied after the EQ
    pub character: f32,
}

impl Default for HarmonicLatticeParams {
    fn default() -> Self {
        Self {
            presence: 0.2,
            airiness: 0.2,
            character: 0.15,
        }
    }
}

impl HarmonicLatticeParams {
    fn clamped(self) -> Self {
        Self {
            presence: self.presence.clamp(0.0, 1.0),
            airiness: self.airiness.clamp(0.0, 1.0),
            character: self.character.clamp(0.0, 1.0),
        }
    }
}

/// Presence/air stage
pub struct HarmonicLattice {
    bypass: bool,
    sample_rate: f32,
    params: HarmonicLatticeParams,
    peak_cache: CoeffCache,
    shelf_cache: CoeffCache,
    peaking: [BiquadFilter; MAX_CHANNELS],
    shelf: [BiquadFilter; MAX_CHANNELS],
    curve: SaturationCurve,
}

impl HarmonicLattice {
    pub fn new(sample_rate: f32) -> Self {
        let params = HarmonicLatticeParams::default();
        let mut lattice = Self {
            bypass: false,
            sample_rate,
            params,
            peak_cache: CoeffCache::new(),
            shelf_cache: CoeffCache::new(),
            peaking: [BiquadFilter::bypass(), BiquadFilter::bypass()],
            shelf: [BiquadFilter::bypass(), BiquadFilter::bypass()],
            curve: SaturationCurve::new(params.character),
        };
        lattice.update_derived();
        lattice
    }

    pub fn params(&self) -> HarmonicLatticeParams {
        self.params
    }

    pub fn set_params(&mut self, params: HarmonicLatticeParams) {
        self.params = params.clamped();
        self.update_derived();
        trace!(
            presence = self.params.presence,
            airiness = self.params.airiness,
            character = self.params.character,
            "Harmonic Lattice updated"
        );
    }

    fn update_derived(&mut self) {
        let peak = self.peak_cache.get(FilterSpec::new(
            FilterKind::Peaking,
            PRESENCE_FREQ,
            1.0,
            self.params.presence * MAX_BOOST_DB,
            self.sample_rate,
        ));
        let shelf = self.shelf_cache.get(FilterSpec::new(
            FilterKind::HighShelf,
            AIR_FREQ,
            0.707,
            self.params.airiness * MAX_BOOST_DB,
            self.sample_rate,
        ));
        for ch in 0..MAX_CHANNELS {
            self.peaking[ch].set_coeffs(peak);
            self.shelf[ch].set_coeffs(shelf);
        }
        self.curve.set_amount(self.params.character);
    }
}

impl Stage for HarmonicLattice {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for (ch, buffer) in channels.iter_mut().take(MAX_CHANNELS).enumerate() {
            let peaking = &mut self.peaking[ch];
            let shelf = &mut self.shelf[ch];
            for sample in buffer.iter_mut() {
                let presence = peaking.process_sample(*sample);
                let air = shelf.process_sample(presence);
                *sample = self.curve.shape(air);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for ch in 0..MAX_CHANNELS {
            self.peaking[ch].reset();
            self.shelf[ch].reset();
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
        "HarmonicLattice"
    }
}
