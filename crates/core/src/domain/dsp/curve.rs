//! Velvet Curve: multiband (low-band) compression
//!
//! Splits the signal at a crossover frequency into low and high bands via a
//! lowpass/highpass biquad pair, compresses only the low band with an
//! envelope follower and dB-domain gain computer, and recombines
//! `compressedLow + unmodifiedHigh`. Every channel keeps independent filter
//! and envelope state.

use super::biquad::{BiquadFilter, CoeffCache, FilterKind, FilterSpec};
use super::envelope::{EnvelopeFollower, GainComputer};
use super::{params, Result, Stage, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Velvet Curve parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelvetCurveParams {
    /// Band split frequency in Hz
    pub crossover: f32,
    /// Low-band compression threshold in dB
    pub threshold_db: f32,
    /// Low-band compression ratio (1:1 to 20:1)
    pub ratio: f32,
    /// Envelope attack time in seconds
    pub attack_sec: f32,
    /// Envelope release time in seconds
    pub release_sec: f32,
}

impl Default for VelvetCurveParams {
    fn default() -> Self {
        Self {
            crossover: 150.0,
            threshold_db: -24.0,
            ratio: 3.0,
            attack_sec: 0.01,
            release_sec: 0.15,
        }
    }
}

impl VelvetCurveParams {
    fn clamped(self) -> Self {
        Self {
            crossover: self
                .crossover
                .clamp(params::CROSSOVER_MIN, params::CROSSOVER_MAX),
            threshold_db: self.threshold_db.clamp(params::DB_MIN, 0.0),
            ratio: self.ratio.clamp(params::RATIO_MIN, params::RATIO_MAX),
            attack_sec: self.attack_sec.clamp(params::ATTACK_MIN, params::ATTACK_MAX),
            release_sec: self
                .release_sec
                .clamp(params::RELEASE_MIN, params::RELEASE_MAX),
        }
    }
}

/// Per-channel band-split and compression state
struct ChannelState {
    lowpass: BiquadFilter,
    highpass: BiquadFilter,
    envelope: EnvelopeFollower,
}

impl ChannelState {
    fn new(sample_rate: f32, p: &VelvetCurveParams) -> Self {
        Self {
            lowpass: BiquadFilter::bypass(),
            highpass: BiquadFilter::bypass(),
            envelope: EnvelopeFollower::new(p.attack_sec, p.release_sec, sample_rate),
        }
    }

    fn reset(&mut self) {
        self.lowpass.reset();
        self.highpass.reset();
        self.envelope.reset();
    }
}

/// Multiband compressor stage
pub struct VelvetCurve {
    bypass: bool,
    sample_rate: f32,
    params: VelvetCurveParams,
    computer: GainComputer,
    low_cache: CoeffCache,
    high_cache: CoeffCache,
    channels: [ChannelState; MAX_CHANNELS],
}

impl VelvetCurve {
    pub fn new(sample_rate: f32) -> Self {
        let p = VelvetCurveParams::default();
        let mut curve = Self {
            bypass: false,
            sample_rate,
            params: p,
            computer: GainComputer::new(p.threshold_db, p.ratio),
            low_cache: CoeffCache::new(),
            high_cache: CoeffCache::new(),
            channels: [
                ChannelState::new(sample_rate, &p),
                ChannelState::new(sample_rate, &p),
            ],
        };
        curve.update_derived();
        curve
    }

    pub fn params(&self) -> VelvetCurveParams {
        self.params
    }

    pub fn set_params(&mut self, params: VelvetCurveParams) {
        self.params = params.clamped();
        self.update_derived();
        trace!(
            crossover = self.params.crossover,
            threshold_db = self.params.threshold_db,
            ratio = self.params.ratio,
            "Velvet Curve updated"
        );
    }

    fn update_derived(&mut self) {
        let low = self.low_cache.get(FilterSpec::new(
            FilterKind::Lowpass,
            self.params.crossover,
            0.707,
            0.0,
            self.sample_rate,
        ));
        let high = self.high_cache.get(FilterSpec::new(
            FilterKind::Highpass,
            self.params.crossover,
            0.707,
            0.0,
            self.sample_rate,
        ));
        for ch in &mut self.channels {
            ch.lowpass.set_coeffs(low);
            ch.highpass.set_coeffs(high);
            ch.envelope
                .set_times(self.params.attack_sec, self.params.release_sec, self.sample_rate);
        }
        self.computer = GainComputer::new(self.params.threshold_db, self.params.ratio);
    }
}

impl Stage for VelvetCurve {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }

        for (idx, buffer) in channels.iter_mut().take(MAX_CHANNELS).enumerate() {
            let state = &mut self.channels[idx];
            for sample in buffer.iter_mut() {
                let x = *sample;
                let low = state.lowpass.process_sample(x);
                let high = state.highpass.process_sample(x);
                let env = state.envelope.update(low);
                let gain = self.computer.gain_for(env);
                *sample = low * gain + high;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
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
        "VelvetCurve"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn sine(freq: f32, amplitude: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn test_compresses_loud_low_band() {
        let mut curve = VelvetCurve::new(SAMPLE_RATE);
        curve.set_params(VelvetCurveParams {
            crossover: 200.0,
            threshold_db: -20.0,
            ratio: 6.0,
            attack_sec: 0.002,
            release_sec: 0.05,
        });

        let mut low = sine(60.0, 0.9, 96000); // ~-1 dB, well above threshold
        let dry_rms = rms(&low[48000..]);
        curve.process_block(&mut [&mut low]).unwrap();
        let wet_rms = rms(&low[48000..]);
        assert!(
            wet_rms < dry_rms * 0.7,
            "loud low band should be compressed: {dry_rms} -> {wet_rms}"
        );
    }

    #[test]
    fn test_high_band_passes_while_low_compressed() {
        let mut curve = VelvetCurve::new(SAMPLE_RATE);
        curve.set_params(VelvetCurveParams {
            crossover: 200.0,
            threshold_db: -20.0,
            ratio: 8.0,
            attack_sec: 0.002,
            release_sec: 0.05,
        });

        let mut high = sine(5000.0, 0.9, 96000);
        let dry_rms = rms(&high[48000..]);
        curve.process_block(&mut [&mut high]).unwrap();
        let wet_rms = rms(&high[48000..]);
        assert!(
            (wet_rms / dry_rms - 1.0).abs() < 0.1,
            "high band should not be compressed: {dry_rms} -> {wet_rms}"
        );
    }

    #[test]
    fn test_quiet_signal_untouched_in_level() {
        let mut curve = VelvetCurve::new(SAMPLE_RATE);
        curve.set_params(VelvetCurveParams {
            threshold_db: -10.0,
            ratio: 4.0,
            ..Default::default()
        });

        // -40 dB low tone stays below threshold: band split recombination
        // should be level-neutral within crossover phase error.
        let mut quiet = sine(60.0, 0.01, 96000);
        let dry_rms = rms(&quiet[48000..]);
        curve.process_block(&mut [&mut quiet]).unwrap();
        let wet_rms = rms(&quiet[48000..]);
        assert!((wet_rms / dry_rms - 1.0).abs() < 0.25);
    }

    #[test]
    fn test_stereo_channels_independent() {
        let mut curve = VelvetCurve::new(SAMPLE_RATE);
        curve.set_params(VelvetCurveParams {
            threshold_db: -20.0,
            ratio: 8.0,
            ..Default::default()
        });

        // Loud left, silent right: the right channel must stay silent, with
        // no envelope or filter history leaking across.
        let mut left = sine(60.0, 0.9, 4800);
        let mut right = vec![0.0; 4800];
        curve.process_block(&mut [&mut left, &mut right]).unwrap();
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reset_clears_envelope() {
        let mut curve = VelvetCurve::new(SAMPLE_RATE);
        let mut loud = sine(60.0, 0.9, 4800);
        curve.process_block(&mut [&mut loud]).unwrap();

        curve.reset();
        let mut silence = vec![0.0; 256];
        curve.process_block(&mut [&mut silence]).unwrap();
        assert!(silence.iter().all(|&s| s.abs() < 1e-9));
    }
}
