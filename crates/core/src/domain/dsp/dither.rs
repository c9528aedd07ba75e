//! TPDF dither: last stage before the chain's output
//!
//! Adds triangular-probability-density noise (the sum of two independent
//! uniforms minus one) at roughly -90 dBFS to every sample. Each channel
//! draws its own noise so the dither never correlates across the stereo
//! image. The generator is a plain xorshift64, deterministic from its seed.

use super::{Result, Stage};
use crate::domain::audio::db_to_gain;
use serde::{Deserialize, Serialize};

const DEFAULT_SEED: u64 = 0x853c49e6748fea9b;

/// Minimal xorshift64 PRNG, allocation-free and branch-free
#[derive(Debug, Clone)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    #[inline]
    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in [0, 1)
    #[inline]
    fn next_unit(&mut self) -> f32 {
        (self.next() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Dither parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DitherParams {
    /// Noise amplitude in dBFS
    pub amplitude_db: f32,
}

impl Default for DitherParams {
    fn default() -> Self {
        Self { amplitude_db: -90.0 }
    }
}

/// TPDF dither stage
pub struct Dither {
    bypass: bool,
    params: DitherParams,
    amplitude: f32,
    rng: XorShift64,
}

impl Dither {
    pub fn new() -> Self {
        let params = DitherParams::default();
        Self {
            bypass: false,
            amplitude: db_to_gain(params.amplitude_db),
            params,
            rng: XorShift64::new(DEFAULT_SEED),
        }
    }

    pub fn params(&self) -> DitherParams {
        self.params
    }

    pub fn set_params(&mut self, params: DitherParams) {
        self.params = DitherParams {
            amplitude_db: params.amplitude_db.clamp(-120.0, -60.0),
        };
        self.amplitude = db_to_gain(self.params.amplitude_db);
    }

    /// Draw one triangular-distributed noise value in [-amplitude, amplitude]
    #[inline]
    fn next_noise(&mut self) -> f32 {
        (self.rng.next_unit() + self.rng.next_unit() - 1.0) * self.amplitude
    }
}

impl Default for Dither {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Dither {
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        if self.bypass {
            return Ok(());
        }
        for buffer in channels.iter_mut() {
            for sample in buffer.iter_mut() {
                *sample += self.next_noise();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rng = XorShift64::new(DEFAULT_SEED);
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "Dither"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_bounded() {
        let mut dither = Dither::new();
        let amplitude = db_to_gain(-90.0);
        for _ in 0..10_000 {
            let n = dither.next_noise();
            assert!(n.abs() <= amplitude + f32::EPSILON);
        }
    }

    #[test]
    fn test_noise_is_near_zero_mean() {
        let mut dither = Dither::new();
        let sum: f64 = (0..100_000).map(|_| dither.next_noise() as f64).sum();
        let mean = sum / 100_000.0;
        let amplitude = db_to_gain(-90.0) as f64;
        assert!(
            mean.abs() < amplitude * 0.05,
            "mean {mean} too far from zero"
        );
    }

    #[test]
    fn test_channels_get_independent_noise() {
        let mut dither = Dither::new();
        let mut left = vec![0.0_f32; 256];
        let mut right = vec![0.0_f32; 256];
        dither.process_block(&mut [&mut left, &mut right]).unwrap();

        let identical = left.iter().zip(right.iter()).all(|(l, r)| l == r);
        assert!(!identical, "stereo dither must be decorrelated");
    }

    #[test]
    fn test_deterministic_after_reset() {
        let mut dither = Dither::new();
        let mut first = vec![0.0_f32; 64];
        dither.process_block(&mut [&mut first]).unwrap();

        dither.reset();
        let mut second = vec![0.0_f32; 64];
        dither.process_block(&mut [&mut second]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_signal_is_barely_perturbed() {
        let mut dither = Dither::new();
        let mut signal = vec![0.5_f32; 128];
        dither.process_block(&mut [&mut signal]).unwrap();
        for &s in &signal {
            assert!((s - 0.5).abs() < 1e-4);
        }
    }
}
