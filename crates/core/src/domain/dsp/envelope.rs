//! Envelope following and dB-domain gain computation
//!
//! The envelope follower is a one-pole smoother with distinct attack and
//! release time constants; the gain computer applies a hard-knee
//! above-threshold curve in the dB domain. Together they form the
//! compression core used by the Velvet Curve's low band.

use crate::domain::audio::gain_to_db;
use serde::{Deserialize, Serialize};

/// One-pole envelope follower with asymmetric time constants
///
/// Holds a single smoothed magnitude estimate. One instance per channel;
/// channel envelopes are never shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeFollower {
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_sec: f32, release_sec: f32, sample_rate: f32) -> Self {
        let mut follower = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
        };
        follower.set_times(attack_sec, release_sec, sample_rate);
        follower
    }

    /// Update time constants
    ///
    /// Uses exp(-1/(time * sample_rate)) for smooth envelope following.
    pub fn set_times(&mut self, attack_sec: f32, release_sec: f32, sample_rate: f32) {
        self.attack_coeff = (-1.0 / (attack_sec.max(1e-5) * sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_sec.max(1e-4) * sample_rate)).exp();
    }

    /// Feed one sample, returning the updated envelope
    ///
    /// Rises with the attack coefficient when the rectified input exceeds
    /// the current envelope, falls with the release coefficient otherwise.
    #[inline]
    pub fn update(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        self.envelope
    }

    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Hard-knee gain computer working in the dB domain
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GainComputer {
    pub threshold_db: f32,
    pub ratio: f32,
}

impl GainComputer {
    pub fn new(threshold_db: f32, ratio: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
        }
    }

    /// Linear gain to apply for a given envelope value
    ///
    /// Unity below threshold; above it the over amount is reduced by
    /// `over - over/ratio` dB. Ratio >= 1 never amplifies.
    #[inline]
    pub fn gain_for(&self, envelope: f32) -> f32 {
        let env_db = gain_to_db(envelope);
        if env_db <= self.threshold_db {
            return 1.0;
        }
        let over_db = env_db - self.threshold_db;
        let reduction_db = over_db - over_db / self.ratio;
        10.0_f32.powf(-reduction_db / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn test_envelope_rises_and_falls() {
        let mut env = EnvelopeFollower::new(0.001, 0.05, SAMPLE_RATE);

        for _ in 0..480 {
            env.update(0.8);
        }
        let risen = env.value();
        assert!(risen > 0.7, "envelope should approach input, got {risen}");

        for _ in 0..48000 {
            env.update(0.0);
        }
        assert!(env.value() < 0.01, "envelope should decay toward zero");
    }

    #[test]
    fn test_envelope_attack_faster_than_release() {
        let mut fast = EnvelopeFollower::new(0.001, 0.5, SAMPLE_RATE);
        for _ in 0..200 {
            fast.update(1.0);
        }
        let after_attack = fast.value();

        for _ in 0..200 {
            fast.update(0.0);
        }
        // 200 samples of slow release should barely move the envelope.
        assert!(fast.value() > after_attack * 0.9);
    }

    #[test]
    fn test_unity_below_threshold() {
        let comp = GainComputer::new(-20.0, 4.0);
        assert_eq!(comp.gain_for(0.01), 1.0); // -40 dB, well below
        assert_eq!(comp.gain_for(0.0), 1.0);
    }

    #[test]
    fn test_known_reduction_above_threshold() {
        // 20 dB over at 4:1 leaves 5 dB of it -> 15 dB of reduction.
        let comp = GainComputer::new(-20.0, 4.0);
        let gain = comp.gain_for(1.0); // 0 dB input level
        let reduction_db = -20.0 * gain.log10();
        assert!((reduction_db - 15.0).abs() < 0.1);
    }

    proptest! {
        #[test]
        fn prop_gain_never_amplifies(
            envelope in 0.0_f32..2.0,
            threshold_db in -60.0_f32..0.0,
            ratio in 1.0_f32..20.0,
        ) {
            let comp = GainComputer::new(threshold_db, ratio);
            let gain = comp.gain_for(envelope);
            prop_assert!(gain <= 1.0 + 1e-6);
            prop_assert!(gain > 0.0);
        }
    }
}
