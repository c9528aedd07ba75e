//! Audio domain primitives shared by the mastering chain and the meter
//!
//! The processing path never reports errors for malformed audio blocks;
//! those degrade gracefully (pass-through or mono). `AudioError` covers the
//! configuration boundary: building a chain, validating an engine setup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Invalid configuration for the engine or a stage
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A parameter value that cannot be clamped into a safe range
    #[error("Parameter out of range: {0}")]
    ParameterOutOfRange(String),

    /// Reporting channel was disconnected by the consumer
    #[error("Report channel closed: {0}")]
    ReportChannelClosed(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Hz192000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Hz192000 => 192000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            192000 => SampleRate::Hz192000,
            hz => SampleRate::Custom(hz),
        }
    }

    /// Nyquist frequency for this rate
    pub fn nyquist(&self) -> f32 {
        self.hz() as f32 * 0.5
    }
}

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
        }
    }
}

/// Convert a linear amplitude to decibels, floored at -120 dB
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain < 1e-6 {
        -120.0
    } else {
        20.0 * gain.log10()
    }
}

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_conversion() {
        assert_eq!(SampleRate::Hz48000.hz(), 48000);
        assert_eq!(SampleRate::from_hz(48000), SampleRate::Hz48000);
        assert_eq!(SampleRate::Custom(96000).hz(), 96000);
        assert_eq!(SampleRate::Hz44100.nyquist(), 22050.0);
    }

    #[test]
    fn test_channel_count() {
        assert_eq!(ChannelCount::Mono.count(), 1);
        assert_eq!(ChannelCount::Stereo.count(), 2);
    }

    #[test]
    fn test_db_round_trip() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 0.01);
        assert!((gain_to_db(db_to_gain(-14.0)) - -14.0).abs() < 1e-3);
        assert_eq!(gain_to_db(0.0), -120.0);
    }
}
