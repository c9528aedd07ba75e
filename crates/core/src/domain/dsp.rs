//! Digital Signal Processing stages for the mastering chain
//!
//! This module provides the per-sample processing stages wired together by
//! [`chain::MasterChain`]:
//! - Biquad IIR filters (lowpass/highpass/peaking/high-shelf)
//! - Lookup-table saturation
//! - Envelope-follower compression
//! - Velvet Floor (sub-bass warmth), Velvet Curve (multiband compression),
//!   Harmonic Lattice (presence/air EQ), Phase Weave (stereo width)
//! - Look-ahead true-peak limiting and TPDF dither
//!
//! All stages are designed for:
//! - Zero allocations in the hot path (scratch is pre-allocated)
//! - Per-channel state that is never shared across channels
//! - Deterministic output given identical state and parameters

use crate::domain::audio::AudioError;
use serde::{Deserialize, Serialize};

pub mod biquad;
pub mod chain;
pub mod curve;
pub mod dither;
pub mod envelope;
pub mod floor;
pub mod lattice;
pub mod limiter;
pub mod saturation;
pub mod weave;

pub use biquad::{BiquadCoeffs, BiquadFilter, BiquadState, CoeffCache, FilterKind, FilterSpec};
pub use chain::{ChainParams, MasterChain, MasteringProfile, StageId};
pub use curve::{VelvetCurve, VelvetCurveParams};
pub use dither::{Dither, DitherParams};
pub use envelope::{EnvelopeFollower, GainComputer};
pub use floor::{VelvetFloor, VelvetFloorParams};
pub use lattice::{HarmonicLattice, HarmonicLatticeParams};
pub use limiter::{TruePeakLimiter, TruePeakLimiterParams};
pub use saturation::SaturationCurve;
pub use weave::{PhaseWeave, PhaseWeaveParams};

pub type Result<T> = std::result::Result<T, AudioError>;

/// Maximum number of channels any stage carries state for
pub const MAX_CHANNELS: usize = 2;

/// Core trait for all mastering stages
///
/// Stages process planar per-channel blocks in place. A block with fewer
/// channels than a stage expects is handled by degrading (mono pass-through
/// for stereo-only stages), never by returning an error.
pub trait Stage: Send {
    /// Process planar channel buffers in place
    ///
    /// `channels[0]` is the left (or mono) buffer; `channels[1]`, when
    /// present, is the right buffer. Buffers are expected to share a length.
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()>;

    /// Reset stage state to initial conditions
    ///
    /// Clears filter histories, envelopes and delay lines. Used on engine
    /// restart and when bypassing to avoid stale-state clicks.
    fn reset(&mut self);

    /// Check if the stage is bypassed
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get stage name for debugging/display
    fn name(&self) -> &str;
}

/// Parameter constraints for the mastering stages
///
/// All parameters are clamped to these ranges before use to prevent
/// unstable filter poles and division blow-ups.
pub mod params {
    /// Decibel range for threshold-style parameters
    pub const DB_MIN: f32 = -60.0;
    pub const DB_MAX: f32 = 24.0;

    /// Compressor ratio range (1:1 to 20:1)
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 20.0;

    /// Attack/Release time ranges in seconds
    pub const ATTACK_MIN: f32 = 0.0001; // 0.1ms
    pub const ATTACK_MAX: f32 = 0.1; // 100ms
    pub const RELEASE_MIN: f32 = 0.01; // 10ms
    pub const RELEASE_MAX: f32 = 1.0; // 1000ms

    /// Q must stay away from zero to avoid division blow-up
    pub const Q_MIN: f32 = 0.05;
    pub const Q_MAX: f32 = 10.0;

    /// Lowest frequency any filter is designed at
    pub const FREQ_MIN: f32 = 10.0;

    /// Sub-bass cutoff range for the Velvet Floor
    pub const FLOOR_FREQ_MIN: f32 = 50.0;
    pub const FLOOR_FREQ_MAX: f32 = 300.0;

    /// Crossover range for the Velvet Curve band split
    pub const CROSSOVER_MIN: f32 = 60.0;
    pub const CROSSOVER_MAX: f32 = 500.0;

    /// Stereo width range (0 = mono, 1 = unity, 2 = exaggerated)
    pub const WIDTH_MIN: f32 = 0.0;
    pub const WIDTH_MAX: f32 = 2.0;

    /// Limiter look-ahead range in milliseconds
    pub const LOOKAHEAD_MS_MIN: f32 = 0.1;
    pub const LOOKAHEAD_MS_MAX: f32 = 5.0;
}

/// How often the control layer may deliver a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Read once at the start of every block
    PerBlock,
    /// May change every sample; the engine smooths block-rate deliveries
    PerSample,
}

/// Typed identifier for every controllable chain parameter
///
/// A tagged enum instead of name strings keeps dispatch off the real-time
/// path; the string names exist only for config files and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    FloorFrequency,
    FloorWarmth,
    FloorDepth,
    CurveCrossover,
    CurveThreshold,
    CurveRatio,
    CurveAttack,
    CurveRelease,
    LatticePresence,
    LatticeAiriness,
    LatticeCharacter,
    WeaveWidth,
    WeaveMonoBelow,
    LimiterThreshold,
    LimiterLookaheadMs,
    LimiterRelease,
    DitherAmplitudeDb,
    OutputGainDb,
}

/// Declared metadata for a chain parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub rate: UpdateRate,
}

impl ParamId {
    pub const ALL: [ParamId; 18] = [
        ParamId::FloorFrequency,
        ParamId::FloorWarmth,
        ParamId::FloorDepth,
        ParamId::CurveCrossover,
        ParamId::CurveThreshold,
        ParamId::CurveRatio,
        ParamId::CurveAttack,
        ParamId::CurveRelease,
        ParamId::LatticePresence,
        ParamId::LatticeAiriness,
        ParamId::LatticeCharacter,
        ParamId::WeaveWidth,
        ParamId::WeaveMonoBelow,
        ParamId::LimiterThreshold,
        ParamId::LimiterLookaheadMs,
        ParamId::LimiterRelease,
        ParamId::DitherAmplitudeDb,
        ParamId::OutputGainDb,
    ];

    /// Declared default, range and update rate for this parameter
    pub fn descriptor(&self) -> ParamDescriptor {
        use UpdateRate::{PerBlock, PerSample};
        match self {
            ParamId::FloorFrequency => ParamDescriptor {
                name: "floor_frequency",
                default: 120.0,
                min: params::FLOOR_FREQ_MIN,
                max: params::FLOOR_FREQ_MAX,
                rate: PerBlock,
            },
            ParamId::FloorWarmth => ParamDescriptor {
                name: "floor_warmth",
                default: 0.3,
                min: 0.0,
                max: 1.0,
                rate: PerBlock,
            },
            ParamId::FloorDepth => ParamDescriptor {
                name: "floor_depth",
                default: 0.25,
                min: 0.0,
                max: 1.0,
                rate: PerBlock,
            },
            ParamId::CurveCrossover => ParamDescriptor {
                name: "curve_crossover",
                default: 150.0,
                min: params::CROSSOVER_MIN,
                max: params::CROSSOVER_MAX,
                rate: PerBlock,
            },
            ParamId::CurveThreshold => ParamDescriptor {
                name: "curve_threshold",
                default: -24.0,
                min: params::DB_MIN,
                max: 0.0,
                rate: PerBlock,
            },
            ParamId::CurveRatio => ParamDescriptor {
                name: "curve_ratio",
                default: 3.0,
                min: params::RATIO_MIN,
                max: params::RATIO_MAX,
                rate: PerBlock,
            },
            ParamId::CurveAttack => ParamDescriptor {
                name: "curve_attack",
                default: 0.01,
                min: params::ATTACK_MIN,
                max: params::ATTACK_MAX,
                rate: PerBlock,
            },
            ParamId::CurveRelease => ParamDescriptor {
                name: "curve_release",
                default: 0.15,
                min: params::RELEASE_MIN,
                max: params::RELEASE_MAX,
                rate: PerBlock,
            },
            ParamId::LatticePresence => ParamDescriptor {
                name: "lattice_presence",
                default: 0.2,
                min: 0.0,
                max: 1.0,
                rate: PerBlock,
            },
            ParamId::LatticeAiriness => ParamDescriptor {
                name: "lattice_airiness",
                default: 0.2,
                min: 0.0,
                max: 1.0,
                rate: PerBlock,
            },
            ParamId::LatticeCharacter => ParamDescriptor {
                name: "lattice_character",
                default: 0.15,
                min: 0.0,
                max: 1.0,
                rate: PerBlock,
            },
            ParamId::WeaveWidth => ParamDescriptor {
                name: "weave_width",
                default: 1.0,
                min: params::WIDTH_MIN,
                max: params::WIDTH_MAX,
                rate: PerSample,
            },
            ParamId::WeaveMonoBelow => ParamDescriptor {
                name: "weave_mono_below",
                default: 0.0,
                min: 0.0,
                max: 300.0,
                rate: PerBlock,
            },
            ParamId::LimiterThreshold => ParamDescriptor {
                name: "limiter_threshold",
                default: -1.0,
                min: -6.0,
                max: 0.0,
                rate: PerBlock,
            },
            ParamId::LimiterLookaheadMs => ParamDescriptor {
                name: "limiter_lookahead_ms",
                default: 1.5,
                min: params::LOOKAHEAD_MS_MIN,
                max: params::LOOKAHEAD_MS_MAX,
                rate: PerBlock,
            },
            ParamId::LimiterRelease => ParamDescriptor {
                name: "limiter_release",
                default: 0.05,
                min: params::RELEASE_MIN,
                max: params::RELEASE_MAX,
                rate: PerBlock,
            },
            ParamId::DitherAmplitudeDb => ParamDescriptor {
                name: "dither_amplitude_db",
                default: -90.0,
                min: -120.0,
                max: -60.0,
                rate: PerBlock,
            },
            ParamId::OutputGainDb => ParamDescriptor {
                name: "output_gain_db",
                default: 0.0,
                min: -24.0,
                max: 12.0,
                rate: PerSample,
            },
        }
    }

    /// Look up a parameter by its config-file name
    pub fn from_name(name: &str) -> Option<ParamId> {
        ParamId::ALL
            .iter()
            .copied()
            .find(|id| id.descriptor().name == name)
    }
}
