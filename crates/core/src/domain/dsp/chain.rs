//! Master chain orchestrator
//!
//! Wires the stages into the fixed mastering signal flow:
//!
//! Input -> Velvet Floor -> Velvet Curve -> Harmonic Lattice -> Phase Weave
//!       -> True-Peak Limiter -> Dither -> Output Gain
//!
//! Each stage consumes the previous stage's output in place. Mastering
//! profiles preset every stage and the output gain for a target platform.
//! The loudness meter is not part of the chain; the engine taps the signal
//! after the chain runs.

use super::curve::{VelvetCurve, VelvetCurveParams};
use super::dither::{Dither, DitherParams};
use super::floor::{VelvetFloor, VelvetFloorParams};
use super::lattice::{HarmonicLattice, HarmonicLatticeParams};
use super::limiter::{TruePeakLimiter, TruePeakLimiterParams};
use super::weave::{PhaseWeave, PhaseWeaveParams};
use super::{ParamId, Result, Stage};
use crate::domain::audio::db_to_gain;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Pre-configured mastering profiles for different target platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasteringProfile {
    /// Streaming platforms: -14 LUFS, -1 dBTP
    Streaming,
    /// Club/DJ: -8 LUFS, -0.5 dBTP
    Club,
    /// Broadcast/TV: -24 LUFS, -2 dBTP (EBU R128 compliant)
    Broadcast,
    /// Vinyl cut: -12 LUFS, -1 dBTP, mono bass
    Vinyl,
    /// Hi-Fi: -16 LUFS, -1 dBTP, dynamics preserved
    Audiophile,
}

impl MasteringProfile {
    pub const ALL: [MasteringProfile; 5] = [
        MasteringProfile::Streaming,
        MasteringProfile::Club,
        MasteringProfile::Broadcast,
        MasteringProfile::Vinyl,
        MasteringProfile::Audiophile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MasteringProfile::Streaming => "streaming",
            MasteringProfile::Club => "club",
            MasteringProfile::Broadcast => "broadcast",
            MasteringProfile::Vinyl => "vinyl",
            MasteringProfile::Audiophile => "audiophile",
        }
    }

    pub fn from_name(name: &str) -> Option<MasteringProfile> {
        MasteringProfile::ALL
            .iter()
            .copied()
            .find(|p| p.name() == name)
    }

    /// Target integrated loudness for the platform
    pub fn target_lufs(&self) -> f32 {
        match self {
            MasteringProfile::Streaming => -14.0,
            MasteringProfile::Club => -8.0,
            MasteringProfile::Broadcast => -24.0,
            MasteringProfile::Vinyl => -12.0,
            MasteringProfile::Audiophile => -16.0,
        }
    }

    /// Target true-peak ceiling in dBTP
    pub fn target_true_peak(&self) -> f32 {
        match self {
            MasteringProfile::Streaming => -1.0,
            MasteringProfile::Club => -0.5,
            MasteringProfile::Broadcast => -2.0,
            MasteringProfile::Vinyl => -1.0,
            MasteringProfile::Audiophile => -1.0,
        }
    }

    /// Output gain in dB that shifts the -14 LUFS reference level to the
    /// profile's target loudness
    pub fn output_gain_db(&self) -> f32 {
        const REFERENCE_LUFS: f32 = -14.0;
        self.target_lufs() - REFERENCE_LUFS
    }

    /// Full per-stage parameter preset for this profile
    pub fn chain_params(&self) -> ChainParams {
        let limiter = TruePeakLimiterParams {
            threshold_db: self.target_true_peak(),
            ..TruePeakLimiterParams::default()
        };
        match self {
            MasteringProfile::Streaming => ChainParams {
                floor: VelvetFloorParams {
                    warmth: 0.2,
                    depth: 0.2,
                    ..VelvetFloorParams::default()
                },
                curve: VelvetCurveParams {
                    threshold_db: -18.0,
                    ratio: 2.2,
                    release_sec: 0.1,
                    ..VelvetCurveParams::default()
                },
                lattice: HarmonicLatticeParams {
                    presence: 0.2,
                    airiness: 0.2,
                    character: 0.1,
                },
                weave: PhaseWeaveParams {
                    width: 1.1,
                    mono_below: 0.0,
                },
                limiter,
                dither: DitherParams::default(),
                output_gain_db: self.output_gain_db(),
            },
            MasteringProfile::Club => ChainParams {
                floor: VelvetFloorParams {
                    warmth: 0.4,
                    depth: 0.3,
                    ..VelvetFloorParams::default()
                },
                curve: VelvetCurveParams {
                    threshold_db: -14.0,
                    ratio: 2.5,
                    release_sec: 0.08,
                    ..VelvetCurveParams::default()
                },
                lattice: HarmonicLatticeParams {
                    presence: 0.3,
                    airiness: 0.25,
                    character: 0.2,
                },
                weave: PhaseWeaveParams {
                    width: 1.3,
                    mono_below: 0.0,
                },
                limiter,
                dither: DitherParams::default(),
                output_gain_db: self.output_gain_db(),
            },
            MasteringProfile::Broadcast => ChainParams {
                floor: VelvetFloorParams {
                    warmth: 0.1,
                    depth: 0.1,
                    ..VelvetFloorParams::default()
                },
                curve: VelvetCurveParams {
                    threshold_db: -24.0,
                    ratio: 1.8,
                    release_sec: 0.15,
                    ..VelvetCurveParams::default()
                },
                lattice: HarmonicLatticeParams {
                    presence: 0.1,
                    airiness: 0.1,
                    character: 0.05,
                },
                weave: PhaseWeaveParams {
                    width: 1.0,
                    mono_below: 0.0,
                },
                limiter,
                dither: DitherParams::default(),
                output_gain_db: self.output_gain_db(),
            },
            MasteringProfile::Vinyl => ChainParams {
                floor: VelvetFloorParams {
                    warmth: 0.35,
                    depth: 0.25,
                    ..VelvetFloorParams::default()
                },
                curve: VelvetCurveParams {
                    threshold_db: -20.0,
                    ratio: 2.0,
                    release_sec: 0.12,
                    ..VelvetCurveParams::default()
                },
                lattice: HarmonicLatticeParams {
                    presence: 0.25,
                    airiness: 0.15,
                    character: 0.2,
                },
                // Vinyl cutting requires mono bass to keep the stylus in
                // the groove.
                weave: PhaseWeaveParams {
                    width: 1.0,
                    mono_below: 150.0,
                },
                limiter,
                dither: DitherParams::default(),
                output_gain_db: self.output_gain_db(),
            },
            MasteringProfile::Audiophile => ChainParams {
                floor: VelvetFloorParams {
                    warmth: 0.1,
                    depth: 0.1,
                    ..VelvetFloorParams::default()
                },
                curve: VelvetCurveParams {
                    threshold_db: -22.0,
                    ratio: 1.5,
                    release_sec: 0.2,
                    ..VelvetCurveParams::default()
                },
                lattice: HarmonicLatticeParams {
                    presence: 0.1,
                    airiness: 0.15,
                    character: 0.05,
                },
                weave: PhaseWeaveParams {
                    width: 1.0,
                    mono_below: 0.0,
                },
                limiter,
                dither: DitherParams::default(),
                output_gain_db: self.output_gain_db(),
            },
        }
    }
}

impl Default for MasteringProfile {
    fn default() -> Self {
        MasteringProfile::Streaming
    }
}

/// Identifies a chain stage for bypass control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageId {
    Floor,
    Curve,
    Lattice,
    Weave,
    Limiter,
    Dither,
}

/// Complete parameter set for the chain
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainParams {
    pub floor: VelvetFloorParams,
    pub curve: VelvetCurveParams,
    pub lattice: HarmonicLatticeParams,
    pub weave: PhaseWeaveParams,
    pub limiter: TruePeakLimiterParams,
    pub dither: DitherParams,
    pub output_gain_db: f32,
}

impl ChainParams {
    /// Read a single parameter value out of the set
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::FloorFrequency => self.floor.frequency,
            ParamId::FloorWarmth => self.floor.warmth,
            ParamId::FloorDepth => self.floor.depth,
            ParamId::CurveCrossover => self.curve.crossover,
            ParamId::CurveThreshold => self.curve.threshold_db,
            ParamId::CurveRatio => self.curve.ratio,
            ParamId::CurveAttack => self.curve.attack_sec,
            ParamId::CurveRelease => self.curve.release_sec,
            ParamId::LatticePresence => self.lattice.presence,
            ParamId::LatticeAiriness => self.lattice.airiness,
            ParamId::LatticeCharacter => self.lattice.character,
            ParamId::WeaveWidth => self.weave.width,
            ParamId::WeaveMonoBelow => self.weave.mono_below,
            ParamId::LimiterThreshold => self.limiter.threshold_db,
            ParamId::LimiterLookaheadMs => self.limiter.lookahead_ms,
            ParamId::LimiterRelease => self.limiter.release,
            ParamId::DitherAmplitudeDb => self.dither.amplitude_db,
            ParamId::OutputGainDb => self.output_gain_db,
        }
    }

    /// Write a single parameter, clamped to its declared range
    pub fn set(&mut self, id: ParamId, value: f32) {
        let d = id.descriptor();
        let value = value.clamp(d.min, d.max);
        match id {
            ParamId::FloorFrequency => self.floor.frequency = value,
            ParamId::FloorWarmth => self.floor.warmth = value,
            ParamId::FloorDepth => self.floor.depth = value,
            ParamId::CurveCrossover => self.curve.crossover = value,
            ParamId::CurveThreshold => self.curve.threshold_db = value,
            ParamId::CurveRatio => self.curve.ratio = value,
            ParamId::CurveAttack => self.curve.attack_sec = value,
            ParamId::CurveRelease => self.curve.release_sec = value,
            ParamId::LatticePresence => self.lattice.presence = value,
            ParamId::LatticeAiriness => self.lattice.airiness = value,
            ParamId::LatticeCharacter => self.lattice.character = value,
            ParamId::WeaveWidth => self.weave.width = value,
            ParamId::WeaveMonoBelow => self.weave.mono_below = value,
            ParamId::LimiterThreshold => self.limiter.threshold_db = value,
            ParamId::LimiterLookaheadMs => self.limiter.lookahead_ms = value,
            ParamId::LimiterRelease => self.limiter.release = value,
            ParamId::DitherAmplitudeDb => self.dither.amplitude_db = value,
            ParamId::OutputGainDb => self.output_gain_db = value,
        }
    }

    /// Which stage a parameter belongs to (output gain has none)
    fn stage_of(id: ParamId) -> Option<StageId> {
        match id {
            ParamId::FloorFrequency | ParamId::FloorWarmth | ParamId::FloorDepth => {
                Some(StageId::Floor)
            }
            ParamId::CurveCrossover
            | ParamId::CurveThreshold
            | ParamId::CurveRatio
            | ParamId::CurveAttack
            | ParamId::CurveRelease => Some(StageId::Curve),
            ParamId::LatticePresence | ParamId::LatticeAiriness | ParamId::LatticeCharacter => {
                Some(StageId::Lattice)
            }
            ParamId::WeaveWidth | ParamId::WeaveMonoBelow => Some(StageId::Weave),
            ParamId::LimiterThreshold | ParamId::LimiterLookaheadMs | ParamId::LimiterRelease => {
                Some(StageId::Limiter)
            }
            ParamId::DitherAmplitudeDb => Some(StageId::Dither),
            ParamId::OutputGainDb => None,
        }
    }
}

/// The complete mastering signal chain
pub struct MasterChain {
    sample_rate: f32,
    profile: MasteringProfile,
    params: ChainParams,
    output_gain: f32,

    floor: VelvetFloor,
    curve: VelvetCurve,
    lattice: HarmonicLattice,
    weave: PhaseWeave,
    limiter: TruePeakLimiter,
    dither: Dither,
}

impl MasterChain {
    pub fn new(sample_rate: f32, profile: MasteringProfile) -> Self {
        let mut chain = Self {
            sample_rate,
            profile,
            params: ChainParams::default(),
            output_gain: 1.0,
            floor: VelvetFloor::new(sample_rate),
            curve: VelvetCurve::new(sample_rate),
            lattice: HarmonicLattice::new(sample_rate),
            weave: PhaseWeave::new(sample_rate),
            limiter: TruePeakLimiter::new(sample_rate),
            dither: Dither::new(),
        };
        chain.apply_profile(profile);
        info!(
            sample_rate,
            profile = profile.name(),
            "master chain created"
        );
        chain
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn profile(&self) -> MasteringProfile {
        self.profile
    }

    pub fn params(&self) -> ChainParams {
        self.params
    }

    /// Path delay the chain introduces, in samples
    pub fn latency_samples(&self) -> usize {
        self.limiter.latency_samples()
    }

    /// Preset every stage for a target platform
    pub fn apply_profile(&mut self, profile: MasteringProfile) {
        self.profile = profile;
        self.set_params(profile.chain_params());
        debug!(profile = profile.name(), "profile applied");
    }

    /// Push a full parameter set into every stage
    pub fn set_params(&mut self, params: ChainParams) {
        self.params = params;
        self.floor.set_params(params.floor);
        self.curve.set_params(params.curve);
        self.lattice.set_params(params.lattice);
        self.weave.set_params(params.weave);
        self.limiter.set_params(params.limiter);
        self.dither.set_params(params.dither);
        self.output_gain = db_to_gain(params.output_gain_db);
    }

    /// Update a single parameter, re-deriving only the affected stage
    pub fn set_param(&mut self, id: ParamId, value: f32) {
        self.params.set(id, value);
        match ChainParams::stage_of(id) {
            Some(StageId::Floor) => self.floor.set_params(self.params.floor),
            Some(StageId::Curve) => self.curve.set_params(self.params.curve),
            Some(StageId::Lattice) => self.lattice.set_params(self.params.lattice),
            Some(StageId::Weave) => self.weave.set_params(self.params.weave),
            Some(StageId::Limiter) => self.limiter.set_params(self.params.limiter),
            Some(StageId::Dither) => self.dither.set_params(self.params.dither),
            None => self.output_gain = db_to_gain(self.params.output_gain_db),
        }
    }

    pub fn set_stage_bypass(&mut self, id: StageId, bypass: bool) {
        self.stage_mut(id).set_bypass(bypass);
        debug!(stage = ?id, bypass, "stage bypass toggled");
    }

    pub fn is_stage_bypassed(&self, id: StageId) -> bool {
        match id {
            StageId::Floor => self.floor.is_bypassed(),
            StageId::Curve => self.curve.is_bypassed(),
            StageId::Lattice => self.lattice.is_bypassed(),
            StageId::Weave => self.weave.is_bypassed(),
            StageId::Limiter => self.limiter.is_bypassed(),
            StageId::Dither => self.dither.is_bypassed(),
        }
    }

    fn stage_mut(&mut self, id: StageId) -> &mut dyn Stage {
        match id {
            StageId::Floor => &mut self.floor,
            StageId::Curve => &mut self.curve,
            StageId::Lattice => &mut self.lattice,
            StageId::Weave => &mut self.weave,
            StageId::Limiter => &mut self.limiter,
            StageId::Dither => &mut self.dither,
        }
    }
}

impl Stage for MasterChain {
    /// Run a planar block through every stage in the fixed chain order
    fn process_block(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        self.floor.process_block(channels)?;
        self.curve.process_block(channels)?;
        self.lattice.process_block(channels)?;
        self.weave.process_block(channels)?;
        self.limiter.process_block(channels)?;
        self.dither.process_block(channels)?;

        if self.output_gain != 1.0 {
            for buffer in channels.iter_mut() {
                for sample in buffer.iter_mut() {
                    *sample *= self.output_gain;
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.floor.reset();
        self.curve.reset();
        self.lattice.reset();
        self.weave.reset();
        self.limiter.reset();
        self.dither.reset();
    }

    fn is_bypassed(&self) -> bool {
        false
    }

    fn set_bypass(&mut self, bypass: bool) {
        for id in [
            StageId::Floor,
            StageId::Curve,
            StageId::Lattice,
            StageId::Weave,
            StageId::Limiter,
            StageId::Dither,
        ] {
            self.stage_mut(id).set_bypass(bypass);
        }
    }

    fn name(&self) -> &str {
        "MasterChain"
    }
}
