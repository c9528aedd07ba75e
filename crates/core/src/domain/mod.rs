//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod meter;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioError, ChannelCount, SampleRate};
pub use config::{
    Command, CommandExecutor, CommandResult, ConfigError, ConfigManager, ConfigWatcher,
    EngineConfig, PresetManager, VelvetConfig,
};
pub use dsp::{
    ChainParams, MasterChain, MasteringProfile, ParamId, Stage, StageId, UpdateRate, MAX_CHANNELS,
};
pub use meter::{LoudnessMeter, MeteringSnapshot};
