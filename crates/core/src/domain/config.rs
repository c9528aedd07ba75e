//! Configuration management for Velvet
//!
//! This module provides:
//! - Configuration structs for the engine and the mastering chain
//! - Preset system with TOML serialization
//! - Command bus pattern for runtime control
//! - Hot-reload support via file system watcher

use crate::domain::dsp::{ChainParams, MasterChain, MasteringProfile, ParamId, StageId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),
}

/// Engine-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Audio block (quantum) size in frames
    pub block_size: u32,

    /// Preset directory
    pub preset_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            preset_dir: PathBuf::from("presets"),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(ConfigError::Invalid(format!(
                "sample rate {} outside 8000-192000 Hz",
                self.sample_rate
            )));
        }
        if self.block_size == 0 || self.block_size > 8192 {
            return Err(ConfigError::Invalid(format!(
                "block size {} outside 1-8192 frames",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Complete Velvet configuration: engine settings plus chain state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelvetConfig {
    pub engine: EngineConfig,
    pub profile: MasteringProfile,
    pub chain: ChainParams,
}

impl Default for VelvetConfig {
    fn default() -> Self {
        Self::for_profile(MasteringProfile::default())
    }
}

impl VelvetConfig {
    /// Factory configuration for a mastering profile
    pub fn for_profile(profile: MasteringProfile) -> Self {
        Self {
            engine: EngineConfig::default(),
            profile,
            chain: profile.chain_params(),
        }
    }

    /// Build a chain configured from this file
    pub fn to_chain(&self) -> MasterChain {
        let mut chain = MasterChain::new(self.engine.sample_rate as f32, self.profile);
        chain.set_params(self.chain);
        chain
    }

    /// Capture the chain's current state into a config value
    pub fn from_chain(engine: EngineConfig, chain: &MasterChain) -> Self {
        Self {
            engine,
            profile: chain.profile(),
            chain: chain.params(),
        }
    }

    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.engine.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }
}

/// Command types for runtime control of the engine
#[derive(Debug, Clone)]
pub enum Command {
    SetParam {
        param: ParamId,
        value: f32,
    },
    /// Set a parameter by its config-file name
    SetParamByName {
        name: String,
        value: f32,
    },
    ApplyProfile {
        profile: MasteringProfile,
    },
    SetBypass {
        stage: StageId,
        bypass: bool,
    },
    ResetMeters,
    LoadPreset {
        name: String,
    },
    SavePreset {
        name: String,
    },
}

/// Result of command execution
#[derive(Debug, Clone)]
pub enum CommandResult {
    Ok,
    ParamChanged {
        param: ParamId,
        value: f32,
    },
    ProfileApplied {
        profile: MasteringProfile,
    },
    BypassChanged {
        stage: StageId,
        bypass: bool,
    },
    MetersReset,
    PresetLoaded {
        name: String,
    },
    PresetSaved {
        name: String,
    },
    Error(String),
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> CommandResult;
}

/// File system watcher for preset hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Create a new config watcher over the preset directory
    pub async fn new(preset_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&preset_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            if let Err(e) = tx_clone.send(path) {
                                error!("Failed to send config change event: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&preset_dir, notify::RecursiveMode::Recursive)?;

        info!(path = %preset_dir.display(), "Config watcher started");

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Preset manager
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    /// Default preset directory under the user config dir
    pub fn default_preset_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("velvet").join("presets"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// List all available presets, sorted by name
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<VelvetConfig> {
        let path = self.preset_dir.join(format!("{}.toml", name));

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        VelvetConfig::load_from_file(&path).await
    }

    /// Save a preset by name
    #[instrument(skip(self, config))]
    pub async fn save_preset(&self, name: &str, config: &VelvetConfig) -> Result<()> {
        let path = self.preset_dir.join(format!("{}.toml", name));
        config.save_to_file(&path).await
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_dir.join(format!("{}.toml", name));

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_dir.join(format!("{}.toml", name)).exists()
    }

    /// Write the factory preset for every mastering profile
    #[instrument(skip(self))]
    pub async fn save_factory_presets(&self) -> Result<()> {
        for profile in MasteringProfile::ALL {
            let config = VelvetConfig::for_profile(profile);
            self.save_preset(profile.name(), &config).await?;
        }
        info!(count = MasteringProfile::ALL.len(), "Factory presets saved");
        Ok(())
    }
}

/// Configuration manager for the main Velvet config
///
/// Manages the main configuration file at `~/.config/velvet/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("velvet"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// Missing file creates and returns the factory default; a corrupt file
    /// is backed up and replaced by the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> VelvetConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = VelvetConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match VelvetConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                VelvetConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &VelvetConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
