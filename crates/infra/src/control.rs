//! Control-plane command dispatch
//!
//! Bridges the async command bus from the domain layer onto the real-time
//! engine handles: scalar parameters go through the atomic cells, structural
//! changes through the control channel, and preset IO through the preset
//! manager. The audio thread is never touched directly from here.

use crate::rt::EngineController;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};
use velvet_core::domain::{
    ChainParams, Command, CommandExecutor, CommandResult, ConfigWatcher, EngineConfig,
    MasteringProfile, ParamId, PresetManager, VelvetConfig,
};

/// Executes control commands against a running engine
pub struct CommandDispatcher {
    controller: EngineController,
    presets: PresetManager,
    /// Last profile applied, for capturing presets; the chain's own copy
    /// lives on the audio thread.
    profile: Mutex<MasteringProfile>,
}

impl CommandDispatcher {
    pub fn new(
        controller: EngineController,
        presets: PresetManager,
        profile: MasteringProfile,
    ) -> Self {
        Self {
            controller,
            presets,
            profile: Mutex::new(profile),
        }
    }

    /// Current parameter set as seen by the control thread
    fn current_params(&self) -> ChainParams {
        let mut params = ChainParams::default();
        for id in ParamId::ALL {
            params.set(id, self.controller.get_param(id));
        }
        params
    }
}

#[async_trait]
impl CommandExecutor for CommandDispatcher {
    async fn execute(&self, command: Command) -> CommandResult {
        match command {
            Command::SetParam { param, value } => {
                self.controller.set_param(param, value);
                CommandResult::ParamChanged {
                    param,
                    value: self.controller.get_param(param),
                }
            }
            Command::SetParamByName { name, value } => match ParamId::from_name(&name) {
                Some(param) => {
                    self.controller.set_param(param, value);
                    CommandResult::ParamChanged {
                        param,
                        value: self.controller.get_param(param),
                    }
                }
                None => CommandResult::Error(format!("unknown parameter: {name}")),
            },
            Command::ApplyProfile { profile } => match self.controller.apply_profile(profile) {
                Ok(()) => {
                    *self.profile.lock().unwrap() = profile;
                    CommandResult::ProfileApplied { profile }
                }
                Err(e) => CommandResult::Error(e.to_string()),
            },
            Command::SetBypass { stage, bypass } => {
                match self.controller.set_bypass(stage, bypass) {
                    Ok(()) => CommandResult::BypassChanged { stage, bypass },
                    Err(e) => CommandResult::Error(e.to_string()),
                }
            }
            Command::ResetMeters => match self.controller.reset_meters() {
                Ok(()) => CommandResult::MetersReset,
                Err(e) => CommandResult::Error(e.to_string()),
            },
            Command::LoadPreset { name } => match self.presets.load_preset(&name).await {
                Ok(config) => match self.controller.apply_params(config.chain) {
                    Ok(()) => {
                        *self.profile.lock().unwrap() = config.profile;
                        info!(name, "preset applied");
                        CommandResult::PresetLoaded { name }
                    }
                    Err(e) => CommandResult::Error(e.to_string()),
                },
                Err(e) => CommandResult::Error(e.to_string()),
            },
            Command::SavePreset { name } => {
                let config = VelvetConfig {
                    engine: EngineConfig::default(),
                    profile: *self.profile.lock().unwrap(),
                    chain: self.current_params(),
                };
                match self.presets.save_preset(&name, &config).await {
                    Ok(()) => CommandResult::PresetSaved { name },
                    Err(e) => CommandResult::Error(e.to_string()),
                }
            }
        }
    }
}

/// Re-apply presets as their files change on disk
///
/// Runs until the watcher side of the broadcast channel is dropped.
pub async fn hot_reload_loop(watcher: &ConfigWatcher, dispatcher: &CommandDispatcher) {
    let mut changes = watcher.subscribe();
    while let Ok(path) = changes.recv().await {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        info!(name, "preset file changed, reloading");
        let result = dispatcher
            .execute(Command::LoadPreset {
                name: name.to_string(),
            })
            .await;
        if let CommandResult::Error(e) = result {
            warn!(name, error = %e, "preset reload failed");
        }
    }
}
