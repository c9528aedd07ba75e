//! Processing-thread engine host
//!
//! `MasteringEngine` owns the chain, the loudness meter and their state; it
//! is driven by the host audio pipeline calling [`MasteringEngine::process_block`]
//! once per quantum. The paired [`EngineController`] lives on the control
//! thread and talks to the engine only through atomic parameter cells and a
//! bounded message channel, so the audio callback never takes a lock.
//!
//! Stopping the engine is simply ceasing to call the callback; there is no
//! mid-block cancellation.

use crate::rt::params::{ControlMsg, ParamTable};
use crate::rt::report::{report_ring, ReportConsumer, ReportProducer};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use velvet_core::domain::dsp::Result as DspResult;
use velvet_core::domain::{
    ChainParams, LoudnessMeter, MasterChain, MasteringProfile, ParamId, Stage, StageId,
};

/// Control messages the engine can buffer between blocks
const CONTROL_QUEUE_DEPTH: usize = 64;
/// Snapshot slots between the audio and control threads
const REPORT_RING_DEPTH: usize = 64;

/// Errors surfaced on the control side of the engine
#[derive(Debug, Error)]
pub enum RtError {
    #[error("control channel full, message dropped")]
    ControlChannelFull,

    #[error("engine stopped, control channel closed")]
    EngineStopped,
}

/// Control-thread handle to a running engine
pub struct EngineController {
    params: Arc<ParamTable>,
    tx: Sender<ControlMsg>,
}

impl EngineController {
    /// Deliver a scalar parameter; the engine picks it up at its next block
    pub fn set_param(&self, id: ParamId, value: f32) {
        let d = id.descriptor();
        self.params.set(id, value.clamp(d.min, d.max));
    }

    pub fn get_param(&self, id: ParamId) -> f32 {
        self.params.get(id)
    }

    pub fn apply_profile(&self, profile: MasteringProfile) -> Result<(), RtError> {
        self.send(ControlMsg::ApplyProfile(profile))
    }

    /// Replace the entire parameter set, e.g. from a loaded preset
    pub fn apply_params(&self, params: ChainParams) -> Result<(), RtError> {
        self.send(ControlMsg::ApplyParams(params))
    }

    pub fn set_bypass(&self, stage: StageId, bypass: bool) -> Result<(), RtError> {
        self.send(ControlMsg::SetBypass(stage, bypass))
    }

    pub fn reset_meters(&self) -> Result<(), RtError> {
        self.send(ControlMsg::ResetMeters)
    }

    pub fn reset_chain(&self) -> Result<(), RtError> {
        self.send(ControlMsg::ResetChain)
    }

    fn send(&self, msg: ControlMsg) -> Result<(), RtError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                warn!(?msg, "control queue full");
                Err(RtError::ControlChannelFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(RtError::EngineStopped),
        }
    }
}

/// The real-time mastering engine
pub struct MasteringEngine {
    chain: MasterChain,
    meter: LoudnessMeter,
    params: Arc<ParamTable>,
    /// Last values pulled from the table, so unchanged parameters cost one
    /// compare per block instead of a stage re-derivation.
    shadow: [f32; ParamId::ALL.len()],
    control_rx: Receiver<ControlMsg>,
    reports: ReportProducer,
}

impl MasteringEngine {
    /// Build an engine plus its control and report handles
    pub fn new(
        sample_rate: f32,
        profile: MasteringProfile,
    ) -> (MasteringEngine, EngineController, ReportConsumer) {
        let chain = MasterChain::new(sample_rate, profile);
        let params = Arc::new(ParamTable::new());

        let chain_params = chain.params();
        params.store_all(|id| chain_params.get(id));
        let mut shadow = [0.0_f32; ParamId::ALL.len()];
        for (i, id) in ParamId::ALL.iter().enumerate() {
            shadow[i] = chain_params.get(*id);
        }

        let (tx, control_rx) = bounded(CONTROL_QUEUE_DEPTH);
        let (report_tx, report_rx) = report_ring(REPORT_RING_DEPTH);

        info!(sample_rate, profile = profile.name(), "engine created");
        let engine = MasteringEngine {
            chain,
            meter: LoudnessMeter::new(sample_rate),
            params: Arc::clone(&params),
            shadow,
            control_rx,
            reports: report_tx,
        };
        let controller = EngineController { params, tx };
        (engine, controller, report_rx)
    }

    pub fn chain(&self) -> &MasterChain {
        &self.chain
    }

    /// The per-quantum audio callback
    ///
    /// Applies pending control messages, syncs parameter cells, runs the
    /// chain in place and taps the loudness meter. Never blocks and never
    /// allocates in steady state.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]]) -> DspResult<()> {
        self.apply_control_messages();
        self.sync_params();

        self.chain.process_block(channels)?;

        let snapshot = match &*channels {
            [] => None,
            [mono] => self.meter.measure_block(&[&**mono]),
            [left, right, ..] => self.meter.measure_block(&[&**left, &**right]),
        };
        if let Some(snapshot) = snapshot {
            // Fire and forget; a full ring drops the report.
            self.reports.push(snapshot);
        }
        Ok(())
    }

    fn apply_control_messages(&mut self) {
        while let Ok(msg) = self.control_rx.try_recv() {
            debug!(?msg, "control message");
            match msg {
                ControlMsg::ApplyProfile(profile) => {
                    self.chain.apply_profile(profile);
                    self.reseed_cells();
                }
                ControlMsg::ApplyParams(params) => {
                    self.chain.set_params(params);
                    self.reseed_cells();
                }
                ControlMsg::SetBypass(stage, bypass) => {
                    self.chain.set_stage_bypass(stage, bypass);
                }
                ControlMsg::ResetMeters => self.meter.reset(),
                ControlMsg::ResetChain => self.chain.reset(),
            }
        }
    }

    /// Re-seed the cells and the shadow copy so stale controller values do
    /// not immediately overwrite freshly applied presets.
    fn reseed_cells(&mut self) {
        let chain_params = self.chain.params();
        self.params.store_all(|id| chain_params.get(id));
        for (i, id) in ParamId::ALL.iter().enumerate() {
            self.shadow[i] = chain_params.get(*id);
        }
    }

    fn sync_params(&mut self) {
        for (i, id) in ParamId::ALL.iter().enumerate() {
            let value = self.params.get(*id);
            if value != self.shadow[i] {
                self.shadow[i] = value;
                self.chain.set_param(*id, value);
            }
        }
    }
}
