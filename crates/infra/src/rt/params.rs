//! Cross-thread parameter delivery
//!
//! Scalar parameters travel through single-word atomic cells: the control
//! thread stores, the audio thread loads at block start. A stale read is
//! fine; a torn read is impossible because the f32 is bit-cast through one
//! `AtomicU32`.
//!
//! Structural changes (profile switches, bypass, meter reset) that touch
//! more than one word go through a bounded control-message channel drained
//! non-blockingly by the engine.

use std::sync::atomic::{AtomicU32, Ordering};
use velvet_core::domain::{ChainParams, MasteringProfile, ParamId, StageId};

/// f32 cell readable and writable from any thread without tearing
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// One atomic cell per chain parameter
///
/// Indexed by the parameter's position in [`ParamId::ALL`]; cells start at
/// the declared defaults.
pub struct ParamTable {
    cells: [AtomicF32; ParamId::ALL.len()],
}

impl ParamTable {
    pub fn new() -> Self {
        Self {
            cells: ParamId::ALL.map(|id| AtomicF32::new(id.descriptor().default)),
        }
    }

    /// Seed every cell from a value source (e.g. the chain's active params)
    pub fn store_all(&self, mut value_of: impl FnMut(ParamId) -> f32) {
        for id in ParamId::ALL {
            self.set(id, value_of(id));
        }
    }

    #[inline]
    fn index(id: ParamId) -> usize {
        ParamId::ALL
            .iter()
            .position(|&p| p == id)
            .expect("ParamId::ALL covers every variant")
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        self.cells[Self::index(id)].load()
    }

    #[inline]
    pub fn set(&self, id: ParamId, value: f32) {
        self.cells[Self::index(id)].store(value);
    }
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural control messages applied by the engine at block start
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMsg {
    ApplyProfile(MasteringProfile),
    /// Replace the whole parameter set at once (e.g. a loaded preset)
    ApplyParams(ChainParams),
    SetBypass(StageId, bool),
    ResetMeters,
    /// Clear all stage state (filters, envelopes, delay lines)
    ResetChain,
}
