//! Real-time engine plumbing
//!
//! Everything here follows one rule: the audio thread never blocks. Metering
//! leaves over a wait-free SPSC ring, parameters arrive through single-word
//! atomic cells, and structural control messages are drained non-blockingly
//! at block start.

pub mod engine;
pub mod params;
pub mod report;

pub use engine::{EngineController, MasteringEngine, RtError};
pub use params::{AtomicF32, ControlMsg, ParamTable};
pub use report::{report_ring, ReportConsumer, ReportProducer};
