//! Velvet infrastructure: real-time plumbing around the mastering core
//!
//! Hosts the processing-thread engine, the lock-free metering report ring
//! and the atomic parameter cells that bridge the control thread and the
//! audio callback.

pub mod control;
pub mod rt;
