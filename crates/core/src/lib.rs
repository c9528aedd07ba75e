//! Velvet core library: mastering signal chain and loudness metering
//!
//! This crate contains the platform-agnostic DSP domain. Real-time plumbing
//! (report ring, parameter cells, the processing-thread host) lives in the
//! `velvet-infra` crate; the CLI lives in `velvet-app`.

pub mod domain;
