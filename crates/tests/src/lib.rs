//! End-to-end tests for the mastering engine

#[cfg(test)]
mod mastering_integration;
