//! Integration test utilities for the gateway session layer
//!
//! This crate provides a scripted mock gateway and helpers for running
//! end-to-end tests of event and voice connections against it.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
