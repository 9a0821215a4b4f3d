//! Shared domain types for Steadfast.
//!
//! This crate contains the data model of the resilient execution engine:
//! retry configuration and outcomes, workflow/stage checkpoints, run
//! summaries, adaptive-wait metrics, selector chains, the engine
//! configuration and the error enums shared across crates.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod error;
pub mod locator;
pub mod retry;
pub mod run;
pub mod wait;
