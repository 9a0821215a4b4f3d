//! Infrastructure layer for Steadfast.
//!
//! Contains implementations of the store traits defined in `steadfast-core`:
//! JSON checkpoint files with atomic writes, run-summary files, checkpoint
//! retention, and the `steadfast.toml` configuration loader.

pub mod config;
pub mod filesystem;
