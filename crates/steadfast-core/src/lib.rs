//! Resilient execution logic and port trait definitions for Steadfast.
//!
//! This crate defines the "ports" (driver and store traits) that the
//! infrastructure layer and external automation drivers implement. It
//! depends only on `steadfast-types` -- never on `steadfast-infra` or any
//! filesystem code.

pub mod checkpoint;
pub mod driver;
pub mod executor;
pub mod locator;
pub mod repository;
pub mod retry;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;
