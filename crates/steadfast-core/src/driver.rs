//! Automation driver port.
//!
//! The engine never performs UI actions itself. A concrete browser or
//! desktop driver implements this trait and is passed by reference into the
//! wait tracker and the locator.

use std::time::Duration;

use steadfast_types::driver::{Action, StructuralSignature, WaitState};
use steadfast_types::error::DriverError;

/// Capabilities the engine consumes from an automation driver.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait AutomationDriver: Send + Sync {
    /// Opaque handle to a resolved element.
    type Handle: Send + Sync;

    /// Resolve once no network activity is observed, or `false` after `timeout`.
    fn await_network_idle(
        &self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = bool> + Send;

    /// Sample a structural fingerprint of the current document.
    fn read_structural_signature(
        &self,
    ) -> impl std::future::Future<Output = Result<StructuralSignature, DriverError>> + Send;

    /// Resolve `selector` once it reaches `state`, bounded by `timeout`.
    fn resolve_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Self::Handle, DriverError>> + Send;

    /// Perform `action` on a previously resolved handle.
    fn perform_action(
        &self,
        handle: &Self::Handle,
        action: &Action,
    ) -> impl std::future::Future<Output = Result<(), DriverError>> + Send;
}
