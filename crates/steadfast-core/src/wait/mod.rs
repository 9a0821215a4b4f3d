pub mod adaptive;
pub mod strategy;

pub use adaptive::AdaptiveWaitTracker;
pub use strategy::{WaitStrategy, wait_until};
