pub mod handler;
pub mod policy;

pub use handler::{EnhancedRetryHandler, RetryResult, with_retry};
pub use policy::{RetryHooks, RetryPolicy};
