//! Retry escalation: the pure decision ladder and the loop that applies it.

pub mod executor;
pub mod policy;

pub use executor::RetryExecutor;
pub use policy::{RetryContext, RetryPolicy};
