//! Core trait abstractions.
//!
//! - [`store::JobStore`] - durable job rows
//! - [`generator::Generator`] - the upstream model call

pub mod generator;
pub mod store;
