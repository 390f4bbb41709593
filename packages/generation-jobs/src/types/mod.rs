//! Domain types for generation jobs.

pub mod config;
pub mod job;
