//! API Module
//!
//! Provides the ops endpoints: health, readiness and metrics.

pub mod server;

pub use server::*;
