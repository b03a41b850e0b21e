//! Domain Module
//!
//! Core domain types and port traits for the operator.

pub mod claim;
pub mod ownership;
pub mod ports;
pub mod volume;

pub use claim::*;
pub use ownership::*;
pub use ports::*;
pub use volume::*;
