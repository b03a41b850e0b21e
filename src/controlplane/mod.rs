//! Control Plane Module
//!
//! Reconciles PersistentVolumeClaims against the volume backend and the
//! cluster API, fed by a claim watch.

pub mod api;
pub mod backends;
pub mod cluster;
pub mod dispatcher;
pub mod reconciler;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use api::*;
pub use backends::*;
pub use cluster::*;
pub use dispatcher::*;
pub use reconciler::*;
