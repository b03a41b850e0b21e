//! Volume Backend Adapters
//!
//! Provides adapters for the services that allocate volume capacity:
//! - VolumeDriver: Docker volume-plugin protocol over HTTP

pub mod volume_driver;

pub use volume_driver::*;
