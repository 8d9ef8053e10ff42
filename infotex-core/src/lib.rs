//! InfoTex Core - Shared building blocks for the InfoTex client
//!
//! This crate defines the error type, configuration, logging bootstrap and the
//! small set of domain types shared by the session layer and the HTTP client.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use tracing;
