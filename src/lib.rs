//! Stackup library crate.

/// Core library modules and APIs.
pub mod core;

/// CLI argument parsing (only when the `cli` feature is enabled).
#[cfg(feature = "cli")]
pub mod cli;

/// Command handlers sitting between the CLI surface and the core operations.
#[cfg(feature = "cli")]
pub mod app;

mod config;
mod error;

pub use config::*;
pub use error::*;
