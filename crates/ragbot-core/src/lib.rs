//! ragbot-core
//!
//! Shared building blocks for the retrieval pipeline: domain types, the error
//! enum, collaborator traits, configuration and the document chunkers.

pub mod chunker;
pub mod config;
pub mod error;
pub mod logging;
pub mod source;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
