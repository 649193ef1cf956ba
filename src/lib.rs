//! Restore Orchestrator Library
//!
//! Drives a backup restore through a sequential, single-flight pipeline with
//! snapshot-based rollback and an append-only outcome record.

pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod preflight;
pub mod utils;

pub use error::{Error, Result};
