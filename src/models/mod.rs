//! Data models.

pub mod config;
pub mod operation;
pub mod rollback;
