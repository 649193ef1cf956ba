//! CLI command implementations.

pub mod check;
pub mod recover;
pub mod rollback;
pub mod run;
pub mod status;
