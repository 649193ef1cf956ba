//! Core restore pipeline.

pub mod collaborator;
pub mod health;
pub mod invoke;
pub mod lock;
pub mod notify;
pub mod orchestrator;
pub mod recorder;
pub mod rollback;
pub mod status;
