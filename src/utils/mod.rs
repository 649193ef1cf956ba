//! Utility helpers.

pub mod fs;
pub mod hash;
