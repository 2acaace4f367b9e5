//! Shared types for Calma

pub mod error;

pub use error::{CalmaError, Result};
