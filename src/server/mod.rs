//! HTTP server for Calma

pub mod http;

pub use http::{run, AppState};
