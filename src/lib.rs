//! Calma - wellness platform backend
//!
//! Calma serves user accounts, friend relationships, realtime chat and
//! mood-driven daily activity plans over MongoDB.
//!
//! ## Services
//!
//! - **Auth**: registration, login and JWT sessions
//! - **Plans**: mood-driven daily plan generation and re-balancing
//! - **Friends**: request / accept / decline friendship flows
//! - **Chat**: persisted one-to-one messaging with WebSocket fan-out
//! - **Resources**: categorized wellness content library

pub mod auth;
pub mod config;
pub mod db;
pub mod plan;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CalmaError, Result};
