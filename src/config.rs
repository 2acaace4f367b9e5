//! Configuration for Calma
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Calma - wellness platform backend
#[derive(Parser, Debug, Clone)]
#[command(name = "calma")]
#[command(about = "Wellness platform backend: daily plans, friends, chat")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (MongoDB optional, insecure JWT fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "calma")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Upstream URL for the daily phrase proxy
    #[arg(
        long,
        env = "PHRASE_URL",
        default_value = "https://frasedeldia.azurewebsites.net/api/phrase"
    )]
    pub phrase_url: String,

    /// Chat-completions endpoint used for diary analysis
    #[arg(
        long,
        env = "ANALYSIS_URL",
        default_value = "https://openrouter.ai/api/v1/chat/completions"
    )]
    pub analysis_url: String,

    /// Model requested from the analysis endpoint
    #[arg(
        long,
        env = "ANALYSIS_MODEL",
        default_value = "meta-llama/llama-3.3-70b-instruct:free"
    )]
    pub analysis_model: String,

    /// API key for the analysis endpoint; diary analysis is disabled without it
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub openrouter_api_key: Option<String>,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        Ok(())
    }
}
