//! Calma - wellness platform backend
//!
//! Accounts, friendships, chat and mood-driven daily activity plans.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calma::{auth::JwtValidator, config::Args, db::MongoClient, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("calma={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Calma - Wellness Platform Backend");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Database: {}", args.mongodb_db);
    info!("Phrase upstream: {}", args.phrase_url);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!(
                    "MongoDB connection failed (dev mode, continuing without): {}",
                    e
                );
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Open the collections up front so unique and TTL indexes are in place
    // before the first request
    if let Some(ref client) = mongo {
        if let Err(e) = open_collections(client).await {
            if args.dev_mode {
                warn!("Index creation failed (dev mode, continuing): {}", e);
            } else {
                error!("Index creation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // JWT validation
    let jwt = if args.dev_mode && std::env::var("JWT_SECRET").is_err() {
        warn!("Using development JWT secret; do not run this in production");
        JwtValidator::new_dev()
    } else {
        match JwtValidator::new(args.jwt_secret(), args.jwt_expiry_seconds) {
            Ok(v) => v,
            Err(e) => {
                error!("JWT configuration error: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = Arc::new(server::AppState::new(args, mongo, jwt));

    // Run the server
    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn open_collections(client: &MongoClient) -> Result<(), calma::CalmaError> {
    use calma::db::schemas::{
        ChatMessageDoc, ResourceDoc, UserDoc, CHAT_COLLECTION, RESOURCE_COLLECTION,
        USER_COLLECTION,
    };

    client.collection::<UserDoc>(USER_COLLECTION).await?;
    client.collection::<ResourceDoc>(RESOURCE_COLLECTION).await?;
    client.collection::<ChatMessageDoc>(CHAT_COLLECTION).await?;

    info!("Collection indexes applied");
    Ok(())
}
