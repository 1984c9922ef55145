use anyhow::Context;
use claim_flow::{
    ClaimRepository, ClaimRunner, EngineConfig, InMemoryClaimRepository, LogNotifier,
    PostgresClaimRepository, RigExtractor,
};
use claims_service::{AppState, build_router};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claims_service=debug,claim_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var("CLAIMS_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading engine configuration");
            EngineConfig::from_file(&path).with_context(|| format!("invalid configuration in {path}"))
        }
        Err(_) => {
            info!("Using built-in engine configuration (set CLAIMS_CONFIG to override)");
            Ok(EngineConfig::default())
        }
    }
}

async fn create_repository() -> Arc<dyn ClaimRepository> {
    // Check for DATABASE_URL and use PostgreSQL if available, otherwise use in-memory
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        info!("Using PostgreSQL claim repository");
        match PostgresClaimRepository::connect(&database_url).await {
            Ok(repository) => Arc::new(repository),
            Err(e) => {
                error!(
                    "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                    e
                );
                Arc::new(InMemoryClaimRepository::new())
            }
        }
    } else {
        info!("Using in-memory claim repository (set DATABASE_URL to use PostgreSQL)");
        Arc::new(InMemoryClaimRepository::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let repository = create_repository().await;

    let mut runner = ClaimRunner::new(&config, repository)
        .context("engine configuration rejected")?
        .with_notifier(Arc::new(LogNotifier));

    match RigExtractor::from_env() {
        Ok(extractor) => {
            info!("Document extraction enabled");
            runner = runner.with_extractor(Arc::new(extractor));
        }
        Err(e) => warn!("{}; POST /claims/documents is disabled", e),
    }

    let app = build_router(AppState {
        runner: Arc::new(runner),
    });

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Claims service running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
