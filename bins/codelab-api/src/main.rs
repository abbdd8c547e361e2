mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use codelab_common::config;
use codelab_grader::Pipeline;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Submission storage; grading still works without it
    pub redis: Option<ConnectionManager>,
    pub submission_ttl: u64,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn connect_redis(redis_url: &str) -> Option<ConnectionManager> {
    let client = match redis::Client::open(redis_url) {
        Ok(client) => client,
        Err(e) => {
            warn!(redis_url = %redis_url, error = %e, "Invalid Redis URL, submissions will not be stored");
            return None;
        }
    };

    match ConnectionManager::new(client).await {
        Ok(conn) => {
            info!(redis_url = %redis_url, "Connected to Redis");
            Some(conn)
        }
        Err(e) => {
            warn!(redis_url = %redis_url, error = %e, "Redis unavailable, submissions will not be stored");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Codelab API booting...");

    let pipeline = Pipeline::from_env().context("Failed to build grading pipeline")?;
    let redis = connect_redis(&config::redis_url()).await;

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        redis,
        submission_ttl: config::submission_ttl_seconds(),
    });

    let addr = config::bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}
