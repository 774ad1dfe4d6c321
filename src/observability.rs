//! Logging, metrics and liveness plumbing.
//!
//! `init_tracing` wires up the `tracing` subscriber. `init_metrics_and_health`
//! installs the Prometheus recorder and brings up two plaintext HTTP
//! listeners, one serving `/metrics` and one serving the `/health/*` probes.
//! The `record_*` helpers are the only metrics surface the rest of the crate
//! touches.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::config::ServerConfig;

/// Set up the global `tracing` subscriber.
///
/// `LOG_LEVEL` controls our own crate's verbosity (default `info`);
/// `LOG_FORMAT=pretty` switches from JSON lines to human-readable output.
pub fn init_tracing() -> Result<()> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    // Chatty dependencies stay at warn regardless of our own level.
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("storefront_bot={}", level).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("teloxide=warn".parse()?);

    let registry = tracing_subscriber::registry().with(filter);
    if format == "pretty" {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    tracing::info!(%level, %format, "tracing initialized");
    Ok(())
}

/// Install the process-wide Prometheus recorder.
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Install the metrics recorder and start the metrics and health listeners.
pub async fn init_metrics_and_health(
    config: &ServerConfig,
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    let handle = init_metrics()?;

    start_metrics_server(handle, config.metrics_port).await?;
    start_health_server(config.health_port, db_pool.clone(), bot_token).await?;

    tracing::info!(
        metrics_port = %config.metrics_port,
        health_port = %config.health_port,
        has_db_pool = %db_pool.is_some(),
        "observability listeners up"
    );
    Ok(())
}

/// Bind `port` on all interfaces and answer every request with `handler`.
///
/// The accept loop runs on its own task for the life of the process; each
/// connection gets a task of its own.
async fn spawn_http_listener<F, Fut>(name: &'static str, port: u16, handler: F) -> Result<()>
where
    F: Fn(hyper::Request<hyper::body::Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = hyper::Response<String>> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("{} server listening on {}", name, addr);

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("{} server failed to accept a connection: {}", name, e);
                    continue;
                }
            };

            let handler = handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = hyper::service::service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, std::convert::Infallible>(handler(req).await) }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("{} connection error: {:?}", name, err);
                }
            });
        }
    });

    Ok(())
}

fn not_found() -> hyper::Response<String> {
    let mut response = hyper::Response::new("Not Found".to_string());
    *response.status_mut() = hyper::StatusCode::NOT_FOUND;
    response
}

async fn start_metrics_server(handle: PrometheusHandle, port: u16) -> Result<()> {
    spawn_http_listener("metrics", port, move |req| {
        let handle = handle.clone();
        async move {
            if req.method() != hyper::Method::GET || req.uri().path() != "/metrics" {
                return not_found();
            }
            // Touch one gauge so a fresh process never renders an empty page.
            metrics::gauge!("uptime_seconds").set(1.0);
            let mut response = hyper::Response::new(handle.render());
            response.headers_mut().insert(
                "content-type",
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
    })
    .await
}

async fn start_health_server(
    port: u16,
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    spawn_http_listener("health", port, move |req| {
        let db_pool = db_pool.clone();
        let bot_token = bot_token.clone();
        async move {
            match (req.method(), req.uri().path()) {
                (&hyper::Method::GET, "/health/live") => hyper::Response::new("OK".to_string()),
                (&hyper::Method::GET, "/health/ready") => {
                    match perform_readiness_checks(db_pool, bot_token).await {
                        Ok(()) => hyper::Response::new("OK".to_string()),
                        Err(e) => {
                            let mut response = hyper::Response::new(format!("NOT READY: {}", e));
                            *response.status_mut() = hyper::StatusCode::SERVICE_UNAVAILABLE;
                            response
                        }
                    }
                }
                _ => not_found(),
            }
        }
    })
    .await
}

/// Record a dispatched conversation event
pub fn record_event_dispatched(state: &str, outcome: &str) {
    let state = state.to_string();
    let outcome = outcome.to_string();
    metrics::counter!("events_dispatched_total", "state" => state, "outcome" => outcome)
        .increment(1);
}

/// Record how long one event took to dispatch end to end
pub fn record_dispatch_duration(duration: std::time::Duration) {
    metrics::histogram!("event_dispatch_duration_seconds").record(duration.as_secs_f64());
}

/// Record a commerce API request
pub fn record_commerce_request(operation: &str, outcome: &str) {
    let operation = operation.to_string();
    let outcome = outcome.to_string();
    metrics::counter!("commerce_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Record how long one commerce API request took
pub fn record_commerce_duration(operation: &str, duration: std::time::Duration) {
    let operation = operation.to_string();
    metrics::histogram!("commerce_request_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

/// Record an inbound Telegram update by kind
pub fn record_telegram_update(kind: &str) {
    let kind = kind.to_string();
    metrics::counter!("telegram_updates_total", "kind" => kind).increment(1);
}

/// Run every dependency probe that applies to this deployment.
pub async fn perform_readiness_checks(
    db_pool: Option<Arc<PgPool>>,
    bot_token: Option<String>,
) -> Result<()> {
    if let Some(pool) = &db_pool {
        check_database_health(pool).await?;
    }
    if let Some(token) = &bot_token {
        check_bot_token_health(token).await?;
    }
    Ok(())
}

/// Round-trip a trivial query to prove the pool can still serve connections.
pub async fn check_database_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow::anyhow!("database readiness probe failed: {}", e))?;

    tracing::debug!("database probe ok");
    Ok(())
}

/// Shallow token sanity check; no Telegram call is made here.
pub async fn check_bot_token_health(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow::anyhow!("bot token is empty"));
    }
    if !token.contains(':') {
        return Err(anyhow::anyhow!("bot token is malformed"));
    }

    tracing::debug!("bot token probe ok");
    Ok(())
}
