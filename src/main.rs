/// Main application entry point with clean architecture
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod repo;
mod routes;
mod services;
mod utils;

use crate::clients::UsgsClient;
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::repo::{init_db, NotificationRepo, TargetRepo};
use crate::routes::build_router;
use crate::services::{
    EmailNotificationSender, NotificationSender, NotificationSweeper, SceneHistory, SweepConfig,
};
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established");

    // Initialize database schema
    init_db(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("schema init failed: {e}"))?;
    info!("Database schema initialized");

    // Initialize repositories
    let target_repo = TargetRepo::new(pool.clone());
    let notification_repo = NotificationRepo::new(pool.clone());

    // Authenticate against the USGS M2M API up front
    let usgs_client = UsgsClient::login(
        config.usgs_base_url.clone(),
        &config.usgs_username,
        &config.usgs_token,
    )
    .await
    .map_err(|e| anyhow::anyhow!("USGS login failed: {e}"))?;

    let history = SceneHistory::new(usgs_client);

    // Delivery channels
    let mut senders: Vec<Box<dyn NotificationSender>> = Vec::new();
    if let Some(relay_url) = config.mail_relay_url.clone() {
        senders.push(Box::new(EmailNotificationSender::new(
            relay_url,
            config.mail_from.clone(),
        )?));
    } else {
        info!("MAIL_RELAY_URL not set; notifications will be recorded but not emailed");
    }

    // Notification sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = NotificationSweeper::new(
        history.clone(),
        target_repo.clone(),
        notification_repo,
        senders,
        SweepConfig {
            sample_count: config.scene_sample_count,
            max_horizon: Duration::hours(config.max_notification_horizon_hours as i64),
            interval: std::time::Duration::from_secs(config.sweep_every_seconds),
        },
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    // Initialize application state
    let state = AppState {
        history,
        targets: target_repo,
        sample_count: config.scene_sample_count,
    };

    // Build router
    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("landsat-notify service listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Stop the sweeper and wait for any in-flight sweep to finish
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;
    info!("shutdown complete");

    Ok(())
}
