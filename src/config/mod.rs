/// Application configuration module
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub usgs_base_url: String,
    pub usgs_username: String,
    pub usgs_token: String,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub http_port: u16,
    pub sweep_every_seconds: u64,
    pub scene_sample_count: usize,
    pub max_notification_horizon_hours: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL is required");
        let usgs_username = env::var("USGS_USERNAME").expect("USGS_USERNAME is required");
        let usgs_token = env::var("USGS_TOKEN").expect("USGS_TOKEN is required");

        let usgs_base_url = env::var("USGS_BASE_URL")
            .unwrap_or_else(|_| "https://m2m.cr.usgs.gov/api/api/json/stable/".to_string());

        // Email delivery is optional; without a relay the sweeper still runs
        // and records what it would have sent.
        let mail_relay_url = env::var("MAIL_RELAY_URL").ok();
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@landsat-notify.local".to_string());

        Ok(Self {
            database_url,
            usgs_base_url,
            usgs_username,
            usgs_token,
            mail_relay_url,
            mail_from,
            http_port: env_u64("HTTP_PORT", 3000) as u16,
            sweep_every_seconds: env_u64("SWEEP_EVERY_SECONDS", 600),
            scene_sample_count: env_u64("SCENE_SAMPLE_COUNT", 10) as usize,
            max_notification_horizon_hours: env_u64("MAX_NOTIFICATION_HORIZON_HOURS", 24),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
