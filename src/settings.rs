use crate::config::store::DEFAULT_REFRESH_INTERVAL_SECS;
use std::path::PathBuf;

/// Process settings, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub osu_client_id: String,
    pub osu_client_secret: String,
    pub osu_api_base: String,
    pub cache_ttl_secs: f64,
    pub cache_max_pages: u32,
    pub store_refresh_interval_secs: i64,
    pub admin_token: Option<String>,
    pub announce_webhook_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Settings {
            host: text("HOST", "0.0.0.0"),
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(3001),
            data_dir: PathBuf::from(text("DATA_DIR", "data")),
            osu_client_id: text("OSU_CLIENT_ID", ""),
            osu_client_secret: text("OSU_CLIENT_SECRET", ""),
            osu_api_base: text("OSU_API_BASE", "https://osu.ppy.sh"),
            cache_ttl_secs: lookup("CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(86_400.0),
            cache_max_pages: lookup("CACHE_MAX_PAGES")
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(200),
            store_refresh_interval_secs: lookup("STORE_REFRESH_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            admin_token: optional("ADMIN_TOKEN"),
            announce_webhook_url: optional("ANNOUNCE_WEBHOOK_URL"),
        }
    }
}
