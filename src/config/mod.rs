use std::env;
use std::time::Duration;

use rocket::figment::{
    providers::{Format, Serialized, Toml},
    Figment, Profile,
};
use rocket::Config;
use serde::{Deserialize, Serialize};

use crate::debounce::SettleWindows;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    /// Externally visible base of the origin server, e.g. `https://thumbs.example.org`.
    pub public_base_url: String,
    pub upstream_base_url: String,
    /// Search used for an empty inline query.
    pub default_query: String,
    pub filter_id: Option<u64>,
    pub user_agent: String,
    /// Upstream request timeout, seconds.
    pub timeout: u64,
    /// Seconds.
    pub image_ttl: u64,
    /// Seconds.
    pub body_ttl: u64,
    /// Seconds between janitor sweeps.
    pub cleanup_interval: u64,
    pub settle_window_ms: u64,
    pub quick_settle_window_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "0.0.0.0".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            upstream_base_url: "https://derpibooru.org".to_string(),
            default_query: "safe, first_seen_at.gt:1 days ago, score.gt:100".to_string(),
            filter_id: None,
            user_agent: concat!("boorucache/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: 10,
            image_ttl: 2 * 60 * 60,
            body_ttl: 2 * 60 * 60,
            cleanup_interval: 30 * 60,
            settle_window_ms: 1500,
            quick_settle_window_ms: 200,
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl)
    }

    pub fn body_ttl(&self) -> Duration {
        Duration::from_secs(self.body_ttl)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }

    pub fn settle_windows(&self) -> SettleWindows {
        SettleWindows::new(
            Duration::from_millis(self.settle_window_ms),
            Duration::from_millis(self.quick_settle_window_ms),
        )
    }
}

/// Rocket defaults, then our defaults, then `App.toml`, then the environment.
pub fn figment() -> Figment {
    let mut figment = Figment::from(Config::default())
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file("App.toml").nested())
        // one shutdown path: ours
        .merge(("shutdown.ctrlc", false));

    if let Ok(domain) = env::var("DOMAIN_NAME") {
        figment = figment.merge(("public_base_url", domain));
    }

    if let Ok(query) = env::var("DEFAULT_QUERY") {
        figment = figment.merge(("default_query", query));
    }

    if let Ok(upstream) = env::var("UPSTREAM_BASE_URL") {
        figment = figment.merge(("upstream_base_url", upstream));
    }

    figment.select(Profile::from_env_or("APP_PROFILE", "default"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_field() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .extract()
            .unwrap();

        assert_eq!(config.image_ttl(), Duration::from_secs(7200));
        assert_eq!(config.settle_windows().search, Duration::from_millis(1500));
        assert_eq!(config.settle_windows().quick, Duration::from_millis(200));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string("[default]\nbody_ttl = 30\nfilter_id = 56027").nested())
            .extract()
            .unwrap();

        assert_eq!(config.body_ttl(), Duration::from_secs(30));
        assert_eq!(config.filter_id, Some(56027));
    }
}
