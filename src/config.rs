//! Runtime configuration, read from the environment.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;

const DEFAULT_TZ: &str = "Europe/Moscow";
const DEFAULT_STORE_PATH: &str = "store.json";
const DEFAULT_PORT: u16 = 10000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    /// When set, updates from any other chat are silently ignored.
    pub allowed_chat_id: Option<String>,
    /// Public base URL of this service; webhook registration and OAuth are
    /// disabled without it.
    pub base_url: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub default_tz: String,
    pub store_path: PathBuf,
    pub port: u16,
    pub poll_interval_secs: u64,
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            non_empty("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN is not set")?;

        let default_tz = non_empty("DEFAULT_TZ").unwrap_or_else(|| DEFAULT_TZ.to_string());
        default_tz
            .parse::<Tz>()
            .ok()
            .with_context(|| format!("DEFAULT_TZ is not a known timezone: {default_tz}"))?;

        let port = match non_empty("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("PORT is not a number: {raw}"))?,
            None => DEFAULT_PORT,
        };
        let poll_interval_secs = match non_empty("POLL_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("POLL_INTERVAL_SECS is not a number: {raw}"))?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        Ok(Self {
            telegram_token,
            allowed_chat_id: non_empty("ALLOWED_CHAT_ID"),
            base_url: non_empty("BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            google_client_id: non_empty("GOOGLE_CLIENT_ID"),
            google_client_secret: non_empty("GOOGLE_CLIENT_SECRET"),
            default_tz,
            store_path: non_empty("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            port,
            poll_interval_secs,
        })
    }

    /// The OAuth redirect endpoint, when a public base URL is configured.
    pub fn redirect_uri(&self) -> Option<String> {
        self.base_url.as_ref().map(|base| format!("{base}/auth/callback"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests share process state; keep them in one test so they can
    // not interleave.
    #[test]
    fn config_from_env() {
        env::set_var("TELEGRAM_TOKEN", "123:abc");
        env::set_var("BASE_URL", "https://bot.example.com/");
        env::remove_var("DEFAULT_TZ");
        env::remove_var("PORT");
        env::remove_var("POLL_INTERVAL_SECS");
        env::remove_var("ALLOWED_CHAT_ID");
        env::remove_var("STORE_PATH");

        let config = Config::from_env().unwrap();
        assert_eq!(config.telegram_token, "123:abc");
        // Trailing slash is stripped so route joining stays simple.
        assert_eq!(config.base_url.as_deref(), Some("https://bot.example.com"));
        assert_eq!(config.default_tz, "Europe/Moscow");
        assert_eq!(config.port, 10000);
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(
            config.redirect_uri().as_deref(),
            Some("https://bot.example.com/auth/callback")
        );

        env::set_var("DEFAULT_TZ", "Mars/Olympus");
        assert!(Config::from_env().is_err());
        env::set_var("DEFAULT_TZ", "Asia/Novosibirsk");
        assert_eq!(Config::from_env().unwrap().default_tz, "Asia/Novosibirsk");

        env::remove_var("TELEGRAM_TOKEN");
        assert!(Config::from_env().is_err());
    }
}
