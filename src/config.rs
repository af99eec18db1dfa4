use crate::submit::{BatchErrorPolicy, DEFAULT_CHUNK_SIZE};
use anyhow::{Context, Result};
use std::path::PathBuf;

const DEFAULT_REPORTS_URL: &str = "https://api.nexmo.com/v2/reports";
const DEFAULT_MEDIA_URL: &str = "https://api.nexmo.com/v3/media";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_RUN_AT: &str = "03:00";

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_secret: String,
    pub account_id: String,
    pub push_url: String,
    pub reports_url: String,
    pub media_url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub run_hour: u32,
    pub run_minute: u32,
    pub chunk_size: usize,
    pub on_batch_error: BatchErrorPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("RELAY_API_KEY").context("RELAY_API_KEY is not set")?;
        let api_secret = std::env::var("RELAY_API_SECRET").context("RELAY_API_SECRET is not set")?;
        let push_url = std::env::var("RELAY_PUSH_URL").context("RELAY_PUSH_URL is not set")?;

        // The reporting account defaults to the API key, which doubles as the
        // account identifier for primary accounts.
        let account_id = std::env::var("RELAY_ACCOUNT_ID").unwrap_or_else(|_| api_key.clone());

        let port = match std::env::var("RELAY_PORT") {
            Ok(raw) => raw.parse().context("RELAY_PORT must be a port number")?,
            Err(_) => DEFAULT_PORT,
        };

        let chunk_size = match std::env::var("RELAY_CHUNK_SIZE") {
            Ok(raw) => raw.parse().context("RELAY_CHUNK_SIZE must be a number")?,
            Err(_) => DEFAULT_CHUNK_SIZE,
        };
        anyhow::ensure!(chunk_size > 0, "RELAY_CHUNK_SIZE must be at least 1");

        let on_batch_error = match std::env::var("RELAY_ON_BATCH_ERROR") {
            Ok(raw) => raw.parse()?,
            Err(_) => BatchErrorPolicy::default(),
        };

        let run_at = std::env::var("RELAY_RUN_AT").unwrap_or_else(|_| DEFAULT_RUN_AT.to_string());
        let (run_hour, run_minute) = parse_run_at(&run_at)?;

        let data_dir = std::env::var("RELAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self {
            api_key,
            api_secret,
            account_id,
            push_url,
            reports_url: std::env::var("RELAY_REPORTS_URL")
                .unwrap_or_else(|_| DEFAULT_REPORTS_URL.to_string()),
            media_url: std::env::var("RELAY_MEDIA_URL")
                .unwrap_or_else(|_| DEFAULT_MEDIA_URL.to_string()),
            port,
            data_dir,
            run_hour,
            run_minute,
            chunk_size,
            on_batch_error,
        })
    }
}

fn parse_run_at(raw: &str) -> Result<(u32, u32)> {
    let (hour_raw, minute_raw) = raw
        .split_once(':')
        .with_context(|| format!("RELAY_RUN_AT must be HH:MM, got '{}'", raw))?;
    let hour: u32 = hour_raw
        .parse()
        .with_context(|| format!("Invalid hour in RELAY_RUN_AT '{}'", raw))?;
    let minute: u32 = minute_raw
        .parse()
        .with_context(|| format!("Invalid minute in RELAY_RUN_AT '{}'", raw))?;
    anyhow::ensure!(
        hour < 24 && minute < 60,
        "RELAY_RUN_AT out of range: '{}'",
        raw
    );
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "RELAY_API_KEY",
        "RELAY_API_SECRET",
        "RELAY_ACCOUNT_ID",
        "RELAY_PUSH_URL",
        "RELAY_REPORTS_URL",
        "RELAY_MEDIA_URL",
        "RELAY_PORT",
        "RELAY_DATA_DIR",
        "RELAY_RUN_AT",
        "RELAY_CHUNK_SIZE",
        "RELAY_ON_BATCH_ERROR",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    fn set_required() {
        std::env::set_var("RELAY_API_KEY", "key-1");
        std::env::set_var("RELAY_API_SECRET", "secret-1");
        std::env::set_var("RELAY_PUSH_URL", "https://ingest.example.com/tracking/bulk");
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        clear_env();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.account_id, "key-1");
        assert_eq!(config.reports_url, DEFAULT_REPORTS_URL);
        assert_eq!(config.media_url, DEFAULT_MEDIA_URL);
        assert_eq!(config.port, 3000);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!((config.run_hour, config.run_minute), (3, 0));
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.on_batch_error, BatchErrorPolicy::Continue);
    }

    #[test]
    #[serial]
    fn test_missing_credentials_fail() {
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("RELAY_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set_required();
        std::env::set_var("RELAY_ACCOUNT_ID", "acct-override");
        std::env::set_var("RELAY_PORT", "8080");
        std::env::set_var("RELAY_RUN_AT", "14:30");
        std::env::set_var("RELAY_CHUNK_SIZE", "25");
        std::env::set_var("RELAY_ON_BATCH_ERROR", "retry:2");

        let config = Config::from_env().unwrap();
        assert_eq!(config.account_id, "acct-override");
        assert_eq!(config.port, 8080);
        assert_eq!((config.run_hour, config.run_minute), (14, 30));
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.on_batch_error, BatchErrorPolicy::Retry(2));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_run_at_rejected() {
        clear_env();
        set_required();
        std::env::set_var("RELAY_RUN_AT", "25:00");
        assert!(Config::from_env().is_err());

        std::env::set_var("RELAY_RUN_AT", "0300");
        assert!(Config::from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_parse_run_at() {
        assert_eq!(parse_run_at("03:00").unwrap(), (3, 0));
        assert_eq!(parse_run_at("23:59").unwrap(), (23, 59));
        assert!(parse_run_at("24:00").is_err());
        assert!(parse_run_at("12:60").is_err());
        assert!(parse_run_at("noon").is_err());
    }
}
