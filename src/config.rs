//! # Configuration Module
//!
//! Process configuration read from the environment (and a `.env` file, loaded
//! by `main` before this runs).

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::sheets::SheetLocation;

pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_SHEET_COLUMN: &str = "A";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_SYNC_TIME: &str = "00:00";
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    /// `None` selects the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub sheet: SheetLocation,
    pub credentials_path: PathBuf,
    pub timezone: Tz,
    pub sync_time: NaiveTime,
    /// Upper bound for every spreadsheet and storage call
    pub external_timeout: Duration,
    /// Users allowed to add meals; empty means everyone
    pub admin_user_ids: HashSet<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{key} must be set"));

        let telegram_token = required("TELEGRAM_BOT_TOKEN")?;
        let spreadsheet_id = required("GOOGLE_SHEET_ID")?;

        let credentials_path = PathBuf::from(
            var("GOOGLE_CREDENTIALS_PATH").unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string()),
        );

        let column = var("SHEET_COLUMN")
            .unwrap_or_else(|| DEFAULT_SHEET_COLUMN.to_string())
            .to_ascii_uppercase();
        if !column.chars().all(|c| c.is_ascii_uppercase()) {
            bail!("SHEET_COLUMN must be a column letter, got {column:?}");
        }

        let timezone_name = var("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow!("invalid TIMEZONE {timezone_name:?}: {e}"))?;

        let sync_time_raw = var("SYNC_TIME").unwrap_or_else(|| DEFAULT_SYNC_TIME.to_string());
        let sync_time = NaiveTime::parse_from_str(&sync_time_raw, "%H:%M")
            .with_context(|| format!("invalid SYNC_TIME {sync_time_raw:?}, expected HH:MM"))?;

        let external_timeout_secs = match var("EXTERNAL_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow!("EXTERNAL_TIMEOUT_SECS must be a positive integer"))?,
            None => DEFAULT_EXTERNAL_TIMEOUT_SECS,
        };

        let database_max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("DATABASE_MAX_CONNECTIONS must be a positive integer"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let admin_user_ids = match var("ADMIN_USER_IDS") {
            Some(raw) => parse_user_ids(&raw)?,
            None => HashSet::new(),
        };

        Ok(Self {
            telegram_token,
            database_url: var("DATABASE_URL"),
            database_max_connections,
            sheet: SheetLocation {
                spreadsheet_id,
                sheet_name: var("SHEET_NAME").unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                column,
            },
            credentials_path,
            timezone,
            sync_time,
            external_timeout: Duration::from_secs(external_timeout_secs),
            admin_user_ids,
        })
    }

    /// Fail unless the credentials file is present
    pub fn ensure_credentials_exist(&self) -> Result<()> {
        if !self.credentials_path.exists() {
            bail!(
                "Google credentials file not found at {}",
                self.credentials_path.display()
            );
        }
        Ok(())
    }
}

fn parse_user_ids(raw: &str) -> Result<HashSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .with_context(|| format!("invalid user id {id:?} in ADMIN_USER_IDS"))
        })
        .collect()
}
