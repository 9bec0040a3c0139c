//! SubWatch configuration.
//!
//! Two layers: `EngineConfig` (process-level, loaded from TOML) and
//! `NotificationPreferences` (per-user, owned by the preference store and
//! read-only here). Preferences are validated once at load time; the
//! dispatcher never re-checks field presence at send time.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SubwatchError};
use crate::types::ChannelKind;

/// Process-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Delay before the first tick, so startup is not racing store init.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
    /// Directory holding subscriptions.json / preferences.json.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// SQLite ledger path.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
}

fn default_tick_interval() -> u64 {
    3600
}
fn default_startup_delay() -> u64 {
    10
}
fn default_data_dir() -> String {
    home_join("data")
}
fn default_ledger_path() -> String {
    home_join("ledger.db")
}

fn home_join(leaf: &str) -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".subwatch")
        .join(leaf)
        .to_string_lossy()
        .into_owned()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            startup_delay_secs: default_startup_delay(),
            data_dir: default_data_dir(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl EngineConfig {
    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() { Self::load_from(&path) } else { Ok(Self::default()) }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubwatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SubwatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Default config path (~/.subwatch/config.toml).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".subwatch")
            .join("config.toml")
    }
}

/// Email channel settings (SMTP submission).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; defaults to `username` when empty.
    #[serde(default)]
    pub from_address: String,
    /// Destination mailbox.
    pub to_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Messaging channel settings (Telegram Bot API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub bot_token: String,
    /// Destination chat.
    pub chat_id: String,
}

/// Calendar channel settings (CalDAV).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Full URL of the CalDAV calendar collection.
    pub calendar_url: String,
    pub username: String,
    pub password: String,
}

fn default_true() -> bool {
    true
}

/// Per-user notification preferences. Owned by the user, read-only to the
/// engine. Credentials arrive already decrypted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub email: Option<EmailSettings>,
    #[serde(default)]
    pub messaging: Option<MessagingSettings>,
    #[serde(default)]
    pub calendar: Option<CalendarSettings>,
    /// Day counts before renewal at which reminders fire, e.g. [7, 3, 1].
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u32>,
    /// Preferred local send time, "HH:MM".
    #[serde(default = "default_send_time")]
    pub send_time: String,
    /// IANA timezone name, e.g. "Europe/Oslo".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_thresholds() -> Vec<u32> {
    vec![7, 3, 1]
}
fn default_send_time() -> String {
    "09:00".into()
}
fn default_timezone() -> String {
    "UTC".into()
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: None,
            messaging: None,
            calendar: None,
            thresholds: default_thresholds(),
            send_time: default_send_time(),
            timezone: default_timezone(),
        }
    }
}

impl NotificationPreferences {
    /// Validate once at load. Catches malformed data before the scheduler
    /// ever sees this user; an enabled channel missing destination data is
    /// NOT an error here — the dispatcher skips it with a warning.
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(SubwatchError::Config("thresholds must not be empty".into()));
        }
        self.parsed_send_time()?;
        self.parsed_timezone()?;
        Ok(())
    }

    pub fn parsed_send_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.send_time, "%H:%M").map_err(|e| {
            SubwatchError::Config(format!("invalid send_time '{}': {e}", self.send_time))
        })
    }

    pub fn parsed_timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            SubwatchError::Config(format!("invalid timezone '{}'", self.timezone))
        })
    }

    /// Channels the user turned on, whether or not they are fully configured.
    pub fn enabled_channels(&self) -> Vec<ChannelKind> {
        let mut out = Vec::new();
        if self.email.as_ref().is_some_and(|c| c.enabled) {
            out.push(ChannelKind::Email);
        }
        if self.messaging.as_ref().is_some_and(|c| c.enabled) {
            out.push(ChannelKind::Messaging);
        }
        if self.calendar.as_ref().is_some_and(|c| c.enabled) {
            out.push(ChannelKind::Calendar);
        }
        out
    }
}
