//! # Bot Configuration Module
//!
//! Typed configuration read from the environment (optionally seeded from a
//! `.env` file by `main`). The three behavioural variants of the bot are
//! selected here: registration gating, the rich welcome card, and stub or
//! forwarded photo analysis.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::referral::PLACEHOLDER_BOT_USERNAME;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_WELCOME_IMAGE_URL: &str = "https://calories.fun/welcome.png";
pub const DEFAULT_WEBSITE_URL: &str = "https://calories.fun";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;

/// Configuration errors detected at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN must be set")]
    MissingToken,
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// How meal photos are analysed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Random estimate computed locally
    Stub,
    /// Photo metadata is posted to an external analysis service
    Forward { base_url: String },
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    /// Username used in referral links, without the leading `@`
    pub bot_username: Option<String>,
    pub telegram_api_url: String,
    /// Require a registration before `/submit` and `/referral`
    pub require_registration: bool,
    /// Answer `/start` with the welcome image and inline keyboard
    pub rich_welcome: bool,
    pub welcome_image_url: String,
    pub website_url: String,
    pub analysis: AnalysisMode,
    pub analysis_timeout: Duration,
    /// Address of the webhook receiver, disabled when `None`
    pub webhook_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_username: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            require_registration: true,
            rich_welcome: false,
            welcome_image_url: DEFAULT_WELCOME_IMAGE_URL.to_string(),
            website_url: DEFAULT_WEBSITE_URL.to_string(),
            analysis: AnalysisMode::Stub,
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            webhook_addr: None,
            log_format: LogFormat::Text,
        }
    }
}

impl BotConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let bot_token = get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::MissingToken)?;

        let analysis = match get("ANALYSIS_BASE_URL") {
            Some(base_url) => AnalysisMode::Forward {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            None => AnalysisMode::Stub,
        };

        let analysis_timeout = match get("ANALYSIS_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "ANALYSIS_TIMEOUT_SECS",
                value,
            })?),
            None => defaults.analysis_timeout,
        };

        let webhook_addr = get("WEBHOOK_LISTEN_ADDR")
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "WEBHOOK_LISTEN_ADDR",
                    value,
                })
            })
            .transpose()?;

        let log_format = match get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            bot_token,
            bot_username: get("BOT_USERNAME").map(|name| name.trim_start_matches('@').to_string()),
            telegram_api_url: get("TELEGRAM_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.telegram_api_url),
            require_registration: parse_flag(
                "REQUIRE_REGISTRATION",
                get("REQUIRE_REGISTRATION"),
                defaults.require_registration,
            )?,
            rich_welcome: parse_flag("RICH_WELCOME", get("RICH_WELCOME"), defaults.rich_welcome)?,
            welcome_image_url: get("WELCOME_IMAGE_URL").unwrap_or(defaults.welcome_image_url),
            website_url: get("WEBSITE_URL").unwrap_or(defaults.website_url),
            analysis,
            analysis_timeout,
            webhook_addr,
            log_format,
        })
    }

    /// Username for referral links, falling back to a placeholder
    pub fn referral_username(&self) -> &str {
        self.bot_username
            .as_deref()
            .unwrap_or(PLACEHOLDER_BOT_USERNAME)
    }
}

fn parse_flag(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };

    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
