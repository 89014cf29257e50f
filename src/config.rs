use std::{collections::HashSet, str::FromStr, time::Duration};

use reqwest::Url;
use secure_string::SecureString;

use crate::portal::RedemptionPolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} is invalid - {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug)]
pub struct PortalConfig {
    pub base_url: Url,
    pub username: String,
    pub password: SecureString,
    pub timeout: Duration,
    pub redemption: RedemptionPolicy,
}

#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecureString,
    pub api_base: Url,
}

#[derive(Debug)]
pub struct Config {
    pub portal: PortalConfig,
    pub telegram: TelegramConfig,
    pub authorized_user_ids: HashSet<String>,
}

impl Config {
    /// Reads the process environment, after loading `.env` when there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to load .env - {e}");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let portal = PortalConfig {
            base_url: parse_value("PARKING_BASE_URL", &required("PARKING_BASE_URL")?)?,
            username: required("PARKING_USERNAME")?,
            password: SecureString::from(required("PARKING_PASSWORD")?),
            timeout: Duration::from_secs(
                lookup("PARKING_TIMEOUT_SECS")
                    .map(|value| parse_value("PARKING_TIMEOUT_SECS", &value))
                    .transpose()?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            redemption: lookup("PARKING_REDEEM_INTERVAL_MS")
                .map(|value| parse_value("PARKING_REDEEM_INTERVAL_MS", &value))
                .transpose()?
                .map(|millis| RedemptionPolicy {
                    interval: Duration::from_millis(millis),
                })
                .unwrap_or_default(),
        };

        let telegram = TelegramConfig {
            bot_token: SecureString::from(required("TELEGRAM_BOT_TOKEN")?),
            api_base: parse_value(
                "TELEGRAM_API_BASE",
                &lookup("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            )?,
        };

        let authorized_user_ids = lookup("AUTHORIZED_USER_IDS")
            .map(|ids| parse_id_list(&ids))
            .unwrap_or_default();
        if authorized_user_ids.is_empty() {
            tracing::warn!("AUTHORIZED_USER_IDS is empty, every command will be denied");
        }

        Ok(Self {
            portal,
            telegram,
            authorized_user_ids,
        })
    }
}

fn parse_value<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_id_list(ids: &str) -> HashSet<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
