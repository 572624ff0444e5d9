//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub gateway: GatewaySettings,
    pub sharding: ShardingSettings,
    pub limits: LimitSettings,
    pub reconnect: ReconnectSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Event gateway endpoint and credentials
#[derive(Clone, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    pub token: String,
    #[serde(default = "default_intents")]
    pub intents: u64,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .finish()
    }
}

/// Sharding and identify-concurrency settings
#[derive(Debug, Clone, Deserialize)]
pub struct ShardingSettings {
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    /// Shards run by this process. Empty means all of `0..shard_count`.
    #[serde(default)]
    pub shard_ids: Vec<u32>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_identify_cooldown_ms")]
    pub identify_cooldown_ms: u64,
}

impl ShardingSettings {
    /// Shard ids this process is responsible for
    #[must_use]
    pub fn effective_shard_ids(&self) -> Vec<u32> {
        if self.shard_ids.is_empty() {
            (0..self.shard_count).collect()
        } else {
            self.shard_ids.clone()
        }
    }
}

/// Outbound command limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "default_commands_per_minute")]
    pub commands_per_minute: u32,
}

/// Dial and reconnect behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_reconnect_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
}

// Default value functions
fn default_app_name() -> String {
    "gateway-session".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_intents() -> u64 {
    // GUILDS | GUILD_MESSAGES | GUILD_VOICE_STATES
    (1 << 0) | (1 << 9) | (1 << 7)
}

fn default_shard_count() -> u32 {
    1
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_identify_cooldown_ms() -> u64 {
    5_000
}

fn default_commands_per_minute() -> u32 {
    120
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_dial_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_step_ms() -> u64 {
    2_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sharding = ShardingSettings {
            shard_count: parse_or(&lookup, "SHARD_COUNT", default_shard_count)?,
            shard_ids: lookup("SHARD_IDS")
                .map(|s| parse_list(&s, "SHARD_IDS"))
                .transpose()?
                .unwrap_or_default(),
            max_concurrency: parse_or(&lookup, "MAX_CONCURRENCY", default_max_concurrency)?,
            identify_cooldown_ms: parse_or(
                &lookup,
                "IDENTIFY_COOLDOWN_MS",
                default_identify_cooldown_ms,
            )?,
        };

        if sharding.shard_count == 0 {
            return Err(ConfigError::InvalidValue("SHARD_COUNT", "0".to_string()));
        }
        if sharding.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue("MAX_CONCURRENCY", "0".to_string()));
        }
        if let Some(id) = sharding
            .shard_ids
            .iter()
            .find(|id| **id >= sharding.shard_count)
        {
            return Err(ConfigError::InvalidValue(
                "SHARD_IDS",
                format!("shard {id} is outside 0..{}", sharding.shard_count),
            ));
        }

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: GatewaySettings {
                url: lookup("GATEWAY_URL").unwrap_or_else(default_gateway_url),
                token: lookup("GATEWAY_TOKEN").ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
                intents: parse_or(&lookup, "GATEWAY_INTENTS", default_intents)?,
            },
            sharding,
            limits: LimitSettings {
                commands_per_minute: parse_or(
                    &lookup,
                    "COMMANDS_PER_MINUTE",
                    default_commands_per_minute,
                )?,
            },
            reconnect: ReconnectSettings {
                auto_reconnect: parse_or(&lookup, "AUTO_RECONNECT", default_auto_reconnect)?,
                dial_timeout_ms: parse_or(&lookup, "DIAL_TIMEOUT_MS", default_dial_timeout_ms)?,
                step_ms: parse_or(&lookup, "RECONNECT_STEP_MS", default_reconnect_step_ms)?,
                max_delay_ms: parse_or(
                    &lookup,
                    "RECONNECT_MAX_DELAY_MS",
                    default_reconnect_max_delay_ms,
                )?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default()),
    }
}

fn parse_list(raw: &str, key: &'static str) -> Result<Vec<u32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ConfigError::InvalidValue(key, raw.to_string()))
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
