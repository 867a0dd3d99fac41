use anyhow::{Context, Result};
use serde_yaml::Value as YamlValue;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::ParseIntError;
use std::path::Path;

use crate::models::ConnectivityState;

pub const KEY_BOT_IDENTIFIER: &str = "BotIdentifier";
pub const KEY_EXCHANGE: &str = "EXCHANGE";
pub const KEY_TRADED_PAIR: &str = "TradedPair";
pub const KEY_MATRYOSHKA_URL: &str = "MatryoshkaUrl";
pub const KEY_CANCEL_ORDERS_AUTO: &str = "cancelOrdersAuto";
pub const KEY_SHUTDOWN_TIMEOUT_MS: &str = "ShutdownTimeoutMs";

const CONFIG_KEYS: &[&str] = &[
    KEY_BOT_IDENTIFIER,
    KEY_EXCHANGE,
    KEY_TRADED_PAIR,
    KEY_MATRYOSHKA_URL,
    KEY_CANCEL_ORDERS_AUTO,
    KEY_SHUTDOWN_TIMEOUT_MS,
];

const DEFAULT_EXCHANGE: &str = "null";
const DEFAULT_TRADED_PAIR: &str = "BTC/EUR";
const DEFAULT_MATRYOSHKA_URL: &str = "https://www.example.com/";
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;
pub const HOMEPAGE: &str = "https://github.com/quotegate/quotegate";

#[derive(Debug)]
pub enum ConfigError {
    Missing(String),
    InvalidValue { key: String, value: String },
    InvalidPair(String),
    ParseIntError(ParseIntError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing config value: {}", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid config value {}: {}", key, value)
            }
            ConfigError::InvalidPair(raw) => write!(
                f,
                "Invalid currency pair '{}'; must be BASE/QUOTE, eg BTC/EUR",
                raw
            ),
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

/// Key-value view of configuration and bot identity.
pub trait ConfigStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    /// Absent or unparseable values read as `false`.
    fn get_bool(&self, key: &str) -> bool {
        match self.get_string(key) {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                log::warn!("[CONFIG] {}={} is not a boolean, using false", key, raw);
                false
            }),
            None => false,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("QUOTEGATE_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let mut cfg = match config_path {
            Some(path) => Self::from_yaml_path(path)?,
            None => Self::new(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open config {}", path_ref.display()))?;
        let yaml: HashMap<String, YamlValue> = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse config {}", path_ref.display()))?;

        let mut cfg = Self::new();
        for (key, value) in yaml {
            let text = match value {
                YamlValue::String(s) => s,
                YamlValue::Bool(b) => b.to_string(),
                YamlValue::Number(n) => n.to_string(),
                YamlValue::Null => continue,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key,
                        value: format!("{:?}", other),
                    })
                    .with_context(|| format!("in config {}", path_ref.display()))
                }
            };
            cfg.values.insert(key, text);
        }
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        for key in CONFIG_KEYS {
            if let Ok(value) = env::var(key) {
                log::debug!("[CONFIG] {} overridden from environment", key);
                self.values.insert(key.to_string(), value);
            }
        }
    }
}

impl ConfigStore for MapConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairSpec {
    pub base: String,
    pub quote: String,
}

impl std::str::FromStr for PairSpec {
    type Err = ConfigError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
        match parts.as_slice() {
            [base, quote] if !base.is_empty() && !quote.is_empty() => Ok(PairSpec {
                base: base.to_uppercase(),
                quote: quote.to_uppercase(),
            }),
            _ => Err(ConfigError::InvalidPair(raw.to_string())),
        }
    }
}

/// Typed view over the settings read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bot_identifier: String,
    pub exchange: String,
    pub pair: PairSpec,
    pub matryoshka_url: String,
    pub shutdown_timeout_ms: u64,
}

impl GatewayConfig {
    pub fn from_store(store: &dyn ConfigStore) -> std::result::Result<Self, ConfigError> {
        let bot_identifier = store
            .get_string(KEY_BOT_IDENTIFIER)
            .ok_or_else(|| ConfigError::Missing(KEY_BOT_IDENTIFIER.to_string()))?;
        let exchange = store
            .get_string(KEY_EXCHANGE)
            .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string())
            .to_lowercase();
        let pair = store
            .get_string(KEY_TRADED_PAIR)
            .unwrap_or_else(|| DEFAULT_TRADED_PAIR.to_string())
            .parse()?;
        let matryoshka_url = store
            .get_string(KEY_MATRYOSHKA_URL)
            .unwrap_or_else(|| DEFAULT_MATRYOSHKA_URL.to_string());
        let shutdown_timeout_ms = match store.get_string(KEY_SHUTDOWN_TIMEOUT_MS) {
            Some(raw) => raw.trim().parse()?,
            None => DEFAULT_SHUTDOWN_TIMEOUT_MS,
        };

        Ok(GatewayConfig {
            bot_identifier,
            exchange,
            pair,
            matryoshka_url,
            shutdown_timeout_ms,
        })
    }

    pub fn environment(&self) -> String {
        environment_label(&self.bot_identifier)
    }

    /// Bots whose identifier mentions "auto" start with quoting enabled.
    pub fn initial_auto_start(&self) -> ConnectivityState {
        if self.bot_identifier.contains("auto") {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        }
    }
}

/// Drops a leading "auto" from identifiers longer than four characters.
pub fn environment_label(bot_identifier: &str) -> String {
    if bot_identifier.len() > 4 && bot_identifier.starts_with("auto") {
        bot_identifier[4..].to_string()
    } else {
        bot_identifier.to_string()
    }
}
