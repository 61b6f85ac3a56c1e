use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::routing::strategy::StrategyKind;

/// Connection parameters for the shared store, read from `STORE_*` variables.
///
/// The built-in in-process store ignores the network fields; a networked
/// `Store` implementation consumes all of them.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
    pub use_tls: bool,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("STORE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("STORE_PORT", 6379),
            db: env_parse("STORE_DB", 0),
            password: std::env::var("STORE_PASSWORD").ok().filter(|p| !p.is_empty()),
            use_tls: std::env::var("STORE_USE_TLS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Gate-side settings, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub port: u16,
    pub dispatch_timeout: Duration,
    pub strategy: StrategyKind,
    pub max_body_bytes: usize,
}

impl GateConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("GATE_PORT", 9000),
            dispatch_timeout: Duration::from_millis(env_parse("DISPATCH_TIMEOUT_MS", 30_000u64)),
            strategy: env_parse("ROUTE_STRATEGY", StrategyKind::RoundRobin),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 20 * 1024 * 1024),
        }
    }
}

/// Parses an environment variable, falling back to `default` when the
/// variable is unset or unparsable (a warning is logged for the latter).
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value {:?} for {}, using default {:?}", raw, key, default);
            default
        }),
        Err(_) => default,
    }
}
