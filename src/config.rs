use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Server settings, read once from `LODGE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub reap_interval: Duration,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::load(|key| env::var(key).ok())
    }

    /// Build from any variable source. Unset or unparsable values fall back to defaults.
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let reap_secs: u64 = try_load(&lookup, "LODGE_REAP_INTERVAL_SECS", 5);
        Self {
            port: try_load(&lookup, "LODGE_PORT", 5433),
            bind: lookup("LODGE_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: lookup("LODGE_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            password: lookup("LODGE_PASSWORD").unwrap_or_else(|| "lodge".into()),
            max_connections: try_load(&lookup, "LODGE_MAX_CONNECTIONS", 256).max(1),
            compact_threshold: try_load(&lookup, "LODGE_COMPACT_THRESHOLD", 1000),
            reap_interval: Duration::from_secs(reap_secs.max(1)),
            tls_cert: lookup("LODGE_TLS_CERT"),
            tls_key: lookup("LODGE_TLS_KEY"),
            metrics_port: lookup("LODGE_METRICS_PORT").and_then(|raw| parse_or_warn("LODGE_METRICS_PORT", &raw)),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_or_warn(key, &raw).unwrap_or_else(|| {
            warn!("using default {key}={default}");
            default
        }),
        None => default,
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| warn!("invalid {key} value {raw:?}: {e}"))
        .ok()
}
