//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `RELAY_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `RELAY_QUEUE_NETWORK_THREADS` | 4 | Network dispatcher threads (1..=64) |
//! | `RELAY_QUEUE_THREAD_PREFIX` | relay | Dispatcher thread name prefix |
//! | `RELAY_QUEUE_NOTIFY_CANCELLED` | false | Post cancel notifications for skipped requests |
//! | `RELAY_QUEUE_LOCAL_MISS_TO_NETWORK` | false | Forward local-only misses to the network queue |
//! | `RELAY_LOG_FORMAT` | json | `json` or `pretty` |
//! | `RELAY_LOG_LEVEL` | info | `tracing` env-filter directive |
//! | `RELAY_LOG_FILE` | (stderr) | Optional log file path |

use std::path::PathBuf;

use serde::Serialize;

use crate::scheduler::RequestQueueConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Upper bound on network dispatcher threads.
pub const MAX_NETWORK_THREADS: usize = 64;

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub network_threads: usize,
    pub thread_name_prefix: String,
    pub notify_cancelled: bool,
    pub local_miss_to_network: bool,
    pub log_format: LogFormat,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub request_queue: RequestQueueConfig,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`1/0`, `true/false`, `yes/no`, `on/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Load queue configuration from environment.
fn load_queue_config() -> RequestQueueConfig {
    let defaults = RequestQueueConfig::default();
    let network_threads = parse_usize("RELAY_QUEUE_NETWORK_THREADS", defaults.network_threads);
    let network_threads = network_threads.clamp(1, MAX_NETWORK_THREADS);
    let thread_name_prefix = std::env::var("RELAY_QUEUE_THREAD_PREFIX")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or(defaults.thread_name_prefix);
    RequestQueueConfig {
        network_threads,
        thread_name_prefix,
        notify_cancelled: parse_bool("RELAY_QUEUE_NOTIFY_CANCELLED", defaults.notify_cancelled),
        local_miss_to_network: parse_bool(
            "RELAY_QUEUE_LOCAL_MISS_TO_NETWORK",
            defaults.local_miss_to_network,
        ),
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let format = std::env::var("RELAY_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format);
    let level = std::env::var("RELAY_LOG_LEVEL")
        .ok()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(defaults.level);
    let output_path = std::env::var("RELAY_LOG_FILE").ok().map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        request_queue: load_queue_config(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            network_threads: self.request_queue.network_threads,
            thread_name_prefix: self.request_queue.thread_name_prefix.clone(),
            notify_cancelled: self.request_queue.notify_cancelled,
            local_miss_to_network: self.request_queue.local_miss_to_network,
            log_format: self.log.format,
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.clone(),
        }
    }
}
