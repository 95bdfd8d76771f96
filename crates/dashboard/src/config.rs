use std::path::PathBuf;
use std::time::Duration;

use codeflow_sync::reconnect::ReconnectConfig;
use codeflow_sync::{ResumePolicy, SyncConfig};

/// An environment variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("RECONNECT_MAX_SECS ({max}) must not be below RECONNECT_INITIAL_SECS ({initial})")]
    ReconnectBounds { initial: u64, max: u64 },
}

/// Dashboard configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend running locally.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Jobs API base URL including the `/api` prefix.
    pub api_url: String,
    /// Push channel WebSocket URL.
    pub ws_url: String,
    pub request_timeout: Duration,
    pub sync: SyncConfig,
    /// Where rendered diagram sources are written.
    pub diagram_dir: PathBuf,
    /// Source file to submit as a new job at startup.
    pub submit_source: Option<PathBuf>,
}

impl DashboardConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                      |
    /// |-----------------------------|------------------------------|
    /// | `API_BASE_URL`              | `http://localhost:8081/api`  |
    /// | `WS_URL`                    | `ws://localhost:8081/ws`     |
    /// | `POLL_INTERVAL_MS`          | `2000`                       |
    /// | `RECONNECT_INITIAL_SECS`    | `5`                          |
    /// | `RECONNECT_MAX_SECS`        | `60`                         |
    /// | `RESUME_POLLING_AFTER_SECS` | `30` (`never` disables)      |
    /// | `REQUEST_TIMEOUT_SECS`      | `10`                         |
    /// | `DIAGRAM_OUTPUT_DIR`        | `./diagrams`                 |
    /// | `SUBMIT_SOURCE_FILE`        | unset                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("API_BASE_URL").unwrap_or_else(|| "http://localhost:8081/api".into());
        let ws_url = lookup("WS_URL").unwrap_or_else(|| "ws://localhost:8081/ws".into());

        let poll_interval_ms = positive(&lookup, "POLL_INTERVAL_MS", 2000)?;
        let reconnect_initial = positive(&lookup, "RECONNECT_INITIAL_SECS", 5)?;
        let reconnect_max = positive(&lookup, "RECONNECT_MAX_SECS", 60)?;
        if reconnect_max < reconnect_initial {
            return Err(ConfigError::ReconnectBounds {
                initial: reconnect_initial,
                max: reconnect_max,
            });
        }
        let request_timeout_secs = positive(&lookup, "REQUEST_TIMEOUT_SECS", 10)?;

        let resume_policy = match lookup("RESUME_POLLING_AFTER_SECS") {
            Some(v) if v.trim().eq_ignore_ascii_case("never") => ResumePolicy::Never,
            Some(v) => ResumePolicy::After(Duration::from_secs(parse_positive(
                "RESUME_POLLING_AFTER_SECS",
                &v,
            )?)),
            None => ResumePolicy::After(Duration::from_secs(30)),
        };

        let diagram_dir = lookup("DIAGRAM_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./diagrams"));
        let submit_source = lookup("SUBMIT_SOURCE_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            ws_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            sync: SyncConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                reconnect: ReconnectConfig {
                    initial_delay: Duration::from_secs(reconnect_initial),
                    max_delay: Duration::from_secs(reconnect_max),
                    ..ReconnectConfig::default()
                },
                resume_policy,
            },
            diagram_dir,
            submit_source,
        })
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        Some(value) => parse_positive(var, &value),
        None => Ok(default),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            expected: "a positive integer",
        }),
    }
}
