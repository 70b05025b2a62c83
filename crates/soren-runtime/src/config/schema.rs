//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use soren_core::PluginIdentity;
use soren_framework::{DeliveryConfig, DeliveryMode, EventSettings, RetryPolicy};

use super::error::ConfigResult;
use crate::credentials::Credentials;

/// Root configuration structure.
///
/// Field names double as the keys of `soren.toml` and of the nested
/// `SOREN_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SorenConfig {
    /// Address of the agent's message bus.
    pub agent_uri: String,

    /// Credential for the agent connection, PEM or base64 encoded.
    pub agent_cred: Option<String>,

    /// Configured plugin id (`widgets-svc` or `bin.*.<uuid>`).
    pub plugin_id: String,

    /// `Authorization` value sent with operational events.
    pub auth_key: Option<String>,

    /// Operational event channel.
    pub event_channel: Option<String>,

    /// Key/value store channel, passed through to embedders.
    pub store_channel: Option<String>,

    pub logging: LoggingConfig,

    pub delivery: DeliverySettings,
}

impl SorenConfig {
    /// Parses the configured plugin id.
    pub fn identity(&self) -> ConfigResult<PluginIdentity> {
        Ok(PluginIdentity::parse(&self.plugin_id)?)
    }

    /// Event channel settings for the coordinator.
    pub fn event_settings(&self) -> EventSettings {
        EventSettings {
            channel: self.event_channel.clone(),
            auth_key: self.auth_key.clone(),
        }
    }

    /// Decodes the agent credential, if one is configured.
    pub fn credentials(&self) -> ConfigResult<Option<Credentials>> {
        self.agent_cred
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(Credentials::decode)
            .transpose()
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        self.delivery.to_delivery_config()
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// Delivery policy per class of job update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Policy for intermediate progress.
    pub progress: DeliveryMode,

    /// Policy for completion updates.
    pub completion: DeliveryMode,

    /// Attempts of an acknowledged delivery, including the first.
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; the n-th retry sleeps `n × step`.
    pub retry_step_ms: u64,

    /// Per-attempt request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let config = DeliveryConfig::default();
        Self {
            progress: config.progress,
            completion: config.completion,
            max_attempts: config.retry.max_attempts,
            retry_step_ms: duration_ms(config.retry.step),
            request_timeout_ms: duration_ms(config.retry.timeout),
        }
    }
}

impl DeliverySettings {
    /// Converts to the coordinator's delivery policy.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            progress: self.progress,
            completion: self.completion,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                step: Duration::from_millis(self.retry_step_ms),
                timeout: Duration::from_millis(self.request_timeout_ms),
            },
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LoggingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON; needs the `json-log` feature.
    Json,
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of file output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LoggingLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub span_events: SpanEventConfig,
    pub timestamps: bool,
    pub thread_ids: bool,
    /// Include file names and line numbers.
    pub file_location: bool,
    /// Required when `output = "file"`.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Per-target levels, e.g. `soren_transport = "trace"`.
    pub filters: BTreeMap<String, LoggingLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LoggingConfig {
    /// Human-oriented output: pretty, verbose, no timestamps.
    pub fn development() -> Self {
        Self {
            level: LoggingLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: false,
            file_location: true,
            ..Self::base()
        }
    }

    /// Machine-oriented output: JSON lines when available, `info` level.
    pub fn production() -> Self {
        let format = if cfg!(feature = "json-log") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };
        Self {
            format,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            level: LoggingLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            timestamps: true,
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            filters: BTreeMap::new(),
        }
    }
}
