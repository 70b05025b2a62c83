//! JSON payloads exchanged with the agent.
//!
//! Field names follow the agent's wire format exactly, which is why several
//! of them are renamed (`replyTo`, `jobId`, `_registry`).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form JSON object.
pub type JsonMap = Map<String, Value>;

// =============================================================================
// Plugin metadata
// =============================================================================

/// Reply to `soren.v2.<id>.@intro`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginIntro {
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
}

/// Information the plugin needs from the operator before it can run.
///
/// The form is submitted to `soren.v2.<id>.<replyTo>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(rename = "replyTo", default)]
    pub reply_to: String,
    #[serde(default)]
    pub jsonui: JsonMap,
    #[serde(default)]
    pub jsonschema: JsonMap,
}

/// Reply to `soren.v2.<id>.@settings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "replyTo", default)]
    pub reply_to: String,
    #[serde(default)]
    pub jsonui: JsonMap,
    #[serde(default)]
    pub jsonschema: JsonMap,
    /// Current settings values.
    #[serde(default)]
    pub data: JsonMap,
}

/// Icon shown next to an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(rename = "ref", default)]
    pub reference: String,
    #[serde(default)]
    pub icon: String,
}

/// One entry of the `soren.v2.<id>.@actions` catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: Icon,
}

/// Reply to `soren.v2.<id>.<method>.@form`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionForm {
    #[serde(default)]
    pub jsonui: JsonMap,
    #[serde(default)]
    pub jsonschema: JsonMap,
}

/// Body of an execute request as sent by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequestContent {
    #[serde(rename = "_registry", default)]
    pub registry: JsonMap,
    #[serde(default)]
    pub body: JsonMap,
}

// =============================================================================
// Jobs
// =============================================================================

/// Opaque job identifier minted when an execute request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Progress value that marks a job as finished.
pub const PROGRESS_COMPLETE: u8 = 100;

/// A progress update for a running job.
///
/// Successive updates are not required to be monotonic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Percentage in `0..=100`; larger values are refused by the reporter.
    pub progress: u8,
    #[serde(default)]
    pub frame: Frame,
    #[serde(default)]
    pub details: JsonMap,
}

impl JobProgress {
    /// Creates an update with the given percentage and no details.
    pub fn new(progress: u8) -> Self {
        Self {
            progress,
            ..Default::default()
        }
    }

    /// Attaches a details map.
    pub fn with_details(mut self, details: JsonMap) -> Self {
        self.details = details;
        self
    }

    /// Attaches a human-readable frame.
    pub fn with_frame(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.frame = Frame {
            title: title.into(),
            content: content.into(),
        };
        self
    }

    /// Returns `true` once the job reports 100 %.
    pub fn is_complete(&self) -> bool {
        self.progress == PROGRESS_COMPLETE
    }

    /// Returns `true` if the percentage is at most 100.
    pub fn is_in_range(&self) -> bool {
        self.progress <= PROGRESS_COMPLETE
    }
}

/// Title and content rendered alongside a progress update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Envelope used for accept and reject replies and for the `done` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBodyContent {
    #[serde(rename = "jobId", default)]
    pub job_id: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub details: JsonMap,
    #[serde(default)]
    pub commit_on: String,
}

/// Command segment of a job subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Progress,
    Done,
    Stop,
    ContextCurrent,
    ContextPath,
    Custom(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Progress => "progress",
            Self::Done => "done",
            Self::Stop => "stop",
            Self::ContextCurrent => "context/current",
            Self::ContextPath => "context/path",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operational events
// =============================================================================

/// Kind of an operational event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Log,
    #[serde(untagged)]
    Custom(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => f.write_str("log"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Severity of an operational event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Structured event sent to the operational channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub event: EventType,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    #[serde(default)]
    pub details: JsonMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_range() {
        assert!(JobProgress::new(0).is_in_range());
        assert!(JobProgress::new(100).is_in_range());
        assert!(JobProgress::new(100).is_complete());
        assert!(!JobProgress::new(101).is_in_range());
        assert!(!JobProgress::new(255).is_complete());
    }

    #[test]
    fn test_catalogue_round_trip() {
        let catalogue = vec![
            ActionDescriptor {
                method: "resize".into(),
                description: "Resize a widget".into(),
                title: "Resize".into(),
                icon: Icon {
                    reference: "material".into(),
                    icon: "crop".into(),
                },
            },
            ActionDescriptor {
                method: "scan.gen.graph".into(),
                ..Default::default()
            },
        ];

        let bytes = serde_json::to_vec(&catalogue).unwrap();
        let decoded: Vec<ActionDescriptor> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, catalogue);
    }

    #[test]
    fn test_wire_field_names() {
        let intro = PluginIntro {
            name: "Widgets".into(),
            author: "ops".into(),
            version: "1.0.0".into(),
            requirements: None,
        };
        assert_eq!(
            serde_json::to_value(&intro).unwrap(),
            json!({"name": "Widgets", "author": "ops", "version": "1.0.0"})
        );

        let body = JobBodyContent {
            job_id: "job-1".into(),
            progress: 100,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"jobId": "job-1", "progress": 100, "details": {}, "commit_on": ""})
        );

        let icon = Icon {
            reference: "r".into(),
            icon: "i".into(),
        };
        assert_eq!(serde_json::to_value(&icon).unwrap(), json!({"ref": "r", "icon": "i"}));
    }

    #[test]
    fn test_event_enums_serialize_lowercase() {
        assert_eq!(serde_json::to_value(EventType::Log).unwrap(), json!("log"));
        assert_eq!(
            serde_json::to_value(EventType::Custom("deploy".into())).unwrap(),
            json!("deploy")
        );
        assert_eq!(serde_json::to_value(LogLevel::Warn).unwrap(), json!("warn"));
    }

    #[test]
    fn test_command_segments() {
        assert_eq!(Command::Progress.as_str(), "progress");
        assert_eq!(Command::Done.to_string(), "done");
        assert_eq!(Command::ContextPath.as_str(), "context/path");
        assert_eq!(Command::Custom("pause".into()).as_str(), "pause");
    }
}
