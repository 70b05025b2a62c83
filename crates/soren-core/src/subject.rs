//! Subject naming.
//!
//! Every function here is pure and produces a subject the external agent
//! expects verbatim. The literal tokens (`soren`, `v2`, `cpu`, `bin`,
//! `@intro`, `@settings`, `@actions`, `@form`) and the segment order are part
//! of the wire contract and must never change.
//!
//! `id` is the subject id of the plugin, see
//! [`PluginIdentity::subject_id`](crate::PluginIdentity::subject_id).

/// Root token of every subject.
pub const ROOT: &str = "soren";

/// Literal that introduces the entity segment of gateway subjects.
pub const GATEWAY_SEGMENT: &str = "bin";

/// Placeholder for the entity segment of gateway subscriptions.
pub const WILDCARD: &str = "*";

/// `soren.v2.<id>.@intro`
pub fn intro_subject(id: &str) -> String {
    format!("{ROOT}.v2.{id}.@intro")
}

/// `soren.v2.<id>.@settings`
pub fn settings_subject(id: &str) -> String {
    format!("{ROOT}.v2.{id}.@settings")
}

/// `soren.v2.<id>.@actions`
pub fn actions_list_subject(id: &str) -> String {
    format!("{ROOT}.v2.{id}.@actions")
}

/// `soren.v2.<id>.<method>.@form`
pub fn form_subject(id: &str, method: &str) -> String {
    format!("{ROOT}.v2.{id}.{method}.@form")
}

/// `soren.v2.<id>.<endpoint>`, used for the requirements and settings
/// submit endpoints.
pub fn plugin_subject(id: &str, endpoint: &str) -> String {
    format!("{ROOT}.v2.{id}.{endpoint}")
}

/// `soren.cpu.<id>.<method>`
pub fn execute_subject(id: &str, method: &str) -> String {
    format!("{ROOT}.cpu.{id}.{method}")
}

/// `soren.v2.bin.<entityId>.<id>.<method>`
pub fn gateway_execute_subject(entity_id: &str, id: &str, method: &str) -> String {
    format!("{ROOT}.v2.{GATEWAY_SEGMENT}.{entity_id}.{id}.{method}")
}

/// `soren.cpu.<id>.<jobId>.<command>`
pub fn job_subject(id: &str, job_id: &str, command: &str) -> String {
    format!("{ROOT}.cpu.{id}.{job_id}.{command}")
}

/// `soren.v2.bin.<entityId>.<id>.<jobId>.<command>`
pub fn gateway_job_subject(entity_id: &str, id: &str, job_id: &str, command: &str) -> String {
    format!("{ROOT}.v2.{GATEWAY_SEGMENT}.{entity_id}.{id}.{job_id}.{command}")
}

/// Operational event channel subject.
///
/// `<channel>.<pluginId>.log`, collapsing to `<channel>.log` when the plugin
/// id is itself dot-segmented. Gateway-hosted plugins share one log subject
/// and are told apart by the event `source`.
pub fn event_log_subject(channel: &str, plugin_id: &str) -> String {
    if plugin_id.contains('.') {
        format!("{channel}.log")
    } else {
        format!("{channel}.{plugin_id}.log")
    }
}
