//! # Event Normalization
//!
//! Flattens a decoded [`Envelope`] into the attribute mapping published as a
//! single custom event. One function per event family:
//!
//! - [`normalize_build_event`] for `build.*` events
//! - [`normalize_job_event`] for `job.*` events
//!
//! Both are pure: the same envelope always yields the same mapping.

use crate::payload::{Agent, Build, Envelope, Pipeline};
use crate::RelayError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Prefix of the keys synthesized from agent metadata entries
pub const AGENT_META_PREFIX: &str = "AgentMeta_";

/// Flat attribute mapping sent to the metrics backend
///
/// Keys are not a fixed schema: agent metadata adds keys discovered at
/// runtime.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Bool(value) => write!(f, "{}", value),
        }
    }
}

// ============================================================================
// Build events
// ============================================================================

/// Normalize a `build.running` / `build.finished` event
///
/// Returns `None` when the envelope carries no build section.
pub fn normalize_build_event(envelope: &Envelope) -> Option<Attributes> {
    let build = envelope.build.as_ref()?;
    Some(build_attributes(build, envelope.pipeline.as_ref()))
}

/// Attribute set for a build, always containing the eleven base keys
pub(crate) fn build_attributes(build: &Build, pipeline: Option<&Pipeline>) -> Attributes {
    let (pipeline_id, pipeline_slug) = pipeline_identity(pipeline);

    let mut data = Attributes::new();
    data.insert("BuildID".to_string(), build.id.as_str().into());
    data.insert("BuildNumber".to_string(), build.number.into());
    data.insert("PipelineID".to_string(), pipeline_id.into());
    data.insert("PipelineSlug".to_string(), pipeline_slug.into());
    data.insert("State".to_string(), build.state.as_str().into());
    data.insert("Blocked".to_string(), build.blocked.into());
    data.insert("Branch".to_string(), build.branch.as_str().into());
    data.insert("Message".to_string(), build.message.as_str().into());
    data.insert("CreatedBy".to_string(), build.creator_name().into());
    data.insert("WebURL".to_string(), build.web_url.as_str().into());
    data.insert("RebuiltFrom".to_string(), build.rebuilt_from_id().into());

    insert_timestamp(&mut data, "StartedAt", build.started_at.as_deref());
    insert_timestamp(&mut data, "FinishedAt", build.finished_at.as_deref());

    data
}

// ============================================================================
// Job events
// ============================================================================

/// Normalize a `job.started` / `job.finished` / `job.activated` event
///
/// # Errors
///
/// Returns [`RelayError::MalformedPayload`] when the envelope lacks the job
/// or build section.
pub fn normalize_job_event(envelope: &Envelope) -> Result<Attributes, RelayError> {
    let job = envelope
        .job
        .as_ref()
        .ok_or_else(|| missing_section("job"))?;
    let build = envelope
        .build
        .as_ref()
        .ok_or_else(|| missing_section("build"))?;
    let (pipeline_id, pipeline_slug) = pipeline_identity(envelope.pipeline.as_ref());

    let mut data = Attributes::new();
    data.insert("JobID".to_string(), job.id.as_str().into());
    data.insert("JobState".to_string(), job.state.as_str().into());
    data.insert("JobWebURL".to_string(), job.web_url.as_str().into());
    data.insert("BuildID".to_string(), build.id.as_str().into());
    data.insert("BuildNumber".to_string(), build.number.into());
    data.insert("BuildState".to_string(), build.state.as_str().into());
    data.insert("PipelineID".to_string(), pipeline_id.into());
    data.insert("PipelineSlug".to_string(), pipeline_slug.into());
    data.insert("Blocked".to_string(), build.blocked.into());
    data.insert("Branch".to_string(), build.branch.as_str().into());
    data.insert("Message".to_string(), build.message.as_str().into());
    data.insert("CreatedBy".to_string(), build.creator_name().into());

    if let Some(name) = &job.name {
        data.insert("JobName".to_string(), name.as_str().into());
    }
    if let Some(command) = &job.command {
        data.insert("Command".to_string(), command.as_str().into());
    }
    if let Some(retried) = job.retried {
        data.insert("Retried".to_string(), retried.into());
    }
    if let Some(retries_count) = job.retries_count {
        data.insert("RetriesCount".to_string(), retries_count.into());
    }
    if let Some(exit_status) = job.exit_status {
        data.insert("ExitStatus".to_string(), exit_status.into());
    }
    insert_timestamp(&mut data, "StartedAt", job.started_at.as_deref());
    insert_timestamp(&mut data, "FinishedAt", job.finished_at.as_deref());

    if let Some(agent) = &job.agent {
        insert_agent(&mut data, agent);
    }

    Ok(data)
}

fn insert_agent(data: &mut Attributes, agent: &Agent) {
    data.insert("AgentID".to_string(), agent.id.as_str().into());
    data.insert("AgentName".to_string(), agent.name.as_str().into());
    data.insert("AgentWebURL".to_string(), agent.web_url.as_str().into());
    data.insert("AgentVersion".to_string(), agent.version.as_str().into());
    data.insert("AgentPriority".to_string(), agent.priority.into());

    for entry in &agent.metadata {
        match entry.split_once('=') {
            Some((key, value)) => {
                data.insert(format!("{}{}", AGENT_META_PREFIX, key), value.into());
            }
            None => {
                warn!(
                    entry = %entry,
                    agent_id = %agent.id,
                    "Ignoring agent metadata entry (insufficient data for mapping to a key = value)"
                );
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Timestamps are emitted only when present and non-empty
fn insert_timestamp(data: &mut Attributes, key: &str, value: Option<&str>) {
    if let Some(timestamp) = value.filter(|t| !t.is_empty()) {
        data.insert(key.to_string(), timestamp.into());
    }
}

fn pipeline_identity(pipeline: Option<&Pipeline>) -> (&str, &str) {
    pipeline.map_or(("", ""), |p| (p.id.as_str(), p.slug.as_str()))
}

fn missing_section(section: &str) -> RelayError {
    RelayError::MalformedPayload {
        message: format!("job event is missing the '{}' section", section),
    }
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
