//! # Buildkite Payload Model
//!
//! Typed shape of the JSON body Buildkite posts to webhook endpoints.
//!
//! Every field is optional on the wire. Fields the normalizer always emits are
//! plain values that fall back to their zero value when the key is missing or
//! `null`; fields that are only emitted when present are `Option`s. Unknown
//! keys are ignored so new Buildkite fields never break decoding.

use crate::RelayError;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize `null` the same way as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Envelope
// ============================================================================

/// Complete decoded webhook body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Event-kind label, duplicated from the `X-Buildkite-Event` header
    #[serde(rename = "event")]
    pub event_type: Option<String>,
    pub build: Option<Build>,
    pub pipeline: Option<Pipeline>,
    pub job: Option<Job>,
}

impl Envelope {
    /// Decode a webhook body
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedPayload`] when the body is not valid JSON
    /// or a field carries a value of the wrong type.
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        Ok(serde_json::from_slice(body)?)
    }
}

// ============================================================================
// Build
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub web_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub number: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub blocked: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub commit: String,
    #[serde(deserialize_with = "null_as_default")]
    pub branch: String,
    pub tag: Option<String>,
    pub source: Option<String>,
    pub creator: Option<Creator>,
    pub created_at: Option<String>,
    pub scheduled_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub rebuilt_from: Option<RebuiltFrom>,
}

impl Build {
    /// Name of the build creator, empty when no creator is attached
    pub fn creator_name(&self) -> &str {
        self.creator.as_ref().map_or("", |c| c.name.as_str())
    }

    /// Id of the build this one was rebuilt from, empty for original builds
    pub fn rebuilt_from_id(&self) -> &str {
        self.rebuilt_from.as_ref().map_or("", RebuiltFrom::id)
    }
}

/// Reference to the build a rebuild originated from
///
/// Older payloads carry the id as a bare string; current payloads embed a
/// small build object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RebuiltFrom {
    Id(String),
    Build {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        number: Option<i64>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl RebuiltFrom {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Build { id, .. } => id.as_deref().unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Creator {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Pipeline the event belongs to
///
/// Only `id` and `slug` are relayed; the counters and visibility are carried
/// for completeness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub web_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(deserialize_with = "null_as_default")]
    pub repository: String,
    #[serde(deserialize_with = "null_as_default")]
    pub scheduled_builds_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub running_builds_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub scheduled_jobs_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub running_jobs_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub waiting_jobs_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: String,
}

// ============================================================================
// Job
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub job_type: String,
    pub name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    pub command: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub web_url: String,
    pub exit_status: Option<i64>,
    pub created_at: Option<String>,
    pub scheduled_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub retried: Option<bool>,
    pub retries_count: Option<i64>,
    pub agent: Option<Agent>,
}

/// Agent that ran (or is about to run) a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Agent {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub web_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub connection_state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub priority: i64,
    /// Agent tags, each encoded as `key=value`
    #[serde(rename = "meta_data", deserialize_with = "null_as_default")]
    pub metadata: Vec<String>,
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
