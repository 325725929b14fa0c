//! # Event Dispatch
//!
//! Routes a decoded envelope to the normalizer for its event family and
//! publishes the result under the family's outbound event name.
//!
//! | event kind | outbound name |
//! |------------|---------------|
//! | `build.running`, `build.finished` | `BuildEvent` |
//! | `job.started`, `job.finished`, `job.activated` | `JobEvent` |
//!
//! Any other kind is rejected before the publisher is touched.

use crate::normalize::{build_attributes, normalize_build_event, normalize_job_event};
use crate::payload::{Build, Envelope};
use crate::{Attributes, Publisher, RelayError};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Outbound event name for build-family events
pub const BUILD_EVENT_NAME: &str = "BuildEvent";

/// Outbound event name for job-family events
pub const JOB_EVENT_NAME: &str = "JobEvent";

// ============================================================================
// Event kinds
// ============================================================================

/// Webhook event kinds this relay handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BuildRunning,
    BuildFinished,
    JobStarted,
    JobFinished,
    JobActivated,
}

impl EventKind {
    /// Every recognized event kind
    pub const ALL: [EventKind; 5] = [
        Self::BuildRunning,
        Self::BuildFinished,
        Self::JobStarted,
        Self::JobFinished,
        Self::JobActivated,
    ];

    /// Wire label as sent in the `X-Buildkite-Event` header
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildRunning => "build.running",
            Self::BuildFinished => "build.finished",
            Self::JobStarted => "job.started",
            Self::JobFinished => "job.finished",
            Self::JobActivated => "job.activated",
        }
    }

    pub fn family(&self) -> EventFamily {
        match self {
            Self::BuildRunning | Self::BuildFinished => EventFamily::Build,
            Self::JobStarted | Self::JobFinished | Self::JobActivated => EventFamily::Job,
        }
    }

    /// Name of the custom event published for this kind
    pub fn event_name(&self) -> &'static str {
        self.family().event_name()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RelayError::UnrecognizedEventKind {
                event_kind: s.to_string(),
            })
    }
}

/// Group of event kinds sharing a normalizer and outbound name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    Build,
    Job,
}

impl EventFamily {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Build => BUILD_EVENT_NAME,
            Self::Job => JOB_EVENT_NAME,
        }
    }
}

// ============================================================================
// Dispatch state machine
// ============================================================================

/// Stages a dispatch moves through, strictly in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Idle,
    Validating,
    Normalizing,
    Publishing,
    Done,
}

impl DispatchStage {
    /// The stage following this one, `None` once done
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Validating),
            Self::Validating => Some(Self::Normalizing),
            Self::Normalizing => Some(Self::Publishing),
            Self::Publishing => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// Tracks the current stage of a single dispatch
#[derive(Debug)]
struct StageTracker {
    stage: DispatchStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: DispatchStage::Idle,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            debug!(from = ?self.stage, to = ?next, "Dispatch stage transition");
            self.stage = next;
        }
    }
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub event_kind: EventKind,
    pub event_name: &'static str,
    pub attributes: Attributes,
}

// ============================================================================
// Dispatch
// ============================================================================

/// Normalize `envelope` according to `event_kind` and publish it
///
/// A build-family event without a build section publishes the zero-valued
/// base attribute set.
///
/// # Errors
///
/// - [`RelayError::UnrecognizedEventKind`] for kinds outside the routing
///   table; nothing is published.
/// - [`RelayError::MalformedPayload`] for job events lacking the job or build
///   section; nothing is published.
/// - [`RelayError::PublishFailure`] carrying the publisher's error unchanged.
pub async fn dispatch_event(
    event_kind: &str,
    envelope: &Envelope,
    publisher: &dyn Publisher,
) -> Result<Dispatched, RelayError> {
    let mut tracker = StageTracker::new();

    tracker.advance();
    let kind = event_kind.parse::<EventKind>().inspect_err(|_| {
        warn!(
            event_kind = %event_kind,
            payload = ?envelope,
            "Unrecognised event type"
        );
    })?;

    tracker.advance();
    let attributes = match kind.family() {
        EventFamily::Build => normalize_build_event(envelope).unwrap_or_else(|| {
            debug!(event_kind = %kind, "No build section; publishing zero-valued build attributes");
            build_attributes(&Build::default(), envelope.pipeline.as_ref())
        }),
        EventFamily::Job => normalize_job_event(envelope)?,
    };

    tracker.advance();
    let event_name = kind.event_name();
    info!(
        event_name = %event_name,
        attribute_count = attributes.len(),
        "Publishing event"
    );
    publisher.publish(event_name, &attributes).await?;

    tracker.advance();
    Ok(Dispatched {
        event_kind: kind,
        event_name,
        attributes,
    })
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
