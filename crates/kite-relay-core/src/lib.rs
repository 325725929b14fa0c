//! # Kite-Relay Core
//!
//! Core business logic for relaying Buildkite pipeline webhooks to a metrics
//! backend as custom events.
//!
//! This crate contains the domain logic for authenticating webhook calls,
//! decoding the Buildkite payload, flattening it into an attribute mapping and
//! dispatching it to a [`Publisher`].
//!
//! ## Architecture
//!
//! - [`payload`]: typed shape of the Buildkite webhook body
//! - [`normalize`]: pure functions turning a payload into [`Attributes`]
//! - [`dispatch`]: event-kind routing and publishing
//! - [`gate`]: token and body checks performed before dispatch
//! - [`relay`]: the per-invocation pipeline tying the pieces together
//!
//! Infrastructure (the real metrics backend, the HTTP listener) is injected
//! through the [`Publisher`] and [`PublisherConnector`] traits.
//!
//! ## Usage
//!
//! ```rust
//! use kite_relay_core::{normalize::normalize_build_event, AttributeValue, Envelope};
//!
//! let envelope = Envelope::from_slice(br#"{"build": {"id": "b-1", "number": 7}}"#).unwrap();
//! let attributes = normalize_build_event(&envelope).unwrap();
//! assert_eq!(attributes["BuildNumber"], AttributeValue::Int(7));
//! ```

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod payload;
pub mod publisher;
pub mod relay;

pub use adapters::{MemoryPublisher, PublishedEvent};
pub use config::{RelayConfig, Secret, DEFAULT_APP_NAME};
pub use dispatch::{dispatch_event, DispatchStage, Dispatched, EventFamily, EventKind};
pub use error::{ErrorCategory, PublishError, RelayError, ValidationError};
pub use gate::{AdmittedEvent, RequestGate, WebhookHeaders, WebhookRequest};
pub use normalize::{AttributeValue, Attributes};
pub use payload::Envelope;
pub use publisher::{Publisher, PublisherConnector, CONNECT_TIMEOUT};
pub use relay::{EventRelay, WebhookProcessor};
