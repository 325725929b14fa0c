//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the publisher interfaces that need no
//! external service.

pub mod memory_publisher;

pub use memory_publisher::{MemoryPublisher, PublishedEvent};
