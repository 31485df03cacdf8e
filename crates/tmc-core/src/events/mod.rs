//! # Event Bus (spec.md §4.B)
//!
//! Typed, workspace-scoped events with dedup and concurrent, timeout-bounded
//! listener fan-out.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventError, Listener};
pub use types::{DedupKey, Event, EventType};
