//! # Work Queue (spec.md §4.A)
//!
//! A priority, rate-limited, workspace-aware dispatch queue for reconcile keys.
//! Composed of three independent pieces, each testable in isolation:
//!
//! - [`item`] — the work item itself and the effective-priority formula that
//!   prevents starvation and elevates flaky items.
//! - [`backoff`] — the exponential retry policy consulted by `add_rate_limited`.
//! - [`circuit`] — the three-state circuit breaker that guards admission.
//!
//! [`queue::WorkQueue`] wires these together behind `Add`/`Get`/`Done`/`Forget`.

pub mod backoff;
pub mod circuit;
pub mod item;
pub mod queue;

pub use backoff::RetryPolicy;
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use item::{Priority, WorkItem};
pub use queue::{QueueError, WorkQueue};
