//! `tmc-orchestrator` — the reconcile controller (H) that binds the `tmc-core`
//! pipeline together (spec.md §4.H, §5).
//!
//! `tmc-core` supplies the leaf and mid-tier components (A–G); this crate wires
//! them into [`CoreServices`] and drives them through [`ReconcileController`],
//! a fixed-size worker pool pulling reconcile keys off the work queue exactly
//! as spec.md §5 describes.

pub mod controller;
pub mod services;

pub use controller::{ReconcileController, ReconcileError};
pub use services::CoreServices;
