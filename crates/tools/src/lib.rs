//! Developer tooling: read-only inspection of a running tile scheduler.
//!
//! # Invariants
//! - Inspection never mutates scheduler, tree or cache state.

mod inspector;

pub use inspector::{LayerInfo, SchedulerInspector, SchedulerSummary, TileInfo};

pub fn crate_info() -> &'static str {
    "tilestream-tools v0.1.0"
}
