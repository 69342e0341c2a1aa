//! Tile renderers: consumers of the scheduler's per-frame selection.
//!
//! # Invariants
//! - Renderers never mutate tile or cache state beyond acknowledging a
//!   layer's changed flag.
//! - A tile is drawn at most once per frame; `unrender` always follows the
//!   last `render` of a tile that dropped out of the selection.
//!
//! # Workaround
//! No GPU backend lives here. `DebugTextRenderer` writes a text log and
//! `RecordingRenderer` keeps the drawn state in memory; both implement the
//! same `TileRenderer` trait a real backend would.

mod recording;
mod renderer;

pub use recording::{LayerRecord, RecordingRenderer, RenderEvent};
pub use renderer::DebugTextRenderer;

pub fn crate_info() -> &'static str {
    "tilestream-render v0.1.0"
}
