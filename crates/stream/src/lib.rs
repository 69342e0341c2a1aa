//! Tile streaming: quadtree LOD selection, download scheduling and the
//! tile replacement policy.
//!
//! # Invariants
//! - All tree, queue and cache mutation happens on the thread calling
//!   [`TileScheduler::render`]; fetch completions are folded in by polling.
//! - A tile touched during the current frame is never evicted.
//! - A node at level `L` that meets the screen-space-error target is never
//!   refined into level `L + 1` in the same frame.
//! - Every cache reference a payload takes is released when the payload is
//!   freed or the provider is removed.

mod binding;
mod config;
mod lru;
mod payload;
mod queue;
mod render_queues;
mod render_target;
mod scheduler;
mod terrain;
mod tree;

pub use binding::TileAssetBinding;
pub use config::{ConfigError, SchedulerConfig};
pub use lru::LruQueue;
pub use payload::{AdvanceContext, TerrainState, TilePayload};
pub use queue::Queue;
pub use render_queues::RenderQueueManager;
pub use render_target::{LayerDraw, TileRenderer};
pub use scheduler::{FrameStats, TileScheduler};
pub use terrain::{
    DEFAULT_HEIGHTMAP_WIDTH, FlatTerrainProvider, TerrainProvider,
    estimate_level_zero_geometric_error,
};
pub use tree::{PRIORITY_EPSILON, TileHandle, TileNode, TileTree};

pub fn crate_info() -> &'static str {
    "tilestream-stream v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("stream"));
    }
}
