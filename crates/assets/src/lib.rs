//! Tile assets: providers, cancellable fetches and the shared asset cache.
//!
//! # Invariants
//! - Exactly one live entry exists per (provider, x, y, level) while it is held.
//! - An entry is evicted exactly when its last holder releases it.
//! - Fetch completions are folded into cache state only when the frame thread polls.
//!
//! Failures never propagate out of this crate as errors; they are recorded on
//! the entry and resolved by the binding layer above.

mod cache;
mod fetch;
mod grid;
mod image;
mod provider;

pub use cache::{AssetCache, AssetKey, AssetState, CachedAsset};
pub use fetch::{FetchError, FetchHandle, FetchOutcome, FetchRequest};
pub use grid::GridImageryProvider;
pub use image::TileImage;
pub use provider::{AssetProvider, ProviderCollection, ProviderEvent, ProviderLayer};

pub fn crate_info() -> &'static str {
    "tilestream-assets v0.1.0"
}
