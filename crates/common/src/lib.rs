//! Shared types for the tile streaming engine: tile keys, bounding geometry,
//! and the per-frame camera state every other crate reads.

pub mod frame;
pub mod geometry;
pub mod types;

pub use frame::{CameraState, FrameState, Fog, Perspective};
pub use geometry::{Aabb, BoundingSphere, CullingVolume, Intersection, Plane, Rectangle};
pub use types::{ProviderId, TileCoord};
