use glam::DVec3;
use tilestream_assets::{AssetCache, ProviderCollection};
use tilestream_common::{Aabb, BoundingSphere, CameraState, ProviderId, Rectangle, TileCoord};
use tilestream_tiling::TilingScheme;

use crate::lru::LruQueue;
use crate::payload::{AdvanceContext, TilePayload};
use crate::terrain::TerrainProvider;

/// Distance under which a tile centre counts as coincident with the camera.
pub const PRIORITY_EPSILON: f64 = 1e-5;

/// Index of a node in a [`TileTree`]. Stable while the node is live; the
/// slot is reused once its subtree is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileHandle(u32);

impl TileHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One quadrant of the quadtree.
///
/// Bounds are computed once from the coordinate. `distance` is only as fresh
/// as the last frame in which the camera moved.
#[derive(Debug)]
pub struct TileNode {
    coord: TileCoord,
    parent: Option<TileHandle>,
    children: Option<[TileHandle; 4]>,
    pub(crate) lru_prev: Option<TileHandle>,
    pub(crate) lru_next: Option<TileHandle>,
    rectangle: Rectangle,
    native_rectangle: Rectangle,
    aabb: Aabb,
    sphere: BoundingSphere,
    distance: Option<f64>,
    priority: f64,
    payload: Option<TilePayload>,
}

impl TileNode {
    fn new(coord: TileCoord, parent: Option<TileHandle>, scheme: &dyn TilingScheme) -> Self {
        let (x, y, level) = (coord.x, coord.y, coord.level);
        Self {
            coord,
            parent,
            children: None,
            lru_prev: None,
            lru_next: None,
            rectangle: scheme.tile_xy_to_rectangle(x, y, level),
            native_rectangle: scheme.tile_xy_to_native_rectangle(x, y, level),
            aabb: scheme.tile_xy_to_native_aabb(x, y, level),
            sphere: scheme.tile_xy_to_native_sphere(x, y, level),
            distance: None,
            priority: 0.0,
            payload: None,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn level(&self) -> u32 {
        self.coord.level
    }

    pub fn parent(&self) -> Option<TileHandle> {
        self.parent
    }

    /// Children if they were ever created.
    pub fn children(&self) -> Option<[TileHandle; 4]> {
        self.children
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    pub fn native_rectangle(&self) -> &Rectangle {
        &self.native_rectangle
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    pub fn center(&self) -> DVec3 {
        self.aabb.center()
    }

    /// Last computed distance to the camera, if any.
    pub fn distance(&self) -> Option<f64> {
        self.distance
    }

    pub fn update_distance(&mut self, camera_position: DVec3) -> f64 {
        let distance = self.aabb.distance_to(camera_position);
        self.distance = Some(distance);
        distance
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Score the node for download ordering. Lower is more urgent.
    ///
    /// Tiles straight ahead of the camera score by distance alone; tiles off
    /// to the side are penalised up to twice their distance.
    pub fn compute_priority(&mut self, camera: &CameraState) -> f64 {
        let offset = self.center() - camera.position;
        let length = offset.length();
        self.priority = if length < PRIORITY_EPSILON {
            0.0
        } else {
            let distance = self.distance.unwrap_or(length);
            (1.0 - (offset / length).dot(camera.direction)) * distance
        };
        self.priority
    }

    pub fn payload(&self) -> Option<&TilePayload> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut TilePayload> {
        self.payload.as_mut()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// A payload exists, terrain is ready and the base layer can draw.
    pub fn is_renderable(&self, cache: &AssetCache, providers: &ProviderCollection) -> bool {
        self.payload
            .as_ref()
            .is_some_and(|p| p.is_renderable(cache, providers))
    }

    /// True for nodes never visited or with outstanding work.
    pub fn needs_loading(&self) -> bool {
        self.payload.as_ref().is_none_or(TilePayload::needs_loading)
    }

    /// No payload binding holds an in-flight fetch.
    pub fn is_eligible_for_unload(&self, cache: &AssetCache) -> bool {
        self.payload
            .as_ref()
            .is_none_or(|p| p.is_eligible_for_unload(cache))
    }

    pub fn ensure_payload(&mut self) -> &mut TilePayload {
        self.payload.get_or_insert_with(TilePayload::new)
    }

    /// Attach a payload if needed and step its state machines once.
    pub fn advance(
        &mut self,
        cache: &mut AssetCache,
        providers: &ProviderCollection,
        terrain: &dyn TerrainProvider,
    ) {
        let mut ctx = AdvanceContext {
            cache,
            providers,
            terrain,
            rectangle: self.rectangle,
            priority: self.priority,
        };
        let coord = self.coord;
        self.payload
            .get_or_insert_with(TilePayload::new)
            .advance(coord, &mut ctx);
    }

    /// Release the payload and its cache references.
    pub fn free_payload(&mut self, cache: &mut AssetCache) {
        if let Some(mut payload) = self.payload.take() {
            payload.free(cache);
        }
    }

    pub fn is_in_lru(&self) -> bool {
        self.lru_prev.is_some() || self.lru_next.is_some()
    }
}

/// Arena of live nodes.
///
/// Slots of released subtrees go on a free list and are reused by the next
/// children created, so memory follows the LRU queue rather than every tile
/// ever visited.
#[derive(Debug, Default)]
pub struct TileTree {
    slots: Vec<Option<TileNode>>,
    free: Vec<u32>,
}

impl TileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_root(&mut self, coord: TileCoord, scheme: &dyn TilingScheme) -> TileHandle {
        self.push(TileNode::new(coord, None, scheme))
    }

    /// Children of `handle`, created on first request and memoized.
    pub fn children(&mut self, handle: TileHandle, scheme: &dyn TilingScheme) -> [TileHandle; 4] {
        if let Some(children) = self.node(handle).children {
            return children;
        }
        let coords = self.node(handle).coord.children();
        let children = coords.map(|coord| self.push(TileNode::new(coord, Some(handle), scheme)));
        self.node_mut(handle).children = Some(children);
        children
    }

    fn push(&mut self, node: TileNode) -> TileHandle {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(node);
                TileHandle(index)
            }
            None => {
                let handle = TileHandle(self.slots.len() as u32);
                self.slots.push(Some(node));
                handle
            }
        }
    }

    pub fn get(&self, handle: TileHandle) -> Option<&TileNode> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: TileHandle) -> Option<&mut TileNode> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    /// Panics on a released handle or one from another tree.
    pub fn node(&self, handle: TileHandle) -> &TileNode {
        match self.get(handle) {
            Some(node) => node,
            None => panic!("{handle:?} does not refer to a live tile"),
        }
    }

    pub fn node_mut(&mut self, handle: TileHandle) -> &mut TileNode {
        match self.get_mut(handle) {
            Some(node) => node,
            None => panic!("{handle:?} does not refer to a live tile"),
        }
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileHandle, &TileNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (TileHandle(i as u32), node)))
    }

    /// Nodes currently carrying a payload.
    pub fn loaded_count(&self) -> usize {
        self.iter().filter(|(_, n)| n.has_payload()).count()
    }

    /// Drop `provider`'s binding from every payload. Returns the number removed.
    pub fn strip_provider(&mut self, provider: ProviderId, cache: &mut AssetCache) -> usize {
        self.slots
            .iter_mut()
            .flatten()
            .filter_map(|node| node.payload.as_mut())
            .map(|payload| payload.remove_binding(provider, cache))
            .filter(|removed| *removed)
            .count()
    }

    /// Release the subtrees that `evicted` tiles left without any queued or
    /// loaded node.
    ///
    /// Starting at each evicted tile's parent, a parent whose four child
    /// subtrees are all idle forgets its children and the walk moves up.
    /// Roots are never released. Returns the number of nodes freed.
    pub fn release_idle(&mut self, evicted: &[TileHandle], lru: &LruQueue) -> usize {
        let mut released = 0;
        for &handle in evicted {
            let mut cursor = self.get(handle).and_then(TileNode::parent);
            while let Some(parent) = cursor {
                let Some(children) = self.node(parent).children else {
                    break;
                };
                if !children.iter().all(|&child| self.is_idle(child, lru)) {
                    break;
                }
                for child in children {
                    released += self.release_subtree(child);
                }
                let node = self.node_mut(parent);
                node.children = None;
                cursor = node.parent;
            }
        }
        if released > 0 {
            tracing::debug!(released, live = self.len(), "released idle tiles");
        }
        released
    }

    /// No payload and no LRU membership anywhere in the subtree.
    fn is_idle(&self, handle: TileHandle, lru: &LruQueue) -> bool {
        let node = self.node(handle);
        !node.has_payload()
            && !lru.contains(self, handle)
            && node
                .children
                .is_none_or(|children| children.iter().all(|&c| self.is_idle(c, lru)))
    }

    fn release_subtree(&mut self, handle: TileHandle) -> usize {
        let Some(node) = self.slots.get_mut(handle.index()).and_then(Option::take) else {
            return 0;
        };
        self.free.push(handle.0);
        let below: usize = node
            .children
            .map_or(0, |children| children.into_iter().map(|c| self.release_subtree(c)).sum());
        1 + below
    }
}

#[cfg(test)]
mod tests {
    use tilestream_assets::GridImageryProvider;
    use tilestream_tiling::GeographicTilingScheme;

    use super::*;
    use crate::terrain::FlatTerrainProvider;

    fn camera(position: DVec3) -> CameraState {
        CameraState::new(position, DVec3::NEG_Z, DVec3::Y)
    }

    #[test]
    fn children_are_created_once() {
        let scheme = GeographicTilingScheme::new();
        let mut tree = TileTree::new();
        let root = tree.create_root(TileCoord::new(0, 0, 0), &scheme);

        let first = tree.children(root, &scheme);
        let second = tree.children(root, &scheme);
        assert_eq!(first, second);
        assert_eq!(tree.len(), 5);
        for child in first {
            assert_eq!(tree.node(child).parent(), Some(root));
            assert_eq!(tree.node(child).level(), 1);
        }
        assert_eq!(tree.node(first[3]).coord(), TileCoord::new(1, 1, 1));
    }

    #[test]
    fn idle_subtrees_are_released_and_slots_reused() {
        let scheme = GeographicTilingScheme::new();
        let mut tree = TileTree::new();
        let mut lru = LruQueue::new();
        let root = tree.create_root(TileCoord::new(0, 0, 0), &scheme);
        let children = tree.children(root, &scheme);
        let grandchildren = tree.children(children[0], &scheme);
        assert_eq!(tree.len(), 9);
        lru.mark_tile_rendered(&mut tree, root);
        lru.mark_tile_rendered(&mut tree, grandchildren[2]);

        assert_eq!(tree.release_idle(&[children[1]], &lru), 0);
        assert_eq!(tree.len(), 9);

        lru.remove(&mut tree, grandchildren[2]);
        assert_eq!(tree.release_idle(&[grandchildren[2]], &lru), 8);
        assert_eq!(tree.len(), 1);
        assert!(tree.node(root).children().is_none());
        assert!(tree.get(children[0]).is_none());
        assert_eq!(tree.iter().count(), 1);

        let again = tree.children(root, &scheme);
        assert_eq!(tree.len(), 5);
        assert!(again.iter().all(|h| h.index() < 9));
        assert_eq!(tree.node(again[3]).coord(), TileCoord::new(1, 1, 1));
        assert_eq!(tree.node(again[0]).parent(), Some(root));
    }

    #[test]
    fn child_bounds_nest_in_parent() {
        let scheme = GeographicTilingScheme::new();
        let mut tree = TileTree::new();
        let root = tree.create_root(TileCoord::new(1, 0, 0), &scheme);
        let parent = *tree.node(root).native_rectangle();
        for child in tree.children(root, &scheme) {
            let rect = tree.node(child).native_rectangle();
            assert!(rect.west >= parent.west && rect.east <= parent.east);
            assert!(rect.south >= parent.south && rect.north <= parent.north);
        }
    }

    #[test]
    fn priority_is_zero_at_the_camera() {
        let scheme = GeographicTilingScheme::new();
        let mut tree = TileTree::new();
        let root = tree.create_root(TileCoord::new(0, 0, 0), &scheme);
        let node = tree.node_mut(root);
        let center = node.center();
        node.update_distance(center);
        assert_eq!(node.compute_priority(&camera(center)), 0.0);
    }

    #[test]
    fn tiles_ahead_outrank_tiles_to_the_side() {
        let scheme = GeographicTilingScheme::new();
        let mut tree = TileTree::new();
        let west = tree.create_root(TileCoord::new(0, 0, 0), &scheme);
        let east = tree.create_root(TileCoord::new(1, 0, 0), &scheme);
        let eye = tree.node(east).center() + DVec3::new(0.0, 0.0, 1.0e6);
        let cam = camera(eye);

        let mut score = |h: TileHandle| {
            let node = tree.node_mut(h);
            node.update_distance(cam.position);
            node.compute_priority(&cam)
        };
        let ahead = score(east);
        let side = score(west);
        assert!(ahead < side);
        assert!(ahead.abs() < 1e-6);
    }

    #[test]
    fn advance_attaches_payload_and_free_detaches_it() {
        let scheme = GeographicTilingScheme::new();
        let terrain = FlatTerrainProvider::new(&scheme);
        let mut providers = ProviderCollection::new();
        let base = providers.add(Box::new(GridImageryProvider::new("base")));
        let mut cache = AssetCache::new();
        let mut tree = TileTree::new();
        let root = tree.create_root(TileCoord::new(0, 0, 0), &scheme);

        assert!(tree.node(root).needs_loading());
        assert!(!tree.node(root).is_renderable(&cache, &providers));
        tree.node_mut(root).advance(&mut cache, &providers, &terrain);
        assert!(tree.node(root).is_renderable(&cache, &providers));
        assert_eq!(tree.loaded_count(), 1);

        assert_eq!(tree.strip_provider(base, &mut cache), 1);
        assert!(cache.is_empty());
        tree.node_mut(root).free_payload(&mut cache);
        assert!(!tree.node(root).has_payload());
    }
}
