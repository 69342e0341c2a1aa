use tilestream_assets::AssetCache;

use crate::tree::{TileHandle, TileTree};

/// Least-recently-used ordering of visited tiles.
///
/// The list is threaded through the nodes' `lru_prev`/`lru_next` links: head
/// is the most recently used tile. `last_before_frame` remembers the head at
/// the start of the frame, so everything between the head and that node was
/// touched this frame and is never trimmed.
#[derive(Debug, Default)]
pub struct LruQueue {
    head: Option<TileHandle>,
    tail: Option<TileHandle>,
    count: usize,
    last_before_frame: Option<TileHandle>,
}

impl LruQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<TileHandle> {
        self.head
    }

    pub fn tail(&self) -> Option<TileHandle> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Most recent tile not yet touched this frame.
    pub fn frame_boundary(&self) -> Option<TileHandle> {
        self.last_before_frame
    }

    pub fn mark_start_of_render_frame(&mut self) {
        self.last_before_frame = self.head;
    }

    /// Move `handle` to the head, linking it if it was not queued.
    pub fn mark_tile_rendered(&mut self, tree: &mut TileTree, handle: TileHandle) {
        let Some(head) = self.head else {
            let node = tree.node_mut(handle);
            node.lru_prev = None;
            node.lru_next = None;
            self.head = Some(handle);
            self.tail = Some(handle);
            self.count = 1;
            return;
        };

        if head == handle {
            if self.last_before_frame == Some(handle) {
                self.last_before_frame = tree.node(handle).lru_next;
            }
            return;
        }

        if tree.node(handle).is_in_lru() {
            self.remove(tree, handle);
        }
        self.count += 1;

        let node = tree.node_mut(handle);
        node.lru_prev = None;
        node.lru_next = Some(head);
        tree.node_mut(head).lru_prev = Some(handle);
        self.head = Some(handle);
    }

    /// Unlink `handle`. Unqueued handles are ignored.
    pub fn remove(&mut self, tree: &mut TileTree, handle: TileHandle) {
        if !self.contains(tree, handle) {
            return;
        }
        let (prev, next) = {
            let node = tree.node(handle);
            (node.lru_prev, node.lru_next)
        };

        if self.last_before_frame == Some(handle) {
            self.last_before_frame = next;
        }
        match prev {
            Some(prev) => tree.node_mut(prev).lru_next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => tree.node_mut(next).lru_prev = prev,
            None => self.tail = prev,
        }

        let node = tree.node_mut(handle);
        node.lru_prev = None;
        node.lru_next = None;
        self.count -= 1;
    }

    pub fn contains(&self, tree: &TileTree, handle: TileHandle) -> bool {
        self.head == Some(handle) || tree.node(handle).is_in_lru()
    }

    /// Evict least-recently-used tiles until at most `max_tiles` remain.
    ///
    /// Walks from the tail and stops at the first tile still loading, or
    /// after the frame boundary. Tiles touched this frame stay even when the
    /// queue remains over capacity. Evicted tiles lose their payload.
    pub fn trim_tiles(
        &mut self,
        tree: &mut TileTree,
        cache: &mut AssetCache,
        max_tiles: usize,
    ) -> Vec<TileHandle> {
        let mut evicted = Vec::new();
        let mut candidate = self.tail;

        while self.count > max_tiles {
            let (Some(handle), Some(boundary)) = (candidate, self.last_before_frame) else {
                break;
            };
            if !tree.node(handle).is_eligible_for_unload(cache) {
                break;
            }
            candidate = tree.node(handle).lru_prev;
            tree.node_mut(handle).free_payload(cache);
            self.remove(tree, handle);
            evicted.push(handle);
            if handle == boundary {
                break;
            }
        }

        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                remaining = self.count,
                "trimmed tile cache"
            );
        }
        evicted
    }

    /// Handles from head to tail.
    pub fn iter(&self, tree: &TileTree) -> Vec<TileHandle> {
        let mut out = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            out.push(handle);
            cursor = tree.node(handle).lru_next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tilestream_assets::{
        AssetProvider, FetchError, FetchRequest, GridImageryProvider, ProviderCollection,
    };
    use tilestream_common::{Rectangle, TileCoord};
    use tilestream_tiling::GeographicTilingScheme;

    use super::*;
    use crate::terrain::FlatTerrainProvider;

    fn tree_with(count: u32) -> (TileTree, Vec<TileHandle>) {
        let world = Rectangle::new(-180.0, -90.0, 180.0, 90.0);
        let scheme = GeographicTilingScheme::with_layout(world, count, 1);
        let mut tree = TileTree::new();
        let handles = (0..count)
            .map(|x| tree.create_root(TileCoord::new(x, 0, 0), &scheme))
            .collect();
        (tree, handles)
    }

    #[test]
    fn marked_tile_becomes_head() {
        let (mut tree, h) = tree_with(4);
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
            assert_eq!(lru.head(), Some(handle));
        }
        lru.mark_tile_rendered(&mut tree, h[1]);
        assert_eq!(lru.head(), Some(h[1]));
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.iter(&tree), vec![h[1], h[3], h[2], h[0]]);
        assert_eq!(lru.tail(), Some(h[0]));

        lru.mark_tile_rendered(&mut tree, h[0]);
        assert_eq!(lru.tail(), Some(h[2]));
        assert_eq!(lru.len(), 4);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let (mut tree, h) = tree_with(3);
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }
        lru.remove(&mut tree, h[1]);
        assert_eq!(lru.iter(&tree), vec![h[2], h[0]]);
        lru.remove(&mut tree, h[1]);
        assert_eq!(lru.len(), 2);
        lru.remove(&mut tree, h[2]);
        lru.remove(&mut tree, h[0]);
        assert!(lru.is_empty());
        assert_eq!(lru.head(), None);
        assert_eq!(lru.tail(), None);
    }

    #[test]
    fn trim_never_evicts_current_frame_tiles() {
        let (mut tree, h) = tree_with(6);
        let mut cache = AssetCache::new();
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }

        lru.mark_start_of_render_frame();
        lru.mark_tile_rendered(&mut tree, h[0]);
        lru.mark_tile_rendered(&mut tree, h[1]);
        lru.mark_tile_rendered(&mut tree, h[5]);

        let evicted = lru.trim_tiles(&mut tree, &mut cache, 0);
        assert_eq!(evicted, vec![h[2], h[3], h[4]]);
        assert_eq!(lru.iter(&tree), vec![h[5], h[1], h[0]]);
        assert_eq!(lru.frame_boundary(), None);
    }

    #[test]
    fn re_marking_the_head_moves_the_frame_boundary() {
        let (mut tree, h) = tree_with(3);
        let mut cache = AssetCache::new();
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }
        lru.mark_start_of_render_frame();
        assert_eq!(lru.frame_boundary(), Some(h[2]));

        lru.mark_tile_rendered(&mut tree, h[2]);
        assert_eq!(lru.head(), Some(h[2]));
        assert_eq!(lru.frame_boundary(), Some(h[1]));
        assert_eq!(lru.len(), 3);

        let evicted = lru.trim_tiles(&mut tree, &mut cache, 0);
        assert_eq!(evicted, vec![h[0], h[1]]);
        assert_eq!(lru.iter(&tree), vec![h[2]]);
    }

    #[test]
    fn trim_respects_capacity() {
        let (mut tree, h) = tree_with(5);
        let mut cache = AssetCache::new();
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }
        lru.mark_start_of_render_frame();

        let evicted = lru.trim_tiles(&mut tree, &mut cache, 3);
        assert_eq!(evicted, vec![h[0], h[1]]);
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn nothing_is_trimmed_before_the_first_frame_mark() {
        let (mut tree, h) = tree_with(3);
        let mut cache = AssetCache::new();
        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }
        assert!(lru.trim_tiles(&mut tree, &mut cache, 0).is_empty());
    }

    #[derive(Default)]
    struct Hanging {
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl AssetProvider for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError> {
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[test]
    fn trim_stops_at_a_loading_tile_and_frees_payloads() {
        let (mut tree, h) = tree_with(3);
        let terrain = FlatTerrainProvider::with_level_zero_error(1.0);
        let mut loaded = ProviderCollection::new();
        loaded.add(Box::new(GridImageryProvider::new("grid")));
        let mut loading = ProviderCollection::new();
        loading.add(Box::new(Hanging::default()));
        let mut cache = AssetCache::new();

        tree.node_mut(h[0]).advance(&mut cache, &loaded, &terrain);
        tree.node_mut(h[1]).advance(&mut cache, &loading, &terrain);
        tree.node_mut(h[2]).advance(&mut cache, &loaded, &terrain);
        assert_eq!(cache.len(), 3);

        let mut lru = LruQueue::new();
        for &handle in &h {
            lru.mark_tile_rendered(&mut tree, handle);
        }
        lru.mark_start_of_render_frame();

        let evicted = lru.trim_tiles(&mut tree, &mut cache, 0);
        assert_eq!(evicted, vec![h[0]]);
        assert!(!tree.node(h[0]).has_payload());
        assert!(tree.node(h[2]).has_payload());
        assert_eq!(cache.len(), 2);
    }
}
