use std::time::{Duration, Instant};

use tilestream_assets::{AssetCache, ProviderCollection, ProviderEvent};
use tilestream_common::{FrameState, Intersection, ProviderId, TileCoord};
use tilestream_tiling::TilingScheme;

use crate::config::SchedulerConfig;
use crate::lru::LruQueue;
use crate::queue::Queue;
use crate::render_queues::RenderQueueManager;
use crate::render_target::{LayerDraw, TileRenderer};
use crate::terrain::TerrainProvider;
use crate::tree::{TileHandle, TileTree};

/// Per-frame scheduler statistics for instrumentation.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub frame_number: u64,
    pub traversed: usize,
    pub selected: usize,
    pub queued_high: usize,
    pub queued_medium: usize,
    pub advanced: usize,
    pub evicted: usize,
    /// Tree nodes freed after eviction left their subtrees idle.
    pub released: usize,
    pub unrendered: usize,
    pub lru_count: usize,
    pub cache_entries: usize,
    pub tiles: usize,
    pub elapsed: Duration,
}

/// Per-frame driver: LOD selection, download scheduling, cache trimming and
/// render-set reconciliation over one quadtree.
pub struct TileScheduler {
    config: SchedulerConfig,
    tiling: Box<dyn TilingScheme>,
    terrain: Box<dyn TerrainProvider>,
    providers: ProviderCollection,
    cache: AssetCache,
    tree: TileTree,
    lru: LruQueue,
    roots: Vec<TileHandle>,
    traversal: Queue<TileHandle>,
    load_high: Queue<TileHandle>,
    load_medium: Queue<TileHandle>,
    render_current: Queue<TileHandle>,
    render_previous: Queue<TileHandle>,
    render_queues: RenderQueueManager,
    stats: FrameStats,
}

impl TileScheduler {
    /// `config.maximum_level` is capped to the deepest level `tiling` can address.
    pub fn new(
        mut config: SchedulerConfig,
        tiling: Box<dyn TilingScheme>,
        terrain: Box<dyn TerrainProvider>,
        providers: ProviderCollection,
    ) -> Self {
        let deepest = tiling.maximum_level();
        if config.maximum_level > deepest {
            tracing::warn!(
                requested = config.maximum_level,
                deepest,
                "maximum_level capped to the tiling scheme's deepest level"
            );
            config.maximum_level = deepest;
            config.minimum_level = config.minimum_level.min(deepest);
        }
        Self {
            config,
            tiling,
            terrain,
            providers,
            cache: AssetCache::new(),
            tree: TileTree::new(),
            lru: LruQueue::new(),
            roots: Vec::new(),
            traversal: Queue::new(),
            load_high: Queue::new(),
            load_medium: Queue::new(),
            render_current: Queue::new(),
            render_previous: Queue::new(),
            render_queues: RenderQueueManager::new(),
            stats: FrameStats::default(),
        }
    }

    /// Run one frame.
    ///
    /// Download work stops at `time_budget`, except that at least one queued
    /// tile is always advanced. Tiles left in the download queues are dropped
    /// and picked up again by a later traversal.
    pub fn render(
        &mut self,
        time_budget: Duration,
        frame: &FrameState,
        renderer: &mut dyn TileRenderer,
    ) -> &FrameStats {
        let _span = tracing::info_span!("tile_render_frame", frame = frame.frame_number).entered();
        let started = Instant::now();
        self.stats = FrameStats {
            frame_number: frame.frame_number,
            ..FrameStats::default()
        };

        self.dispatch_provider_events(renderer);
        self.lru.mark_start_of_render_frame();
        self.seed_roots(frame);
        self.select_tiles(frame);
        let evicted =
            self.lru
                .trim_tiles(&mut self.tree, &mut self.cache, self.config.tile_cache_size);
        self.stats.evicted = evicted.len();
        self.process_load_queues(time_budget, frame);
        self.reconcile_render_set(renderer);
        self.stats.released = self.tree.release_idle(&evicted, &self.lru);

        self.stats.lru_count = self.lru.len();
        self.stats.cache_entries = self.cache.len();
        self.stats.tiles = self.tree.len();
        self.stats.elapsed = started.elapsed();

        tracing::trace!(
            traversed = self.stats.traversed,
            selected = self.stats.selected,
            high = self.stats.queued_high,
            medium = self.stats.queued_medium,
            advanced = self.stats.advanced,
            evicted = self.stats.evicted,
            released = self.stats.released,
            "tile frame complete"
        );
        &self.stats
    }

    fn dispatch_provider_events(&mut self, renderer: &mut dyn TileRenderer) {
        for event in self.providers.drain_events() {
            match event {
                ProviderEvent::Added { id, .. } => self.render_queues.provider_added(id),
                ProviderEvent::Removed { id } => {
                    self.render_queues.provider_removed(id, &self.tree, renderer);
                    let stripped = self.tree.strip_provider(id, &mut self.cache);
                    tracing::debug!(%id, stripped, "provider bindings released");
                }
                ProviderEvent::Moved { id, .. } => {
                    self.render_queues.provider_moved(id, &mut self.tree);
                }
                ProviderEvent::VisibilityChanged { id, visible } => {
                    self.render_queues
                        .visibility_changed(id, visible, &mut self.tree, renderer);
                }
            }
        }
    }

    /// Create the roots on the first frame. Afterwards a root that still needs
    /// loading goes back into the high tier, since no parent traversal queues it.
    fn seed_roots(&mut self, frame: &FrameState) {
        if self.roots.is_empty() {
            let tiling = self.tiling.as_ref();
            for y in 0..tiling.number_of_y_tiles_at_level(0) {
                for x in 0..tiling.number_of_x_tiles_at_level(0) {
                    let root = self.tree.create_root(TileCoord::new(x, y, 0), tiling);
                    self.roots.push(root);
                    self.load_high.enqueue(root);
                    self.lru.mark_tile_rendered(&mut self.tree, root);
                }
            }
            tracing::debug!(roots = self.roots.len(), "created root tiles");
            return;
        }

        for index in 0..self.roots.len() {
            let root = self.roots[index];
            self.lru.mark_tile_rendered(&mut self.tree, root);
            if self.tree.node(root).needs_loading() {
                self.load_high.enqueue(root);
            }
            if self.tree.node(root).is_renderable(&self.cache, &self.providers)
                && self.is_visible(root, frame)
            {
                self.traversal.enqueue(root);
            }
        }
    }

    fn select_tiles(&mut self, frame: &FrameState) {
        while let Some(handle) = self.traversal.dequeue() {
            self.stats.traversed += 1;
            self.visit(handle, frame);

            let level = self.tree.node(handle).level();
            let sufficient = self.meets_screen_space_error(handle, frame);
            if level >= self.config.maximum_level
                || (sufficient && level >= self.config.minimum_level)
            {
                self.select(handle);
                continue;
            }

            let children = self.tree.children(handle, self.tiling.as_ref());
            let mut all_renderable = true;
            for child in children {
                self.lru.mark_tile_rendered(&mut self.tree, child);
                if self.tree.node(child).needs_loading() {
                    self.tree
                        .node_mut(child)
                        .update_distance(frame.camera.position);
                    if self.meets_screen_space_error(child, frame) {
                        self.load_high.enqueue(child);
                    } else {
                        self.load_medium.enqueue(child);
                    }
                }
                all_renderable &= self
                    .tree
                    .node(child)
                    .is_renderable(&self.cache, &self.providers);
            }

            if all_renderable {
                for child in children {
                    if self.is_visible(child, frame) {
                        self.traversal.enqueue(child);
                    }
                }
            } else {
                self.select(handle);
            }
        }
    }

    fn visit(&mut self, handle: TileHandle, frame: &FrameState) {
        let node = self.tree.node_mut(handle);
        if frame.camera_changed || node.distance().is_none() {
            node.update_distance(frame.camera.position);
        }
        node.advance(&mut self.cache, &self.providers, self.terrain.as_ref());
    }

    fn select(&mut self, handle: TileHandle) {
        if self.render_current.enqueue(handle) {
            self.stats.selected += 1;
        }
        self.lru.mark_tile_rendered(&mut self.tree, handle);
    }

    /// Projected error of `handle` at its last computed distance.
    pub fn screen_space_error(&self, handle: TileHandle, frame: &FrameState) -> f64 {
        let node = self.tree.node(handle);
        let error = self.terrain.level_maximum_geometric_error(node.level());
        let distance = node
            .distance()
            .unwrap_or_else(|| node.aabb().distance_to(frame.camera.position));
        frame.screen_space_error(error, distance)
    }

    fn meets_screen_space_error(&self, handle: TileHandle, frame: &FrameState) -> bool {
        self.screen_space_error(handle, frame) <= self.config.maximum_screen_space_error
    }

    /// Visibility as judged by the base provider, or the frustum when there is none.
    pub fn is_visible(&self, handle: TileHandle, frame: &FrameState) -> bool {
        let sphere = self.tree.node(handle).sphere();
        match self.providers.base() {
            Some(base) => base.provider().compute_tile_visibility(sphere, frame),
            None => frame.culling_volume.visibility(sphere) != Intersection::Outside,
        }
    }

    fn process_load_queues(&mut self, time_budget: Duration, frame: &FrameState) {
        if self.load_high.is_empty() && self.load_medium.is_empty() {
            return;
        }
        let deadline = Instant::now().checked_add(time_budget);
        let mut high = std::mem::take(&mut self.load_high);
        let mut medium = std::mem::take(&mut self.load_medium);
        self.stats.queued_high = high.len();
        self.stats.queued_medium = medium.len();

        self.prioritize(&mut high, frame);
        self.prioritize(&mut medium, frame);

        let advanced_high = self.advance_tier(&high, deadline, false);
        let advanced_medium = self.advance_tier(&medium, deadline, advanced_high > 0);
        self.stats.advanced = advanced_high + advanced_medium;
    }

    fn prioritize(&mut self, queue: &mut Queue<TileHandle>, frame: &FrameState) {
        for &handle in queue.iter() {
            let node = self.tree.node_mut(handle);
            node.ensure_payload();
            if node.distance().is_none() {
                node.update_distance(frame.camera.position);
            }
            node.compute_priority(&frame.camera);
        }
        let tree = &self.tree;
        queue.sort_by(|a, b| tree.node(*a).priority().total_cmp(&tree.node(*b).priority()));
    }

    fn advance_tier(
        &mut self,
        queue: &Queue<TileHandle>,
        deadline: Option<Instant>,
        mut did_work: bool,
    ) -> usize {
        let mut advanced = 0;
        for &handle in queue.iter() {
            if did_work && deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            self.tree
                .node_mut(handle)
                .advance(&mut self.cache, &self.providers, self.terrain.as_ref());
            advanced += 1;
            did_work = true;
        }
        advanced
    }

    fn reconcile_render_set(&mut self, renderer: &mut dyn TileRenderer) {
        for handle in self.render_previous.difference(&self.render_current) {
            let node = self.tree.node_mut(handle);
            renderer.unrender(node.coord(), None);
            if let Some(payload) = node.payload_mut() {
                payload.mark_needs_rerender();
            }
            self.render_queues.forget(handle);
            self.stats.unrendered += 1;
        }

        let current = std::mem::take(&mut self.render_current);
        for &handle in current.iter() {
            self.render_tile(handle, renderer);
        }
        self.render_previous = current;
    }

    fn render_tile(&mut self, handle: TileHandle, renderer: &mut dyn TileRenderer) {
        let providers = &self.providers;
        let cache = &self.cache;
        let node = self.tree.node_mut(handle);
        let coord = node.coord();
        let Some(payload) = node.payload_mut() else {
            return;
        };
        payload.apply_rerender();

        let mut ordered: Vec<(usize, LayerDraw<'_>)> = payload
            .bindings_mut()
            .filter_map(|(&id, binding)| {
                let layer = providers.get(id)?;
                if !layer.is_visible() {
                    return None;
                }
                let index = providers.index_of(id)?;
                let draw = LayerDraw {
                    provider: id,
                    opacity: layer.opacity(),
                    binding,
                    cache,
                };
                Some((index, draw))
            })
            .collect();
        ordered.sort_by_key(|(index, _)| *index);

        let mut layers: Vec<LayerDraw<'_>> = ordered.into_iter().map(|(_, draw)| draw).collect();
        let drawn: Vec<ProviderId> = layers.iter().map(LayerDraw::provider).collect();
        renderer.render(coord, &mut layers);
        drop(layers);

        for id in drawn {
            self.render_queues.record(id, handle);
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn tiling(&self) -> &dyn TilingScheme {
        self.tiling.as_ref()
    }

    pub fn providers(&self) -> &ProviderCollection {
        &self.providers
    }

    /// Mutations are picked up at the start of the next frame.
    pub fn providers_mut(&mut self) -> &mut ProviderCollection {
        &mut self.providers
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn tree(&self) -> &TileTree {
        &self.tree
    }

    pub fn lru(&self) -> &LruQueue {
        &self.lru
    }

    pub fn roots(&self) -> &[TileHandle] {
        &self.roots
    }

    /// Tiles rendered by the last frame, in selection order.
    pub fn selected(&self) -> &Queue<TileHandle> {
        &self.render_previous
    }

    pub fn selected_coords(&self) -> Vec<TileCoord> {
        self.render_previous
            .iter()
            .map(|h| self.tree.node(*h).coord())
            .collect()
    }

    pub fn render_queues(&self) -> &RenderQueueManager {
        &self.render_queues
    }

    /// Statistics from the last frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}
