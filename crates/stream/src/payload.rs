use std::collections::HashMap;

use tilestream_assets::{AssetCache, AssetProvider, ProviderCollection};
use tilestream_common::{ProviderId, Rectangle, TileCoord};

use crate::binding::TileAssetBinding;
use crate::terrain::TerrainProvider;

/// Terrain availability for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainState {
    Start,
    Loading,
    Done,
}

/// Collaborators a payload needs to advance its state machines.
pub struct AdvanceContext<'a> {
    pub cache: &'a mut AssetCache,
    pub providers: &'a ProviderCollection,
    pub terrain: &'a dyn TerrainProvider,
    /// Geographic rectangle of the tile, for provider coverage checks.
    pub rectangle: Rectangle,
    pub priority: f64,
}

/// Per-tile loading state, attached to a node on first visit.
#[derive(Debug)]
pub struct TilePayload {
    terrain: TerrainState,
    bindings: HashMap<ProviderId, TileAssetBinding>,
    first_pass: bool,
    needs_rerender: bool,
}

impl Default for TilePayload {
    fn default() -> Self {
        Self::new()
    }
}

impl TilePayload {
    pub fn new() -> Self {
        Self {
            terrain: TerrainState::Start,
            bindings: HashMap::new(),
            first_pass: true,
            needs_rerender: false,
        }
    }

    pub fn terrain_state(&self) -> TerrainState {
        self.terrain
    }

    /// True until the first call to [`TilePayload::advance`] completes.
    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// Step terrain availability, then every applicable provider binding.
    pub fn advance(&mut self, coord: TileCoord, ctx: &mut AdvanceContext<'_>) {
        self.advance_terrain(coord, ctx.terrain);
        self.advance_assets(coord, ctx);
        self.first_pass = false;
    }

    fn advance_terrain(&mut self, coord: TileCoord, terrain: &dyn TerrainProvider) {
        if self.terrain == TerrainState::Done {
            return;
        }
        let available = terrain.tile_data_available(coord);
        self.terrain = match (self.terrain, available) {
            (_, true) => TerrainState::Done,
            (TerrainState::Start, false) => {
                terrain.load_tile_data_availability(coord);
                TerrainState::Loading
            }
            (state, false) => state,
        };
    }

    fn advance_assets(&mut self, coord: TileCoord, ctx: &mut AdvanceContext<'_>) {
        for (index, layer) in ctx.providers.iter().enumerate() {
            let is_base = index == 0;
            if !is_base && !layer.is_visible() {
                continue;
            }
            let provider = layer.provider();
            let Some(asset_coord) = asset_coord_for(provider, coord, &ctx.rectangle) else {
                continue;
            };
            let binding = self
                .bindings
                .entry(layer.id())
                .or_insert_with(|| TileAssetBinding::new(ctx.cache, asset_coord, layer.id()));
            let allow_fallback = !(is_base && self.first_pass);
            binding.process(ctx.cache, provider, ctx.priority, allow_fallback);
        }

        let stale: Vec<ProviderId> = self
            .bindings
            .keys()
            .filter(|id| ctx.providers.get(**id).is_none())
            .copied()
            .collect();
        for id in stale {
            self.remove_binding(id, ctx.cache);
        }
    }

    /// No binding holds an in-flight fetch.
    pub fn is_eligible_for_unload(&self, cache: &AssetCache) -> bool {
        !self.bindings.values().any(|b| b.is_loading(cache))
    }

    /// Terrain is ready and the base layer has something to show.
    ///
    /// Higher layers never block rendering; a tile the base layer does not
    /// cover is renderable once it has been advanced at least once.
    pub fn is_renderable(&self, cache: &AssetCache, providers: &ProviderCollection) -> bool {
        if self.terrain != TerrainState::Done || self.first_pass {
            return false;
        }
        match providers.base().and_then(|base| self.bindings.get(&base.id())) {
            Some(binding) => binding.resolve_display_asset(cache).is_some(),
            None => true,
        }
    }

    /// Anything left to advance for this tile.
    pub fn needs_loading(&self) -> bool {
        self.first_pass
            || self.terrain != TerrainState::Done
            || self.bindings.values().any(|b| !b.is_settled())
    }

    pub fn binding(&self, provider: ProviderId) -> Option<&TileAssetBinding> {
        self.bindings.get(&provider)
    }

    pub fn binding_mut(&mut self, provider: ProviderId) -> Option<&mut TileAssetBinding> {
        self.bindings.get_mut(&provider)
    }

    pub fn bindings_mut(&mut self) -> impl Iterator<Item = (&ProviderId, &mut TileAssetBinding)> {
        self.bindings.iter_mut()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Drop the binding for `provider`, releasing its cache references.
    pub fn remove_binding(&mut self, provider: ProviderId, cache: &mut AssetCache) -> bool {
        match self.bindings.remove(&provider) {
            Some(binding) => {
                binding.release(cache);
                true
            }
            None => false,
        }
    }

    pub fn mark_needs_rerender(&mut self) {
        self.needs_rerender = true;
    }

    pub fn needs_rerender(&self) -> bool {
        self.needs_rerender
    }

    /// Consume the re-render request, flagging every binding as changed.
    pub fn apply_rerender(&mut self) {
        if std::mem::take(&mut self.needs_rerender) {
            for binding in self.bindings.values_mut() {
                binding.mark_changed();
            }
        }
    }

    /// Release every binding. The payload is unusable afterwards.
    pub fn free(&mut self, cache: &mut AssetCache) {
        for (_, binding) in self.bindings.drain() {
            binding.release(cache);
        }
    }
}

/// Asset to request from `provider` for `coord`, or `None` when the provider
/// does not cover the tile. Tiles finer than the provider's maximum level
/// share the ancestor asset at that level.
fn asset_coord_for(
    provider: &dyn AssetProvider,
    coord: TileCoord,
    rectangle: &Rectangle,
) -> Option<TileCoord> {
    if coord.level < provider.minimum_level() || !provider.rectangle().intersects(rectangle) {
        return None;
    }
    Some(coord.ancestor_at(coord.level.min(provider.maximum_level())))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tilestream_assets::{FetchError, FetchRequest, GridImageryProvider};

    use super::*;

    struct SlowTerrain {
        available: std::sync::atomic::AtomicBool,
        kicks: AtomicUsize,
    }

    impl SlowTerrain {
        fn new() -> Self {
            Self {
                available: false.into(),
                kicks: AtomicUsize::new(0),
            }
        }
    }

    impl TerrainProvider for SlowTerrain {
        fn tile_data_available(&self, _coord: TileCoord) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn load_tile_data_availability(&self, _coord: TileCoord) {
            self.kicks.fetch_add(1, Ordering::SeqCst);
        }

        fn level_maximum_geometric_error(&self, _level: u32) -> f64 {
            1.0
        }
    }

    #[derive(Default)]
    struct Pending {
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl AssetProvider for Pending {
        fn name(&self) -> &str {
            "pending"
        }

        fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError> {
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn whole_world() -> Rectangle {
        Rectangle::new(-180.0, -90.0, 180.0, 90.0)
    }

    fn advance(
        payload: &mut TilePayload,
        coord: TileCoord,
        cache: &mut AssetCache,
        providers: &ProviderCollection,
        terrain: &dyn TerrainProvider,
    ) {
        let mut ctx = AdvanceContext {
            cache,
            providers,
            terrain,
            rectangle: whole_world(),
            priority: 0.0,
        };
        payload.advance(coord, &mut ctx);
    }

    #[test]
    fn terrain_waits_for_availability_without_rekicking() {
        let terrain = SlowTerrain::new();
        let providers = ProviderCollection::new();
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();
        let coord = TileCoord::new(0, 0, 0);

        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert_eq!(payload.terrain_state(), TerrainState::Loading);
        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert_eq!(terrain.kicks.load(Ordering::SeqCst), 1);
        assert!(!payload.is_renderable(&cache, &providers));

        terrain.available.store(true, Ordering::SeqCst);
        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert_eq!(payload.terrain_state(), TerrainState::Done);
        assert!(payload.is_renderable(&cache, &providers));
        assert!(!payload.needs_loading());
    }

    #[test]
    fn base_layer_alone_makes_tile_renderable() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        providers.add(Box::new(GridImageryProvider::new("base")));
        let overlay = providers.add(Box::new(Pending::default()));
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();
        let coord = TileCoord::new(0, 0, 0);

        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert!(payload.is_renderable(&cache, &providers));
        assert!(payload.needs_loading());
        assert!(payload.binding(overlay).unwrap().is_loading(&cache));
        assert!(!payload.is_eligible_for_unload(&cache));
    }

    #[test]
    fn invisible_overlay_is_skipped() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        providers.add(Box::new(GridImageryProvider::new("base")));
        let overlay = providers.add(Box::new(Pending::default()));
        providers.set_visible(overlay, false);
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();

        advance(&mut payload, TileCoord::new(0, 0, 0), &mut cache, &providers, &terrain);
        assert!(payload.binding(overlay).is_none());
        assert!(payload.is_eligible_for_unload(&cache));
    }

    #[test]
    fn provider_levels_limit_bindings() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        let base = providers.add(Box::new(GridImageryProvider::new("base").with_levels(2, 3)));
        let mut cache = AssetCache::new();

        let mut coarse = TilePayload::new();
        advance(&mut coarse, TileCoord::new(0, 0, 1), &mut cache, &providers, &terrain);
        assert!(coarse.binding(base).is_none());
        assert!(coarse.is_renderable(&cache, &providers));

        let mut fine = TilePayload::new();
        advance(&mut fine, TileCoord::new(40, 17, 5), &mut cache, &providers, &terrain);
        let own = fine.binding(base).unwrap().own();
        assert_eq!(own.coord, TileCoord::new(10, 4, 3));
    }

    #[test]
    fn free_releases_all_cache_references() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        providers.add(Box::new(GridImageryProvider::new("base")));
        providers.add(Box::new(Pending::default()));
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();

        advance(&mut payload, TileCoord::new(3, 1, 2), &mut cache, &providers, &terrain);
        assert!(!cache.is_empty());
        payload.free(&mut cache);
        assert!(cache.is_empty());
        assert_eq!(payload.binding_count(), 0);
    }

    #[test]
    fn removed_provider_binding_is_dropped_on_next_advance() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        providers.add(Box::new(GridImageryProvider::new("base")));
        let overlay = providers.add(Box::new(GridImageryProvider::new("overlay")));
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();
        let coord = TileCoord::new(0, 0, 0);

        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert_eq!(payload.binding_count(), 2);
        providers.remove(overlay);
        advance(&mut payload, coord, &mut cache, &providers, &terrain);
        assert_eq!(payload.binding_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rerender_marks_bindings_changed_once() {
        let terrain = crate::terrain::FlatTerrainProvider::with_level_zero_error(1.0);
        let mut providers = ProviderCollection::new();
        let base = providers.add(Box::new(GridImageryProvider::new("base")));
        let mut cache = AssetCache::new();
        let mut payload = TilePayload::new();
        advance(&mut payload, TileCoord::new(0, 0, 0), &mut cache, &providers, &terrain);
        payload.binding_mut(base).unwrap().acknowledge_change();

        payload.mark_needs_rerender();
        payload.apply_rerender();
        assert!(payload.binding(base).unwrap().is_changed());
        assert!(!payload.needs_rerender());
    }
}
