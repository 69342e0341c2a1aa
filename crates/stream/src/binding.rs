//! Per (tile, provider) asset binding and its ancestor-fallback policy.
//!
//! A binding holds the tile's own cached asset and, while that asset is
//! still loading, an optional coarser ancestor to display in its place.
//! When the own asset fails (or decodes empty) the closest loaded ancestor is
//! adopted permanently, trading resolution for coverage.

use tilestream_assets::{AssetCache, AssetKey, AssetProvider, CachedAsset};
use tilestream_common::{ProviderId, TileCoord};

#[derive(Debug)]
pub struct TileAssetBinding {
    provider: ProviderId,
    own: AssetKey,
    current: Option<AssetKey>,
    fallback: Option<AssetKey>,
    changed: bool,
    settled: bool,
}

impl TileAssetBinding {
    /// Acquire the asset for `coord` from `provider`.
    pub fn new(cache: &mut AssetCache, coord: TileCoord, provider: ProviderId) -> Self {
        Self {
            provider,
            own: cache.get(coord, provider),
            current: None,
            fallback: None,
            changed: false,
            settled: false,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// The asset requested for this tile (possibly shared with siblings).
    pub fn own(&self) -> AssetKey {
        self.own
    }

    pub fn current(&self) -> Option<AssetKey> {
        self.current
    }

    pub fn fallback(&self) -> Option<AssetKey> {
        self.fallback
    }

    /// Current or fallback changed since the renderer last acknowledged.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Clear the changed flag. Only the renderer calls this.
    pub fn acknowledge_change(&mut self) {
        self.changed = false;
    }

    /// A current asset was adopted; no further processing needed.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The own asset has a fetch in flight.
    pub fn is_loading(&self, cache: &AssetCache) -> bool {
        cache.is_loading(self.own)
    }

    /// Advance the binding by one pass. Returns true if current or fallback changed.
    ///
    /// `allow_fallback` is false for the base layer's first pass so a tile
    /// does not flash its parent's imagery before its own request had a chance.
    pub fn process(
        &mut self,
        cache: &mut AssetCache,
        provider: &dyn AssetProvider,
        priority: f64,
        allow_fallback: bool,
    ) -> bool {
        if self.settled {
            return false;
        }
        cache.process(self.own, provider, priority);

        let (valid, unusable) = match cache.entry(self.own) {
            Some(entry) => (entry.is_valid(), entry.is_unusable()),
            None => return false,
        };

        if valid {
            self.adopt(cache, self.own);
            return true;
        }

        if unusable {
            return match cache.first_valid_ancestor(self.own) {
                Some(ancestor) => {
                    cache.retain(ancestor);
                    self.adopt(cache, ancestor);
                    true
                }
                None => {
                    let had_fallback = self.fallback.is_some();
                    self.release_fallback(cache);
                    self.changed |= had_fallback;
                    had_fallback
                }
            };
        }

        if !allow_fallback {
            return false;
        }
        let candidate = cache.first_valid_ancestor(self.own);
        if candidate == self.fallback {
            return false;
        }
        self.release_fallback(cache);
        if let Some(ancestor) = candidate {
            cache.retain(ancestor);
        }
        self.fallback = candidate;
        self.changed = true;
        true
    }

    /// Asset to draw this frame: current if valid, else a valid fallback.
    pub fn resolve_display_asset(&self, cache: &AssetCache) -> Option<AssetKey> {
        [self.current, self.fallback]
            .into_iter()
            .flatten()
            .find(|key| cache.is_valid(*key))
    }

    pub fn display_entry<'c>(&self, cache: &'c AssetCache) -> Option<&'c CachedAsset> {
        self.resolve_display_asset(cache)
            .and_then(|key| cache.entry(key))
    }

    /// Drop every cache reference this binding holds.
    pub fn release(mut self, cache: &mut AssetCache) {
        self.release_fallback(cache);
        if let Some(current) = self.current.take() {
            if current != self.own {
                cache.release(current);
            }
        }
        cache.release(self.own);
    }

    fn adopt(&mut self, cache: &mut AssetCache, key: AssetKey) {
        self.current = Some(key);
        self.release_fallback(cache);
        self.settled = true;
        self.changed = true;
    }

    fn release_fallback(&mut self, cache: &mut AssetCache) {
        if let Some(fallback) = self.fallback.take() {
            cache.release(fallback);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tilestream_assets::{AssetState, FetchError, FetchRequest, TileImage};

    use super::*;

    #[derive(Default)]
    struct Manual {
        requests: Mutex<Vec<FetchRequest>>,
    }

    impl Manual {
        fn take(&self, coord: TileCoord) -> FetchRequest {
            let mut requests = self.requests.lock().unwrap();
            let index = requests.iter().position(|r| r.coord() == coord).unwrap();
            requests.remove(index)
        }
    }

    impl AssetProvider for Manual {
        fn name(&self) -> &str {
            "manual"
        }

        fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError> {
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    const P: ProviderId = ProviderId(1);

    fn image() -> TileImage {
        TileImage::solid(4, 4, [255, 255, 255, 255])
    }

    fn load(cache: &mut AssetCache, provider: &Manual, coord: TileCoord) -> AssetKey {
        let key = AssetKey::new(P, coord);
        cache.process(key, provider, 0.0);
        provider.take(coord).succeed(image());
        cache.process(key, provider, 0.0);
        assert_eq!(cache.state(key), Some(AssetState::Loaded));
        key
    }

    #[test]
    fn own_asset_loading_sets_changed_once_and_drops_fallback() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let child = TileCoord::new(1, 1, 1);
        let mut binding = TileAssetBinding::new(&mut cache, child, P);
        let root = load(&mut cache, &provider, TileCoord::new(0, 0, 0));

        assert!(binding.process(&mut cache, &provider, 0.0, true));
        assert_eq!(binding.fallback(), Some(root));
        assert_eq!(cache.entry(root).unwrap().ref_count(), 2);
        binding.acknowledge_change();

        assert!(!binding.process(&mut cache, &provider, 0.0, true));
        assert!(!binding.is_changed());

        provider.take(child).succeed(image());
        let mut transitions = 0;
        for _ in 0..3 {
            binding.process(&mut cache, &provider, 0.0, true);
            if binding.is_changed() {
                transitions += 1;
                binding.acknowledge_change();
            }
        }
        assert_eq!(transitions, 1);
        assert_eq!(binding.current(), Some(binding.own()));
        assert_eq!(binding.fallback(), None);
        assert_eq!(cache.entry(root).unwrap().ref_count(), 1);
        assert_eq!(binding.resolve_display_asset(&cache), Some(binding.own()));
    }

    #[test]
    fn suppressed_fallback_skips_ancestor_search() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let mut binding = TileAssetBinding::new(&mut cache, TileCoord::new(0, 1, 1), P);
        load(&mut cache, &provider, TileCoord::new(0, 0, 0));

        assert!(!binding.process(&mut cache, &provider, 0.0, false));
        assert_eq!(binding.fallback(), None);
        assert!(binding.is_loading(&cache));
        assert!(binding.process(&mut cache, &provider, 0.0, true));
        assert!(binding.fallback().is_some());
    }

    #[test]
    fn failure_adopts_closest_loaded_ancestor() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(2, 2, 2);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);
        let root = load(&mut cache, &provider, TileCoord::new(0, 0, 0));

        binding.process(&mut cache, &provider, 0.0, false);
        provider.take(leaf).fail("timeout");
        assert!(binding.process(&mut cache, &provider, 0.0, true));
        assert!(binding.is_settled());
        assert_eq!(binding.current(), Some(root));
        assert_eq!(binding.resolve_display_asset(&cache), Some(root));
    }

    #[test]
    fn empty_payload_is_treated_as_failure() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(1, 0, 1);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);
        let root = load(&mut cache, &provider, TileCoord::new(0, 0, 0));

        binding.process(&mut cache, &provider, 0.0, true);
        provider.take(leaf).succeed(TileImage::empty());
        binding.process(&mut cache, &provider, 0.0, true);
        assert_eq!(binding.current(), Some(root));
    }

    #[test]
    fn failure_without_loaded_ancestor_displays_nothing() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(3, 1, 2);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);

        binding.process(&mut cache, &provider, 0.0, true);
        provider.take(leaf).fail("500");
        binding.process(&mut cache, &provider, 0.0, true);

        assert_eq!(binding.current(), None);
        assert_eq!(binding.resolve_display_asset(&cache), None);
        assert!(binding.display_entry(&cache).is_none());
        assert!(!binding.is_settled());
    }

    #[test]
    fn failed_binding_recovers_when_an_ancestor_loads_later() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(1, 1, 1);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);
        binding.process(&mut cache, &provider, 0.0, true);
        provider.take(leaf).fail("500");
        binding.process(&mut cache, &provider, 0.0, true);
        assert_eq!(binding.current(), None);

        let root = load(&mut cache, &provider, TileCoord::new(0, 0, 0));
        assert!(binding.process(&mut cache, &provider, 0.0, true));
        assert_eq!(binding.current(), Some(root));
    }

    #[test]
    fn fallback_upgrades_to_a_closer_ancestor() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(2, 2, 2);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);
        let root = load(&mut cache, &provider, TileCoord::new(0, 0, 0));
        binding.process(&mut cache, &provider, 0.0, true);
        assert_eq!(binding.fallback(), Some(root));

        let parent = load(&mut cache, &provider, TileCoord::new(1, 1, 1));
        assert!(binding.process(&mut cache, &provider, 0.0, true));
        assert_eq!(binding.fallback(), Some(parent));
        assert_eq!(binding.resolve_display_asset(&cache), Some(parent));
    }

    #[test]
    fn release_returns_every_reference() {
        let provider = Manual::default();
        let mut cache = AssetCache::new();
        let leaf = TileCoord::new(1, 0, 1);
        let mut binding = TileAssetBinding::new(&mut cache, leaf, P);
        load(&mut cache, &provider, TileCoord::new(0, 0, 0));
        binding.process(&mut cache, &provider, 0.0, true);
        provider.take(leaf).fail("gone");
        binding.process(&mut cache, &provider, 0.0, true);

        binding.release(&mut cache);
        assert!(cache.is_empty());
    }
}
