//! Process-wide cache of decoded tile assets.
//!
//! Entries are shared and reference counted. [`AssetCache::get`] creates or
//! finds the entry for a key and counts the caller as a holder; every `get`
//! must be paired with exactly one [`AssetCache::release`]. An entry holds a
//! counted reference to its parent-level entry (same provider) so ancestor
//! fallback can walk up the chain; dropping the last holder cascades upward.
//!
//! All access happens on the frame thread. Fetch completions only ever reach
//! an entry through its pending channel, polled in [`AssetCache::process`].

use std::collections::HashMap;

use tilestream_common::{ProviderId, TileCoord};

use crate::fetch::{FetchError, FetchOutcome, PendingFetch, fetch_channel};
use crate::image::TileImage;
use crate::provider::AssetProvider;

/// Cache key: one asset per provider and tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub provider: ProviderId,
    pub coord: TileCoord,
}

impl AssetKey {
    pub fn new(provider: ProviderId, coord: TileCoord) -> Self {
        Self { provider, coord }
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.coord, self.provider)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// One cached asset.
#[derive(Debug)]
pub struct CachedAsset {
    instance: u64,
    key: AssetKey,
    state: AssetState,
    image: Option<TileImage>,
    error: Option<FetchError>,
    cancelled: bool,
    ref_count: u32,
    parent: Option<AssetKey>,
    pending: Option<PendingFetch>,
}

impl CachedAsset {
    /// Serial number of this entry; a key re-created after eviction gets a new one.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn key(&self) -> AssetKey {
        self.key
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    pub fn image(&self) -> Option<&TileImage> {
        self.image.as_ref()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Loaded without a payload because the fetch was aborted.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn parent(&self) -> Option<AssetKey> {
        self.parent
    }

    /// Priority of the in-flight request, if any.
    pub fn request_priority(&self) -> Option<f64> {
        self.pending.as_ref().map(|p| p.handle().priority())
    }

    /// Loaded with a non-empty payload.
    pub fn is_valid(&self) -> bool {
        self.state == AssetState::Loaded && self.image.as_ref().is_some_and(|i| !i.is_empty())
    }

    /// Resolved without anything displayable: fetch failed, or decoded empty.
    pub fn is_unusable(&self) -> bool {
        match self.state {
            AssetState::Failed => true,
            AssetState::Loaded => !self.cancelled && !self.is_valid(),
            _ => false,
        }
    }

    fn issue(&mut self, provider: &dyn AssetProvider, priority: f64) {
        let (request, pending) = fetch_channel(self.key.coord, priority);
        self.cancelled = false;
        match provider.request_tile_asset(request) {
            Ok(()) => {
                self.state = AssetState::Loading;
                self.pending = Some(pending);
            }
            Err(FetchError::Throttled) => {
                tracing::trace!(key = %self.key, "request throttled");
            }
            Err(error) => self.fail(error),
        }
    }

    fn poll(&mut self, priority: f64) {
        let Some(pending) = self.pending.as_ref() else {
            return;
        };
        let outcome = match pending.poll() {
            Some(outcome) => outcome,
            None => {
                pending.handle().set_priority(priority);
                return;
            }
        };
        self.pending = None;
        match outcome {
            Ok(FetchOutcome::Loaded(image)) => {
                self.state = AssetState::Loaded;
                if image.is_empty() {
                    tracing::debug!(key = %self.key, "decoded asset is empty");
                    self.error = Some(FetchError::EmptyPayload {
                        coord: self.key.coord,
                    });
                }
                self.image = Some(image);
            }
            Ok(FetchOutcome::Failed(reason)) => self.fail(FetchError::Failed(reason)),
            Ok(FetchOutcome::Aborted) => self.resolve_aborted(),
            Err(error) => self.fail(error),
        }
    }

    fn fail(&mut self, error: FetchError) {
        tracing::debug!(key = %self.key, %error, "asset fetch failed");
        self.state = AssetState::Failed;
        self.image = None;
        self.error = Some(error);
    }

    fn resolve_aborted(&mut self) {
        self.state = AssetState::Loaded;
        self.image = None;
        self.cancelled = true;
    }

    /// Cancel any in-flight request and return to `Unloaded`.
    fn reset(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle().cancel();
        }
        self.image = None;
        self.error = None;
        self.cancelled = false;
        self.state = AssetState::Unloaded;
    }
}

/// Reference-counted asset cache keyed by (provider, x, y, level).
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<AssetKey, CachedAsset>,
    next_instance: u64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the entry for `(provider, coord)` and count the caller as a holder.
    pub fn get(&mut self, coord: TileCoord, provider: ProviderId) -> AssetKey {
        let key = AssetKey::new(provider, coord);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.ref_count += 1;
            return key;
        }

        let parent = coord.parent().map(|p| self.get(p, provider));
        let instance = self.next_instance;
        self.next_instance += 1;
        let previous = self.entries.insert(
            key,
            CachedAsset {
                instance,
                key,
                state: AssetState::Unloaded,
                image: None,
                error: None,
                cancelled: false,
                ref_count: 1,
                parent,
                pending: None,
            },
        );
        debug_assert!(previous.is_none(), "asset key collision for {key}");
        key
    }

    /// Count another holder of an existing entry. Returns false if absent.
    pub fn retain(&mut self, key: AssetKey) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one holder of `key`.
    ///
    /// The entry survives while other holders remain. The last release
    /// evicts it, cancels its in-flight request and releases its parent,
    /// which may cascade further up the chain. Releasing an absent key is a
    /// no-op.
    pub fn release(&mut self, key: AssetKey) {
        let mut next = Some(key);
        while let Some(key) = next.take() {
            let Some(entry) = self.entries.get_mut(&key) else {
                return;
            };
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count > 0 {
                return;
            }
            if let Some(mut evicted) = self.remove(key) {
                next = evicted.parent.take();
                evicted.reset();
            }
        }
    }

    /// Erase an entry unconditionally. Only valid once its count reached zero.
    pub fn remove(&mut self, key: AssetKey) -> Option<CachedAsset> {
        let removed = self.entries.remove(&key);
        if let Some(entry) = &removed {
            debug_assert_eq!(entry.ref_count, 0, "removing a held asset {key}");
        }
        removed
    }

    /// Advance the fetch state machine of `key` by one step.
    ///
    /// Issues the request on first process, polls for completion afterwards
    /// and pushes the latest priority into the in-flight request. An asset
    /// that was aborted is requested again.
    pub fn process(&mut self, key: AssetKey, provider: &dyn AssetProvider, priority: f64) {
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        if entry.state == AssetState::Loaded && entry.cancelled {
            entry.reset();
        }
        if entry.state == AssetState::Unloaded {
            entry.issue(provider, priority);
        }
        if entry.state == AssetState::Loading {
            entry.poll(priority);
        }
    }

    /// Abort the in-flight request of `key`, resolving it as loaded with no payload.
    pub fn abort(&mut self, key: AssetKey) {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.state == AssetState::Loading {
                if let Some(pending) = entry.pending.take() {
                    pending.handle().cancel();
                }
                entry.resolve_aborted();
            }
        }
    }

    pub fn entry(&self, key: AssetKey) -> Option<&CachedAsset> {
        self.entries.get(&key)
    }

    pub fn state(&self, key: AssetKey) -> Option<AssetState> {
        self.entries.get(&key).map(|e| e.state)
    }

    pub fn is_valid(&self, key: AssetKey) -> bool {
        self.entries.get(&key).is_some_and(|e| e.is_valid())
    }

    pub fn is_loading(&self, key: AssetKey) -> bool {
        self.state(key) == Some(AssetState::Loading)
    }

    pub fn parent(&self, key: AssetKey) -> Option<AssetKey> {
        self.entries.get(&key).and_then(|e| e.parent)
    }

    /// Closest strict ancestor of `key` that is valid.
    pub fn first_valid_ancestor(&self, key: AssetKey) -> Option<AssetKey> {
        let mut cursor = self.parent(key);
        while let Some(ancestor) = cursor {
            if self.is_valid(ancestor) {
                return Some(ancestor);
            }
            cursor = self.parent(ancestor);
        }
        None
    }

    pub fn contains(&self, key: AssetKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedAsset> {
        self.entries.values()
    }

    /// Number of entries in each state, for diagnostics.
    pub fn state_counts(&self) -> HashMap<AssetState, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.state).or_insert(0) += 1;
        }
        counts
    }
}
