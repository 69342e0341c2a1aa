use tilestream_common::{BoundingSphere, FrameState, Intersection, ProviderId, Rectangle};

use crate::fetch::{FetchError, FetchRequest};

/// Source of per-tile raster assets.
///
/// Requests are asynchronous: `request_tile_asset` must return promptly and
/// complete the [`FetchRequest`] later, from any thread. Completing inside the
/// call is also allowed.
pub trait AssetProvider: Send + Sync {
    fn name(&self) -> &str;

    fn minimum_level(&self) -> u32 {
        0
    }

    fn maximum_level(&self) -> u32 {
        18
    }

    fn tile_width(&self) -> u32 {
        256
    }

    fn tile_height(&self) -> u32 {
        256
    }

    /// Geographic coverage in degrees.
    fn rectangle(&self) -> Rectangle {
        Rectangle::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Start fetching `request.coord()`.
    ///
    /// Returning [`FetchError::Throttled`] leaves the asset unloaded so the
    /// request is retried on the next poll; any other error fails the asset.
    fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError>;

    /// Whether a tile with these bounds can contribute to the frame.
    fn compute_tile_visibility(&self, sphere: &BoundingSphere, frame: &FrameState) -> bool {
        frame.culling_volume.visibility(sphere) != Intersection::Outside
    }
}

/// A provider registered in a collection, with its per-layer display state.
pub struct ProviderLayer {
    id: ProviderId,
    provider: Box<dyn AssetProvider>,
    visible: bool,
    opacity: f32,
}

impl ProviderLayer {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn provider(&self) -> &dyn AssetProvider {
        self.provider.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

impl std::fmt::Debug for ProviderLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLayer")
            .field("id", &self.id)
            .field("name", &self.provider.name())
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .finish()
    }
}

/// Lifecycle change in a [`ProviderCollection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProviderEvent {
    Added { id: ProviderId, index: usize },
    Removed { id: ProviderId },
    Moved { id: ProviderId, from: usize, to: usize },
    VisibilityChanged { id: ProviderId, visible: bool },
}

/// Ordered set of asset providers. Index 0 is the base (opaque) layer.
///
/// Every mutation appends a [`ProviderEvent`]; consumers drain them once per
/// frame and react synchronously.
#[derive(Debug, Default)]
pub struct ProviderCollection {
    layers: Vec<ProviderLayer>,
    next_id: u32,
    events: Vec<ProviderEvent>,
}

impl ProviderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider on top of the existing layers.
    pub fn add(&mut self, provider: Box<dyn AssetProvider>) -> ProviderId {
        let index = self.layers.len();
        self.insert(provider, index)
    }

    /// Insert a provider at `index` (clamped to the current length).
    pub fn insert(&mut self, provider: Box<dyn AssetProvider>, index: usize) -> ProviderId {
        let id = ProviderId(self.next_id);
        self.next_id += 1;
        let index = index.min(self.layers.len());
        tracing::debug!(%id, name = provider.name(), index, "provider added");
        self.layers.insert(
            index,
            ProviderLayer {
                id,
                provider,
                visible: true,
                opacity: 1.0,
            },
        );
        self.events.push(ProviderEvent::Added { id, index });
        id
    }

    pub fn remove(&mut self, id: ProviderId) -> Option<Box<dyn AssetProvider>> {
        let index = self.index_of(id)?;
        let layer = self.layers.remove(index);
        tracing::debug!(%id, name = layer.provider.name(), "provider removed");
        self.events.push(ProviderEvent::Removed { id });
        Some(layer.provider)
    }

    /// Move a provider to `to` (clamped). Returns false if `id` is unknown.
    pub fn move_to(&mut self, id: ProviderId, to: usize) -> bool {
        let Some(from) = self.index_of(id) else {
            return false;
        };
        let to = to.min(self.layers.len() - 1);
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
            self.events.push(ProviderEvent::Moved { id, from, to });
        }
        true
    }

    pub fn raise(&mut self, id: ProviderId) -> bool {
        match self.index_of(id) {
            Some(index) => self.move_to(id, index + 1),
            None => false,
        }
    }

    pub fn lower(&mut self, id: ProviderId) -> bool {
        match self.index_of(id) {
            Some(index) => self.move_to(id, index.saturating_sub(1)),
            None => false,
        }
    }

    pub fn set_visible(&mut self, id: ProviderId, visible: bool) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) else {
            return false;
        };
        if layer.visible != visible {
            layer.visible = visible;
            self.events
                .push(ProviderEvent::VisibilityChanged { id, visible });
        }
        true
    }

    pub fn set_opacity(&mut self, id: ProviderId, opacity: f32) -> bool {
        match self.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.opacity = opacity.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn index_of(&self, id: ProviderId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// The base layer, if any provider is registered.
    pub fn base(&self) -> Option<&ProviderLayer> {
        self.layers.first()
    }

    /// Layers in draw order, base first.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderLayer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Take the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<ProviderEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[ProviderEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl AssetProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn request_tile_asset(&self, _request: FetchRequest) -> Result<(), FetchError> {
            Err(FetchError::Throttled)
        }
    }

    fn names(collection: &ProviderCollection) -> Vec<&str> {
        collection.iter().map(|l| l.provider().name()).collect()
    }

    #[test]
    fn first_provider_is_base() {
        let mut collection = ProviderCollection::new();
        let base = collection.add(Box::new(Named("base")));
        collection.add(Box::new(Named("overlay")));
        assert_eq!(collection.base().map(|l| l.id()), Some(base));
        assert_eq!(names(&collection), ["base", "overlay"]);
    }

    #[test]
    fn mutations_record_events_in_order() {
        let mut collection = ProviderCollection::new();
        let a = collection.add(Box::new(Named("a")));
        let b = collection.add(Box::new(Named("b")));
        collection.set_visible(b, false);
        collection.set_visible(b, false);
        collection.lower(b);
        collection.remove(a);

        assert_eq!(
            collection.drain_events(),
            vec![
                ProviderEvent::Added { id: a, index: 0 },
                ProviderEvent::Added { id: b, index: 1 },
                ProviderEvent::VisibilityChanged {
                    id: b,
                    visible: false
                },
                ProviderEvent::Moved {
                    id: b,
                    from: 1,
                    to: 0
                },
                ProviderEvent::Removed { id: a },
            ]
        );
        assert!(collection.events().is_empty());
    }

    #[test]
    fn move_clamps_and_ignores_noops() {
        let mut collection = ProviderCollection::new();
        let a = collection.add(Box::new(Named("a")));
        collection.add(Box::new(Named("b")));
        collection.drain_events();

        assert!(collection.move_to(a, 10));
        assert_eq!(names(&collection), ["b", "a"]);
        assert!(collection.raise(a));
        assert_eq!(collection.drain_events().len(), 1);
        assert!(!collection.move_to(ProviderId(99), 0));
    }

    #[test]
    fn opacity_is_clamped() {
        let mut collection = ProviderCollection::new();
        let a = collection.add(Box::new(Named("a")));
        collection.set_opacity(a, 3.0);
        assert_eq!(collection.get(a).map(|l| l.opacity()), Some(1.0));
    }
}
