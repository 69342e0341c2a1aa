use tilestream_assets::{AssetCache, AssetKey, CachedAsset};
use tilestream_common::{ProviderId, TileCoord};

use crate::binding::TileAssetBinding;

/// Consumer of the selected tile set. Owns everything drawable.
///
/// `render` is called once per selected tile per frame with the layers in
/// provider order, base first. Acknowledging a layer clears its changed flag;
/// an unacknowledged change is reported again on the next call.
pub trait TileRenderer {
    fn render(&mut self, tile: TileCoord, layers: &mut [LayerDraw<'_>]);

    /// Stop drawing `tile`: one provider's layer, or every layer when `None`.
    fn unrender(&mut self, tile: TileCoord, provider: Option<ProviderId>);
}

/// One provider's contribution to a tile in the current frame.
pub struct LayerDraw<'a> {
    pub(crate) provider: ProviderId,
    pub(crate) opacity: f32,
    pub(crate) binding: &'a mut TileAssetBinding,
    pub(crate) cache: &'a AssetCache,
}

impl LayerDraw<'_> {
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_changed(&self) -> bool {
        self.binding.is_changed()
    }

    pub fn acknowledge(&mut self) {
        self.binding.acknowledge_change();
    }

    /// Asset to draw, or `None` when the slot must stay empty this frame.
    pub fn display(&self) -> Option<&CachedAsset> {
        self.binding.display_entry(self.cache)
    }

    pub fn current(&self) -> Option<&CachedAsset> {
        self.binding.current().and_then(|key| self.cache.entry(key))
    }

    pub fn fallback(&self) -> Option<&CachedAsset> {
        self.binding.fallback().and_then(|key| self.cache.entry(key))
    }

    /// The displayed asset is a coarser stand-in for the tile's own.
    pub fn is_fallback(&self) -> bool {
        self.display_key()
            .is_some_and(|key| key != self.binding.own())
    }

    fn display_key(&self) -> Option<AssetKey> {
        self.binding.resolve_display_asset(self.cache)
    }
}
