use std::collections::BTreeMap;

use tilestream_common::{ProviderId, TileCoord};
use tilestream_stream::{LayerDraw, TileRenderer};

/// What a renderer showed for one provider layer of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub provider: ProviderId,
    /// Coordinate of the displayed asset, `None` when the slot is empty.
    pub shown: Option<TileCoord>,
    pub fallback: bool,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Rendered { tile: TileCoord, layers: Vec<LayerRecord> },
    Unrendered { tile: TileCoord, provider: Option<ProviderId> },
}

/// Keeps the currently drawn state in memory, plus an event log.
///
/// Layers are only rebuilt when the scheduler reports a change, the way a
/// backend would rebuild a material.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    drawn: BTreeMap<TileCoord, Vec<LayerRecord>>,
    events: Vec<RenderEvent>,
    rebuilds: usize,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles currently on screen with their layers.
    pub fn drawn(&self) -> &BTreeMap<TileCoord, Vec<LayerRecord>> {
        &self.drawn
    }

    pub fn is_drawn(&self, tile: TileCoord) -> bool {
        self.drawn.contains_key(&tile)
    }

    pub fn layers(&self, tile: TileCoord) -> Option<&[LayerRecord]> {
        self.drawn.get(&tile).map(Vec::as_slice)
    }

    /// Layers rebuilt because their binding reported a change.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn events(&self) -> &[RenderEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.events)
    }
}

impl TileRenderer for RecordingRenderer {
    fn render(&mut self, tile: TileCoord, layers: &mut [LayerDraw<'_>]) {
        let existing = self.drawn.remove(&tile).unwrap_or_default();
        let mut records = Vec::with_capacity(layers.len());
        for layer in layers.iter_mut() {
            let previous = existing.iter().find(|r| r.provider == layer.provider());
            let record = match previous {
                Some(record) if !layer.is_changed() => LayerRecord {
                    opacity: layer.opacity(),
                    ..record.clone()
                },
                _ => {
                    self.rebuilds += 1;
                    LayerRecord {
                        provider: layer.provider(),
                        shown: layer.display().map(|asset| asset.key().coord),
                        fallback: layer.is_fallback(),
                        opacity: layer.opacity(),
                    }
                }
            };
            layer.acknowledge();
            records.push(record);
        }
        self.events.push(RenderEvent::Rendered {
            tile,
            layers: records.clone(),
        });
        self.drawn.insert(tile, records);
    }

    fn unrender(&mut self, tile: TileCoord, provider: Option<ProviderId>) {
        match provider {
            Some(id) => {
                if let Some(layers) = self.drawn.get_mut(&tile) {
                    layers.retain(|r| r.provider != id);
                }
            }
            None => {
                self.drawn.remove(&tile);
            }
        }
        tracing::trace!(%tile, ?provider, "tile unrendered");
        self.events.push(RenderEvent::Unrendered { tile, provider });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::DVec3;
    use tilestream_assets::{GridImageryProvider, ProviderCollection};
    use tilestream_common::{CameraState, FrameState, Perspective};
    use tilestream_stream::{FlatTerrainProvider, SchedulerConfig, TileScheduler};
    use tilestream_tiling::GeographicTilingScheme;

    use super::*;

    fn scheduler(layers: usize) -> (TileScheduler, Vec<ProviderId>) {
        let scheme = GeographicTilingScheme::new();
        let terrain = FlatTerrainProvider::new(&scheme);
        let mut providers = ProviderCollection::new();
        let ids = (0..layers)
            .map(|i| providers.add(Box::new(GridImageryProvider::new(format!("grid-{i}")))))
            .collect();
        let scheduler = TileScheduler::new(
            SchedulerConfig::default(),
            Box::new(scheme),
            Box::new(terrain),
            providers,
        );
        (scheduler, ids)
    }

    fn frame(n: u64, height: f64) -> FrameState {
        let camera = CameraState::new(DVec3::new(0.0, 0.0, height), DVec3::NEG_Z, DVec3::Y);
        FrameState::perspective(n, camera, Perspective::default(), 1080.0)
    }

    #[test]
    fn steady_frames_do_not_rebuild_layers() {
        let (mut scheduler, _) = scheduler(2);
        let mut renderer = RecordingRenderer::new();
        for n in 0..5 {
            scheduler.render(Duration::from_secs(1), &frame(n, 4.0e7), &mut renderer);
        }
        assert_eq!(renderer.drawn().len(), 2);
        assert_eq!(renderer.rebuilds(), 4);
        let layers = renderer.layers(TileCoord::new(0, 0, 0)).unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers.iter().all(|l| l.shown == Some(TileCoord::new(0, 0, 0))));
    }

    #[test]
    fn hiding_a_layer_removes_it_and_showing_rebuilds_it() {
        let (mut scheduler, ids) = scheduler(2);
        let mut renderer = RecordingRenderer::new();
        let budget = Duration::from_secs(1);
        for n in 0..2 {
            scheduler.render(budget, &frame(n, 4.0e7), &mut renderer);
        }

        scheduler.providers_mut().set_visible(ids[1], false);
        scheduler.render(budget, &frame(2, 4.0e7), &mut renderer);
        assert_eq!(renderer.layers(TileCoord::new(1, 0, 0)).unwrap().len(), 1);

        let before = renderer.rebuilds();
        scheduler.providers_mut().set_visible(ids[1], true);
        scheduler.render(budget, &frame(3, 4.0e7), &mut renderer);
        assert_eq!(renderer.layers(TileCoord::new(1, 0, 0)).unwrap().len(), 2);
        assert_eq!(renderer.rebuilds(), before + 2);
    }

    #[test]
    fn zooming_out_unrenders_children() {
        let (mut scheduler, _) = scheduler(1);
        let mut renderer = RecordingRenderer::new();
        let budget = Duration::from_secs(1);
        for n in 0..3 {
            scheduler.render(budget, &frame(n, 1.0e6), &mut renderer);
        }
        assert!(renderer.drawn().keys().all(|t| t.level >= 1));

        renderer.drain_events();
        scheduler.render(budget, &frame(3, 4.0e7), &mut renderer);
        assert!(renderer.drawn().keys().all(|t| t.level == 0));
        assert!(
            renderer
                .events()
                .iter()
                .any(|e| matches!(e, RenderEvent::Unrendered { provider: None, .. }))
        );
    }
}
