use std::collections::BTreeMap;

use tilestream_assets::AssetState;
use tilestream_common::{ProviderId, TileCoord};
use tilestream_stream::{TerrainState, TileScheduler};

/// Scheduler inspector for developer tooling.
///
/// Provides read-only queries against the tile tree, LRU queue, asset cache
/// and the last rendered set.
pub struct SchedulerInspector;

impl SchedulerInspector {
    /// Produce a summary of the scheduler state after the last frame.
    pub fn summary(scheduler: &TileScheduler) -> SchedulerSummary {
        let counts = scheduler.cache().state_counts();
        let count = |state| counts.get(&state).copied().unwrap_or(0);

        let mut selected_by_level = BTreeMap::new();
        for coord in scheduler.selected_coords() {
            *selected_by_level.entry(coord.level).or_insert(0) += 1;
        }

        SchedulerSummary {
            frame: scheduler.stats().frame_number,
            tiles: scheduler.tree().len(),
            tiles_with_payload: scheduler.tree().loaded_count(),
            lru_count: scheduler.lru().len(),
            providers: scheduler.providers().len(),
            assets_unloaded: count(AssetState::Unloaded),
            assets_loading: count(AssetState::Loading),
            assets_loaded: count(AssetState::Loaded),
            assets_failed: count(AssetState::Failed),
            selected_by_level,
        }
    }

    /// Details of the node at `coord`, if it was ever created.
    pub fn inspect_tile(scheduler: &TileScheduler, coord: TileCoord) -> Option<TileInfo> {
        let cache = scheduler.cache();
        let (handle, node) = scheduler
            .tree()
            .iter()
            .find(|(_, node)| node.coord() == coord)?;

        let layers = node
            .payload()
            .map(|payload| {
                scheduler
                    .providers()
                    .iter()
                    .filter_map(|layer| {
                        let binding = payload.binding(layer.id())?;
                        Some(LayerInfo {
                            provider: layer.id(),
                            name: layer.provider().name().to_string(),
                            own_state: cache.state(binding.own()),
                            shown: binding.resolve_display_asset(cache).map(|k| k.coord),
                            settled: binding.is_settled(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(TileInfo {
            coord,
            distance: node.distance(),
            priority: node.priority(),
            renderable: node.is_renderable(cache, scheduler.providers()),
            terrain: node.payload().map(|p| p.terrain_state()),
            in_lru: scheduler.lru().contains(scheduler.tree(), handle),
            selected: scheduler.selected().contains(&handle),
            layers,
        })
    }

    /// Tiles rendered by the last frame.
    pub fn list_selected(scheduler: &TileScheduler) -> Vec<TileCoord> {
        scheduler.selected_coords()
    }
}

/// Summary of scheduler state for the inspector.
#[derive(Debug, Clone)]
pub struct SchedulerSummary {
    pub frame: u64,
    pub tiles: usize,
    pub tiles_with_payload: usize,
    pub lru_count: usize,
    pub providers: usize,
    pub assets_unloaded: usize,
    pub assets_loading: usize,
    pub assets_loaded: usize,
    pub assets_failed: usize,
    pub selected_by_level: BTreeMap<u32, usize>,
}

impl SchedulerSummary {
    pub fn selected(&self) -> usize {
        self.selected_by_level.values().sum()
    }
}

impl std::fmt::Display for SchedulerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tiles: frame={} nodes={} with_payload={} lru={} providers={} \
             assets(unloaded={} loading={} loaded={} failed={}) selected={}",
            self.frame,
            self.tiles,
            self.tiles_with_payload,
            self.lru_count,
            self.providers,
            self.assets_unloaded,
            self.assets_loading,
            self.assets_loaded,
            self.assets_failed,
            self.selected(),
        )?;
        for (level, count) in &self.selected_by_level {
            write!(f, " L{level}:{count}")?;
        }
        Ok(())
    }
}

/// One provider layer of an inspected tile.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub provider: ProviderId,
    pub name: String,
    pub own_state: Option<AssetState>,
    pub shown: Option<TileCoord>,
    pub settled: bool,
}

/// Detailed info about a single tile.
#[derive(Debug, Clone)]
pub struct TileInfo {
    pub coord: TileCoord,
    pub distance: Option<f64>,
    pub priority: f64,
    pub renderable: bool,
    pub terrain: Option<TerrainState>,
    pub in_lru: bool,
    pub selected: bool,
    pub layers: Vec<LayerInfo>,
}

impl std::fmt::Display for TileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tile {} renderable={} selected={} lru={} priority={:.1}",
            self.coord, self.renderable, self.selected, self.in_lru, self.priority
        )?;
        if let Some(distance) = self.distance {
            write!(f, " distance={distance:.0}")?;
        }
        for layer in &self.layers {
            let shown = layer
                .shown
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            write!(f, "\n  {} ({}) shows {shown}", layer.provider, layer.name)?;
        }
        Ok(())
    }
}
