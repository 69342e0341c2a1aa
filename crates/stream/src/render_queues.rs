use std::collections::HashMap;

use tilestream_common::ProviderId;

use crate::queue::Queue;
use crate::render_target::TileRenderer;
use crate::tree::{TileHandle, TileTree};

/// Per-provider record of the tiles each provider was last drawn on.
///
/// Driven by provider lifecycle events so that hiding or removing a layer
/// reaches exactly the tiles showing it.
#[derive(Debug, Default)]
pub struct RenderQueueManager {
    queues: HashMap<ProviderId, Queue<TileHandle>>,
}

impl RenderQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_added(&mut self, id: ProviderId) {
        self.queues.entry(id).or_default();
    }

    /// Unrender the provider from every tile it was drawn on and drop its queue.
    pub fn provider_removed(
        &mut self,
        id: ProviderId,
        tree: &TileTree,
        renderer: &mut dyn TileRenderer,
    ) -> usize {
        let Some(queue) = self.queues.remove(&id) else {
            return 0;
        };
        for handle in queue.iter() {
            renderer.unrender(tree.node(*handle).coord(), Some(id));
        }
        tracing::debug!(%id, tiles = queue.len(), "render queue destroyed");
        queue.len()
    }

    /// Hidden: unrender the layer everywhere and clear the queue.
    /// Shown again: flag every recorded tile for a full re-render.
    pub fn visibility_changed(
        &mut self,
        id: ProviderId,
        visible: bool,
        tree: &mut TileTree,
        renderer: &mut dyn TileRenderer,
    ) {
        let Some(queue) = self.queues.get_mut(&id) else {
            return;
        };
        if visible {
            for handle in queue.iter() {
                if let Some(payload) = tree.node_mut(*handle).payload_mut() {
                    payload.mark_needs_rerender();
                }
            }
            return;
        }

        for handle in queue.iter() {
            let node = tree.node_mut(*handle);
            renderer.unrender(node.coord(), Some(id));
            if let Some(binding) = node.payload_mut().and_then(|p| p.binding_mut(id)) {
                binding.mark_changed();
            }
        }
        tracing::debug!(%id, tiles = queue.len(), "provider hidden, render queue recycled");
        queue.clear();
    }

    /// Layer order changed: redraw every tile showing the provider.
    pub fn provider_moved(&mut self, id: ProviderId, tree: &mut TileTree) {
        if let Some(queue) = self.queues.get(&id) {
            for handle in queue.iter() {
                if let Some(payload) = tree.node_mut(*handle).payload_mut() {
                    payload.mark_needs_rerender();
                }
            }
        }
    }

    /// Note that `handle` was drawn with `provider`'s asset.
    pub fn record(&mut self, provider: ProviderId, handle: TileHandle) {
        self.queues.entry(provider).or_default().enqueue(handle);
    }

    /// Drop `handle` from every queue once it is no longer drawn.
    pub fn forget(&mut self, handle: TileHandle) {
        for queue in self.queues.values_mut() {
            queue.remove(&handle);
        }
    }

    pub fn queue(&self, id: ProviderId) -> Option<&Queue<TileHandle>> {
        self.queues.get(&id)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
