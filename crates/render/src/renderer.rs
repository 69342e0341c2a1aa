use std::fmt::Write as _;

use tilestream_common::{ProviderId, TileCoord};
use tilestream_stream::{LayerDraw, TileRenderer};

/// Debug text renderer: appends one line per draw call to an in-memory log.
///
/// Changed layers are marked with `*` and acknowledged, so a layer shows up
/// as changed exactly once per transition. Useful for CLI output and logging.
#[derive(Debug, Default)]
pub struct DebugTextRenderer {
    out: String,
    draw_calls: usize,
    only_changes: bool,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip tiles whose layers are all unchanged.
    pub fn only_changes(mut self) -> Self {
        self.only_changes = true;
        self
    }

    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    pub fn output(&self) -> &str {
        &self.out
    }

    /// Return the log written so far and start a new one.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

impl TileRenderer for DebugTextRenderer {
    fn render(&mut self, tile: TileCoord, layers: &mut [LayerDraw<'_>]) {
        self.draw_calls += 1;
        let changed = layers.iter().any(LayerDraw::is_changed);
        if self.only_changes && !changed {
            return;
        }

        let _ = write!(self.out, "draw {tile}:");
        if layers.is_empty() {
            self.out.push_str(" <no layers>");
        }
        for layer in layers.iter_mut() {
            let marker = if layer.is_changed() { "*" } else { "" };
            let shown = match layer.display() {
                Some(asset) if layer.is_fallback() => format!("{} (fallback)", asset.key().coord),
                Some(asset) => asset.key().coord.to_string(),
                None => "-".to_string(),
            };
            let _ = write!(
                self.out,
                " [{}{marker} {shown} a={:.2}]",
                layer.provider(),
                layer.opacity()
            );
            layer.acknowledge();
        }
        self.out.push('\n');
    }

    fn unrender(&mut self, tile: TileCoord, provider: Option<ProviderId>) {
        match provider {
            Some(id) => {
                let _ = writeln!(self.out, "hide {tile} {id}");
            }
            None => {
                let _ = writeln!(self.out, "hide {tile}");
            }
        }
    }
}
