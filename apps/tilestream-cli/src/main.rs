mod synthetic;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use glam::DVec3;
use tracing_subscriber::EnvFilter;

use tilestream_assets::{GridImageryProvider, ProviderCollection};
use tilestream_common::{CameraState, FrameState, Fog, Perspective};
use tilestream_render::RecordingRenderer;
use tilestream_stream::{FlatTerrainProvider, SchedulerConfig, TileScheduler};
use tilestream_tiling::{GeographicTilingScheme, TilingScheme, WebMercatorTilingScheme};
use tilestream_tools::SchedulerInspector;

use crate::synthetic::{SyntheticOptions, SyntheticProvider};

#[derive(Parser)]
#[command(name = "tilestream-cli", about = "CLI tool for tilestream operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scheme {
    Geographic,
    WebMercator,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Fly a camera over synthetic imagery and report per-frame statistics
    Simulate {
        /// Number of frames to render
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Download processing budget per frame, in milliseconds
        #[arg(long, default_value = "4")]
        budget_ms: u64,
        /// Wall-clock time between frames, in milliseconds
        #[arg(long, default_value = "16")]
        frame_interval_ms: u64,
        /// Tiling scheme of the quadtree
        #[arg(long, value_enum, default_value = "geographic")]
        scheme: Scheme,
        /// Simulated fetch latency of the imagery overlays, in milliseconds
        #[arg(long, default_value = "20")]
        latency_ms: u64,
        /// Fraction of overlay tiles that fail to load
        #[arg(long, default_value = "0.05")]
        failure_rate: f64,
        /// Number of synthetic overlays above the base layer
        #[arg(long, default_value = "1")]
        overlays: usize,
        /// Camera height at the start and end of the flight, in metres
        #[arg(long, num_args = 2, default_values = ["2e7", "5e5"])]
        heights: Vec<f64>,
        /// Enable distance fog
        #[arg(long)]
        fog: bool,
        /// JSON scheduler configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the maximum screen-space error
        #[arg(long)]
        max_sse: Option<f64>,
        /// Override the tile cache size
        #[arg(long)]
        cache_size: Option<usize>,
        /// Print statistics every N frames
        #[arg(long, default_value = "10")]
        report_every: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("tilestream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("tiling: {}", tilestream_tiling::crate_info());
            println!("assets: {}", tilestream_assets::crate_info());
            println!("stream: {}", tilestream_stream::crate_info());
            println!("render: {}", tilestream_render::crate_info());
            println!("tools: {}", tilestream_tools::crate_info());
            println!("defaults: {:?}", SchedulerConfig::default());
        }
        Commands::Simulate {
            frames,
            budget_ms,
            frame_interval_ms,
            scheme,
            latency_ms,
            failure_rate,
            overlays,
            heights,
            fog,
            config,
            max_sse,
            cache_size,
            report_every,
        } => {
            let mut config = match config {
                Some(path) => SchedulerConfig::from_json_file(&path)?,
                None => SchedulerConfig::default(),
            };
            if let Some(sse) = max_sse {
                config.maximum_screen_space_error = sse;
            }
            if let Some(size) = cache_size {
                config.tile_cache_size = size;
            }
            anyhow::ensure!(
                (0.0..=1.0).contains(&failure_rate),
                "failure rate must be within [0, 1], got {failure_rate}"
            );

            let tiling: Box<dyn TilingScheme> = match scheme {
                Scheme::Geographic => Box::new(GeographicTilingScheme::new()),
                Scheme::WebMercator => Box::new(WebMercatorTilingScheme::new()),
            };
            config.validate_for(tiling.as_ref())?;
            let terrain = FlatTerrainProvider::new(tiling.as_ref());

            let mut providers = ProviderCollection::new();
            providers.add(Box::new(GridImageryProvider::new("base")));
            for i in 0..overlays {
                let options = SyntheticOptions {
                    latency: Duration::from_millis(latency_ms),
                    failure_rate,
                    ..SyntheticOptions::default()
                };
                providers.add(Box::new(SyntheticProvider::spawn(format!("overlay-{i}"), options)));
            }

            println!(
                "Simulating {frames} frames: scheme={scheme:?}, budget={budget_ms}ms, overlays={overlays}, latency={latency_ms}ms"
            );
            let mut scheduler =
                TileScheduler::new(config, tiling, Box::new(terrain), providers);
            let mut renderer = RecordingRenderer::new();
            let budget = Duration::from_millis(budget_ms);
            let (start, end) = (heights[0], heights[1]);

            for n in 0..frames {
                let t = if frames > 1 {
                    n as f64 / (frames - 1) as f64
                } else {
                    0.0
                };
                let frame = flight_frame(n, t, start, end, fog);
                let stats = scheduler.render(budget, &frame, &mut renderer);
                if report_every > 0 && (n % report_every == 0 || n + 1 == frames) {
                    println!(
                        "frame {:>4}: traversed={} selected={} high={} medium={} advanced={} evicted={} released={} unrendered={} lru={} tiles={} cache={} ({:?})",
                        stats.frame_number,
                        stats.traversed,
                        stats.selected,
                        stats.queued_high,
                        stats.queued_medium,
                        stats.advanced,
                        stats.evicted,
                        stats.released,
                        stats.unrendered,
                        stats.lru_count,
                        stats.tiles,
                        stats.cache_entries,
                        stats.elapsed,
                    );
                }
                std::thread::sleep(Duration::from_millis(frame_interval_ms));
            }

            println!("{}", SchedulerInspector::summary(&scheduler));
            println!(
                "Renderer: drawn tiles={}, layer rebuilds={}",
                renderer.drawn().len(),
                renderer.rebuilds()
            );
        }
    }

    Ok(())
}

/// Camera descending along a straight path while drifting east.
fn flight_frame(number: u64, t: f64, start_height: f64, end_height: f64, fog: bool) -> FrameState {
    let height = start_height + (end_height - start_height) * t;
    let position = DVec3::new(t * 2.0e6, 1.0e5, height);
    let camera = CameraState::new(position, DVec3::NEG_Z, DVec3::Y);
    let frame = FrameState::perspective(number, camera, Perspective::default(), 1080.0);
    if fog {
        frame.with_fog(Fog {
            enabled: true,
            ..Fog::default()
        })
    } else {
        frame
    }
}
