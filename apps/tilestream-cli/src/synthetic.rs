use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tilestream_assets::{AssetProvider, FetchError, FetchRequest, GridImageryProvider, TileImage};
use tilestream_common::TileCoord;

/// Behaviour of a [`SyntheticProvider`].
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    pub latency: Duration,
    /// Fraction of tiles, in `[0, 1]`, that fail deterministically.
    pub failure_rate: f64,
    pub workers: usize,
    /// Requests in flight before new ones are throttled.
    pub max_in_flight: usize,
    pub tile_size: u32,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            failure_rate: 0.0,
            workers: 4,
            max_in_flight: 64,
            tile_size: 16,
        }
    }
}

/// Imagery provider that serves solid tiles from worker threads after a
/// simulated latency. Workers run the most urgent waiting request first.
pub struct SyntheticProvider {
    name: String,
    options: SyntheticOptions,
    sender: Option<Sender<FetchRequest>>,
    in_flight: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl SyntheticProvider {
    pub fn spawn(name: impl Into<String>, options: SyntheticOptions) -> Self {
        let (sender, receiver) = unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let workers = (0..options.workers.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let in_flight = Arc::clone(&in_flight);
                let options = options.clone();
                std::thread::spawn(move || worker_loop(&receiver, &in_flight, &options))
            })
            .collect();
        Self {
            name: name.into(),
            options,
            sender: Some(sender),
            in_flight,
            workers,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl AssetProvider for SyntheticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_width(&self) -> u32 {
        self.options.tile_size
    }

    fn tile_height(&self) -> u32 {
        self.options.tile_size
    }

    fn request_tile_asset(&self, request: FetchRequest) -> Result<(), FetchError> {
        let Some(sender) = &self.sender else {
            return Err(FetchError::Failed("provider shut down".into()));
        };
        if self.in_flight.fetch_add(1, Ordering::AcqRel) >= self.options.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(FetchError::Throttled);
        }
        let coord = request.coord();
        sender.send(request).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            FetchError::Disconnected { coord }
        })
    }
}

impl Drop for SyntheticProvider {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!(provider = %self.name, "synthetic worker panicked");
            }
        }
    }
}

fn worker_loop(receiver: &Receiver<FetchRequest>, in_flight: &AtomicUsize, options: &SyntheticOptions) {
    let mut backlog: Vec<FetchRequest> = Vec::new();
    loop {
        if backlog.is_empty() {
            match receiver.recv() {
                Ok(request) => backlog.push(request),
                Err(_) => return,
            }
        }
        backlog.extend(receiver.try_iter());

        let Some(index) = most_urgent(&backlog) else {
            continue;
        };
        let request = backlog.swap_remove(index);
        serve(request, options);
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn most_urgent(backlog: &[FetchRequest]) -> Option<usize> {
    backlog
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.priority().total_cmp(&b.priority()))
        .map(|(index, _)| index)
}

fn serve(request: FetchRequest, options: &SyntheticOptions) {
    if request.is_cancelled() {
        request.abort();
        return;
    }
    std::thread::sleep(options.latency);
    if request.is_cancelled() {
        request.abort();
        return;
    }

    let coord = request.coord();
    if fails(coord, options.failure_rate) {
        tracing::debug!(%coord, "synthetic fetch failed");
        request.fail(format!("synthetic failure for {coord}"));
        return;
    }
    let color = GridImageryProvider::level_color(coord.level);
    request.succeed(TileImage::solid(options.tile_size, options.tile_size, color));
}

/// Deterministic per-tile failure decision.
fn fails(coord: TileCoord, rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    let hash = (coord.x as u64).wrapping_mul(73_856_093)
        ^ (coord.y as u64).wrapping_mul(19_349_663)
        ^ (coord.level as u64).wrapping_mul(83_492_791);
    (hash % 1000) as f64 / 1000.0 < rate
}
