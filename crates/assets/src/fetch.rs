use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use tilestream_common::TileCoord;

use crate::image::TileImage;

/// Errors from asset fetches.
///
/// None of these escape the cache: a failed asset is recovered by ancestor
/// fallback in the binding that owns it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),
    #[error("decoded asset for {coord} has zero extent")]
    EmptyPayload { coord: TileCoord },
    #[error("provider declined the request, retry on the next poll")]
    Throttled,
    #[error("fetch for {coord} was dropped without a completion")]
    Disconnected { coord: TileCoord },
}

/// Terminal status of a fetch. Delivered exactly once per request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Loaded(TileImage),
    Failed(String),
    /// The request was cancelled before a payload arrived.
    Aborted,
}

#[derive(Debug)]
struct FetchShared {
    priority: AtomicU64,
    cancelled: AtomicBool,
}

/// Cancellable handle to an in-flight fetch.
///
/// The priority is live: providers that schedule their own work should read
/// it when deciding what to run next, so reprioritizing never reissues a fetch.
/// Lower values are more urgent.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    shared: Arc<FetchShared>,
}

impl FetchHandle {
    fn new(priority: f64) -> Self {
        Self {
            shared: Arc::new(FetchShared {
                priority: AtomicU64::new(priority.to_bits()),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn priority(&self) -> f64 {
        f64::from_bits(self.shared.priority.load(Ordering::Relaxed))
    }

    pub fn set_priority(&self, priority: f64) {
        self.shared
            .priority
            .store(priority.to_bits(), Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }
}

/// A fetch handed to a provider.
///
/// Completing consumes the request, so the terminal notification can only be
/// sent once. Dropping it without completing resolves the fetch as
/// [`FetchError::Disconnected`].
#[derive(Debug)]
pub struct FetchRequest {
    coord: TileCoord,
    handle: FetchHandle,
    sender: Sender<FetchOutcome>,
}

impl FetchRequest {
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn handle(&self) -> &FetchHandle {
        &self.handle
    }

    pub fn priority(&self) -> f64 {
        self.handle.priority()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn complete(self, outcome: FetchOutcome) {
        // The receiver is gone once the asset was released; nothing to fold into.
        let _ = self.sender.send(outcome);
    }

    pub fn succeed(self, image: TileImage) {
        self.complete(FetchOutcome::Loaded(image));
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(FetchOutcome::Failed(reason.into()));
    }

    pub fn abort(self) {
        self.complete(FetchOutcome::Aborted);
    }
}

/// Cache-side half of a fetch: polled once per process step.
#[derive(Debug)]
pub(crate) struct PendingFetch {
    coord: TileCoord,
    handle: FetchHandle,
    receiver: Receiver<FetchOutcome>,
}

impl PendingFetch {
    pub(crate) fn handle(&self) -> &FetchHandle {
        &self.handle
    }

    /// `None` while the fetch is still outstanding.
    pub(crate) fn poll(&self) -> Option<Result<FetchOutcome, FetchError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(FetchError::Disconnected { coord: self.coord }))
            }
        }
    }
}

pub(crate) fn fetch_channel(coord: TileCoord, priority: f64) -> (FetchRequest, PendingFetch) {
    let (sender, receiver) = bounded(1);
    let handle = FetchHandle::new(priority);
    (
        FetchRequest {
            coord,
            handle: handle.clone(),
            sender,
        },
        PendingFetch {
            coord,
            handle,
            receiver,
        },
    )
}
