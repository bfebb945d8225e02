use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::application::ports::http_transport::{HttpTransport, TransferError};

/// What a queued URL is for. Consumers dispatch on this instead of matching
/// URL shapes, so two repositories may point at byte-identical URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Manifest,
    Logo,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub kind: TransferKind,
    /// Repository the transfer belongs to, so results can be routed even
    /// when two repositories share a URL.
    pub repo_id: String,
}

/// Lifecycle of one queued transfer. Exactly one terminal event (`Completed`,
/// `Failed` or `Cancelled`) is emitted per accepted enqueue; `seq` ties it
/// back to the value `enqueue` returned.
#[derive(Debug)]
pub enum TransferEvent {
    Progress {
        seq: u64,
        url: String,
        received: u64,
        total: Option<u64>,
    },
    Completed {
        seq: u64,
        request: TransferRequest,
        body: Vec<u8>,
    },
    Failed {
        seq: u64,
        request: TransferRequest,
        error: TransferError,
    },
    Cancelled {
        seq: u64,
        request: TransferRequest,
    },
}

struct Queued {
    seq: u64,
    request: TransferRequest,
}

struct InFlight {
    seq: u64,
    url: String,
    cancelled: bool,
}

struct QueueState {
    pending: VecDeque<Queued>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    closed: bool,
}

/// Serialized download lane: one worker task drains the queue in FIFO order,
/// at most one transfer on the wire at a time. Dropping the queue stops the
/// worker once the current transfer finishes.
pub struct DownloadQueue {
    state: Arc<Mutex<QueueState>>,
    wake: Arc<Notify>,
}

impl DownloadQueue {
    /// Spawn the worker and hand back the queue plus the event stream it
    /// feeds. Dropping the receiver also stops the worker.
    pub fn new(transport: Arc<dyn HttpTransport>) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(QueueState {
            pending: VecDeque::new(),
            in_flight: None,
            next_seq: 0,
            closed: false,
        }));
        let wake = Arc::new(Notify::new());
        tokio::spawn(run_worker(state.clone(), wake.clone(), transport, events));
        (Self { state, wake }, rx)
    }

    /// Append a transfer to the back of the queue. Duplicates are accepted;
    /// each enqueue gets its own sequence number and its own terminal event.
    pub fn enqueue(&self, request: TransferRequest) -> u64 {
        let seq = {
            let mut state = lock(&self.state);
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(seq, url = %request.url, kind = ?request.kind, "transfer_enqueued");
            state.pending.push_back(Queued { seq, request });
            seq
        };
        self.wake.notify_one();
        seq
    }

    /// Drop the first pending entry for `url`, or flag the in-flight transfer
    /// for cancellation when it matches. Returns whether a pending entry was
    /// removed; in-flight cancellation is best effort and resolves through a
    /// `Cancelled` event later.
    pub fn remove(&self, url: &str) -> bool {
        let mut state = lock(&self.state);
        if let Some(pos) = state.pending.iter().position(|q| q.request.url == url) {
            let dropped = state.pending.remove(pos);
            if let Some(dropped) = dropped {
                debug!(seq = dropped.seq, url, "transfer_removed_from_queue");
            }
            return true;
        }
        if let Some(in_flight) = state.in_flight.as_mut() {
            if in_flight.url == url {
                in_flight.cancelled = true;
                debug!(seq = in_flight.seq, url, "transfer_cancel_requested");
            }
        }
        false
    }

    pub fn is_busy(&self) -> bool {
        let state = lock(&self.state);
        state.in_flight.is_some() || !state.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

impl Drop for DownloadQueue {
    fn drop(&mut self) {
        lock(&self.state).closed = true;
        self.wake.notify_one();
    }
}

fn lock(state: &Mutex<QueueState>) -> std::sync::MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker(
    state: Arc<Mutex<QueueState>>,
    wake: Arc<Notify>,
    transport: Arc<dyn HttpTransport>,
    events: mpsc::UnboundedSender<TransferEvent>,
) {
    loop {
        let next = {
            let mut state = lock(&state);
            if state.closed {
                break;
            }
            match state.pending.pop_front() {
                Some(queued) => {
                    state.in_flight = Some(InFlight {
                        seq: queued.seq,
                        url: queued.request.url.clone(),
                        cancelled: false,
                    });
                    Some(queued)
                }
                None => None,
            }
        };

        let Some(Queued { seq, request }) = next else {
            wake.notified().await;
            continue;
        };

        debug!(seq, url = %request.url, kind = ?request.kind, "transfer_started");
        let progress_events = events.clone();
        let progress_url = request.url.clone();
        let on_progress = move |received: u64, total: Option<u64>| {
            let _ = progress_events.send(TransferEvent::Progress {
                seq,
                url: progress_url.clone(),
                received,
                total,
            });
        };
        let result = transport.fetch(&request.url, &on_progress).await;

        let cancelled = {
            let mut state = lock(&state);
            state
                .in_flight
                .take()
                .map(|f| f.cancelled)
                .unwrap_or(false)
        };

        let event = if cancelled {
            debug!(seq, url = %request.url, "transfer_cancelled");
            TransferEvent::Cancelled { seq, request }
        } else {
            match result {
                Ok(body) => {
                    debug!(seq, url = %request.url, bytes = body.len(), "transfer_completed");
                    TransferEvent::Completed { seq, request, body }
                }
                Err(error) => {
                    debug!(seq, url = %request.url, error = %error, "transfer_failed");
                    TransferEvent::Failed { seq, request, error }
                }
            }
        };
        if events.send(event).is_err() {
            // Consumer went away; no point draining the rest.
            break;
        }
    }
}
