//! Change capture: the hand-off from commit hooks to dispatch.
//!
//! Commit hooks call [`ChangeCapture::emit`], which rejects events for
//! unwatched entity types and otherwise queues them without blocking. A
//! background [`CaptureProcessor`] drains the queue into the
//! [`EventDispatcher`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use stanotify_proto::MutationEvent;

use crate::dispatcher::EventDispatcher;
use crate::registry::SubscriptionRegistry;

/// Why an emitted event was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Queued for dispatch.
    Queued,
    /// No subscription watches the entity type.
    Unwatched,
    /// The queue was full; the notification is lost.
    Dropped,
    /// The processor has stopped.
    Closed,
}

/// Commit-side handle for submitting mutation events.
#[derive(Clone)]
pub struct ChangeCapture {
    tx: mpsc::Sender<MutationEvent>,
    registry: Arc<SubscriptionRegistry>,
    dropped: Arc<AtomicU64>,
}

impl ChangeCapture {
    /// Create a capture handle feeding `tx`.
    pub fn new(tx: mpsc::Sender<MutationEvent>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            tx,
            registry,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit an event from a commit hook.
    ///
    /// Never blocks and never fails the caller's commit.
    pub fn emit(&self, event: MutationEvent) -> EmitOutcome {
        if !self.registry.is_watched(event.entity_type) {
            return EmitOutcome::Unwatched;
        }

        match self.tx.try_send(event) {
            Ok(()) => EmitOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    entity_type = %event.entity_type,
                    id = %event.entity.id,
                    "change capture queue full, notification dropped"
                );
                EmitOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    entity_type = %event.entity_type,
                    id = %event.entity.id,
                    "change capture processor closed, notification dropped"
                );
                EmitOutcome::Closed
            }
        }
    }

    /// Events dropped because the queue was full or the processor had stopped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Background task delivering queued events to the dispatcher.
pub struct CaptureProcessor {
    rx: mpsc::Receiver<MutationEvent>,
    dispatcher: Arc<EventDispatcher>,
}

impl CaptureProcessor {
    /// Create a new processor.
    pub fn new(rx: mpsc::Receiver<MutationEvent>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { rx, dispatcher }
    }

    /// Run until every [`ChangeCapture`] handle is dropped.
    pub async fn run(mut self) {
        info!("change capture processor started");

        while let Some(event) = self.rx.recv().await {
            debug!(
                entity_type = %event.entity_type,
                id = %event.entity.id,
                "dispatching mutation event"
            );
            let dispatcher = self.dispatcher.clone();
            let result =
                tokio::task::spawn_blocking(move || dispatcher.handle_event(&event)).await;
            if let Err(e) = result {
                warn!(error = %e, "dispatch task failed");
            }
        }

        info!("change capture processor stopped (channel closed)");
    }
}

/// Spawn a processor for `dispatcher` and return the commit-side handle.
pub fn start_processor(dispatcher: Arc<EventDispatcher>, capacity: usize) -> ChangeCapture {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let registry = dispatcher.registry().clone();
    let processor = CaptureProcessor::new(rx, dispatcher);

    tokio::spawn(async move {
        processor.run().await;
    });

    ChangeCapture::new(tx, registry)
}
