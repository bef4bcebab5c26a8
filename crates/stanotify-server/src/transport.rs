//! Socket transport using async-nng.
//!
//! Two sockets are served:
//!
//! - a REP socket carrying [`ControlRequest`]s forwarded from the broker's
//!   subscribe/unsubscribe callbacks;
//! - an optional PULL socket carrying [`MutationMessage`]s pushed by the
//!   persistence layer's commit hooks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_nng::AsyncContext;
use nng::options::{Options, RecvMaxSize, RecvTimeout};
use nng::{Message, Protocol, Socket};

use stanotify_proto::framing::{decode_json, encode_json};
use stanotify_proto::{error_codes, ControlRequest, ControlResponse, MutationEvent, MutationMessage};

use crate::capture::{ChangeCapture, EmitOutcome};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::service::NotificationService;

/// How long a receive waits before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Transport counters for monitoring.
#[derive(Debug)]
pub struct TransportMetrics {
    /// Control requests answered successfully.
    pub control_success: AtomicU64,
    /// Control requests answered with an error.
    pub control_failed: AtomicU64,
    /// Mutation messages accepted into change capture.
    pub mutations_queued: AtomicU64,
    /// Mutation messages that could not be decoded.
    pub mutations_invalid: AtomicU64,
    /// Transport start time.
    pub started_at: Instant,
}

impl TransportMetrics {
    fn new() -> Self {
        Self {
            control_success: AtomicU64::new(0),
            control_failed: AtomicU64::new(0),
            mutations_queued: AtomicU64::new(0),
            mutations_invalid: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Get the uptime duration.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server transport for control requests and mutation ingest.
pub struct Transport {
    control: Socket,
    ingest: Option<Socket>,
    service: Arc<NotificationService>,
    capture: ChangeCapture,
    max_message_size: usize,
    metrics: Arc<TransportMetrics>,
    worker_count: usize,
}

impl Transport {
    /// Bind the configured sockets.
    pub fn new(
        config: &ServerConfig,
        service: Arc<NotificationService>,
        capture: ChangeCapture,
    ) -> Result<Self, Error> {
        let control = bind(Protocol::Rep0, &config.control_address, config.max_message_size)?;
        tracing::info!(address = %config.control_address, "listening for control requests");

        let ingest = match &config.ingest_address {
            Some(address) => {
                let socket = bind(Protocol::Pull0, address, config.max_message_size)?;
                socket
                    .set_opt::<RecvTimeout>(Some(POLL_INTERVAL))
                    .map_err(|e| Error::Transport(format!("failed to set receive timeout: {}", e)))?;
                tracing::info!(address = %address, "listening for mutation events");
                Some(socket)
            }
            None => None,
        };

        Ok(Self {
            control,
            ingest,
            service,
            capture,
            max_message_size: config.max_message_size,
            metrics: Arc::new(TransportMetrics::new()),
            worker_count: config.transport_workers.max(1),
        })
    }

    /// Get a reference to the transport metrics.
    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    /// Run the transport until `shutdown` fires.
    pub async fn run_until_shutdown(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), Error> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let mut handles = self.spawn_control_workers(stop_flag.clone())?;
        if let Some(handle) = self.spawn_ingest_worker(stop_flag.clone())? {
            handles.push(handle);
        }

        tracing::info!("transport ready");

        let _ = shutdown.recv().await;
        tracing::info!(
            control_success = self.metrics.control_success.load(Ordering::Relaxed),
            control_failed = self.metrics.control_failed.load(Ordering::Relaxed),
            mutations_queued = self.metrics.mutations_queued.load(Ordering::Relaxed),
            mutations_invalid = self.metrics.mutations_invalid.load(Ordering::Relaxed),
            uptime_secs = self.metrics.uptime().as_secs(),
            "shutdown signal received, stopping transport"
        );

        stop_flag.store(true, Ordering::SeqCst);
        let _ = tokio::task::spawn_blocking(move || {
            for handle in handles {
                let _ = handle.join();
            }
        })
        .await;

        Ok(())
    }

    fn spawn_control_workers(
        &self,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<Vec<thread::JoinHandle<()>>, Error> {
        let mut handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let socket = self.control.clone();
            let worker = ControlWorker::new(self.service.clone(), self.max_message_size);
            let metrics = self.metrics.clone();
            let stop_flag = stop_flag.clone();

            let handle = thread::Builder::new()
                .name(format!("stanotify-control-{}", worker_id))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            tracing::error!(error = %e, worker_id, "failed to build worker runtime");
                            return;
                        }
                    };

                    runtime.block_on(async move {
                        let mut ctx = match AsyncContext::try_from(&socket) {
                            Ok(ctx) => ctx,
                            Err(e) => {
                                tracing::error!(error = %e, worker_id, "failed to create async context");
                                return;
                            }
                        };

                        loop {
                            if stop_flag.load(Ordering::SeqCst) {
                                tracing::info!(worker_id, "control worker stopping");
                                return;
                            }

                            match ctx.receive(Some(POLL_INTERVAL)).await {
                                Ok(msg) => {
                                    let (response, is_success) = worker.process(msg.as_slice());
                                    let response_msg = Message::from(response.as_slice());

                                    if let Err((_, e)) = ctx.send(response_msg, None).await {
                                        tracing::error!(error = %e, worker_id, "failed to send response");
                                        metrics.control_failed.fetch_add(1, Ordering::Relaxed);
                                    } else if is_success {
                                        metrics.control_success.fetch_add(1, Ordering::Relaxed);
                                    } else {
                                        metrics.control_failed.fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                                Err(nng::Error::TimedOut) => continue,
                                Err(e) => {
                                    tracing::error!(error = %e, worker_id, "receive error");
                                }
                            }
                        }
                    });
                })
                .map_err(|e| Error::Transport(format!("failed to spawn control worker: {}", e)))?;

            handles.push(handle);
        }

        Ok(handles)
    }

    fn spawn_ingest_worker(
        &self,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<Option<thread::JoinHandle<()>>, Error> {
        let Some(socket) = self.ingest.clone() else {
            return Ok(None);
        };
        let worker = IngestWorker::new(self.capture.clone(), self.max_message_size);
        let metrics = self.metrics.clone();

        let handle = thread::Builder::new()
            .name("stanotify-ingest".to_string())
            .spawn(move || loop {
                if stop_flag.load(Ordering::SeqCst) {
                    tracing::info!("ingest worker stopping");
                    return;
                }

                match socket.recv() {
                    Ok(msg) => match worker.process(msg.as_slice()) {
                        Ok(EmitOutcome::Queued) => {
                            metrics.mutations_queued.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            metrics.mutations_invalid.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "invalid mutation message");
                        }
                    },
                    Err(nng::Error::TimedOut) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "ingest receive error");
                    }
                }
            })
            .map_err(|e| Error::Transport(format!("failed to spawn ingest worker: {}", e)))?;

        Ok(Some(handle))
    }
}

fn bind(protocol: Protocol, address: &str, max_message_size: usize) -> Result<Socket, Error> {
    let socket = Socket::new(protocol)
        .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;
    socket
        .set_opt::<RecvMaxSize>(max_message_size)
        .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;
    socket
        .listen(address)
        .map_err(|e| Error::Transport(format!("failed to listen on {}: {}", address, e)))?;
    Ok(socket)
}

fn check_size(data: &[u8], max_message_size: usize) -> Result<(), Error> {
    if data.len() > max_message_size {
        return Err(Error::Protocol(stanotify_proto::Error::InvalidMessage(format!(
            "message too large: {} bytes (max: {})",
            data.len(),
            max_message_size
        ))));
    }
    Ok(())
}

struct ControlWorker {
    service: Arc<NotificationService>,
    max_message_size: usize,
}

impl ControlWorker {
    fn new(service: Arc<NotificationService>, max_message_size: usize) -> Self {
        Self {
            service,
            max_message_size,
        }
    }

    /// Process a raw request and return (response bytes, is_success).
    fn process(&self, data: &[u8]) -> (Vec<u8>, bool) {
        let response = match self.decode_and_handle(data) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "control request error");
                ControlResponse::error(error_codes::INVALID_REQUEST, e.to_string())
            }
        };
        let is_success = response.is_ok();

        let bytes = match encode_json(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                Vec::new()
            }
        };

        (bytes, is_success)
    }

    fn decode_and_handle(&self, data: &[u8]) -> Result<ControlResponse, Error> {
        check_size(data, self.max_message_size)?;
        let request: ControlRequest = decode_json(data)?;
        Ok(self.service.handle(&request))
    }
}

struct IngestWorker {
    capture: ChangeCapture,
    max_message_size: usize,
}

impl IngestWorker {
    fn new(capture: ChangeCapture, max_message_size: usize) -> Self {
        Self {
            capture,
            max_message_size,
        }
    }

    fn process(&self, data: &[u8]) -> Result<EmitOutcome, Error> {
        check_size(data, self.max_message_size)?;
        let message: MutationMessage = decode_json(data)?;
        let event = MutationEvent::try_from(message)?;
        Ok(self.capture.emit(event))
    }
}

/// Create a transport bound to the configured addresses.
pub fn create_transport(
    config: &ServerConfig,
    service: Arc<NotificationService>,
    capture: ChangeCapture,
) -> Result<Transport, Error> {
    if config.control_address.is_empty() {
        return Err(Error::Config("no control address configured".to_string()));
    }

    Transport::new(config, service, capture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubscriptionRegistry;
    use stanotify_proto::framing::encode_frame;
    use stanotify_proto::{ModelPathValidator, ParserConfig, TopicParser};
    use tokio::sync::mpsc;

    fn setup() -> (Arc<NotificationService>, ChangeCapture, mpsc::Receiver<MutationEvent>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let parser = TopicParser::new(ParserConfig::new(), Arc::new(ModelPathValidator::new()));
        let service = Arc::new(NotificationService::new(parser, registry.clone()));
        let (tx, rx) = mpsc::channel(16);
        (service, ChangeCapture::new(tx, registry), rx)
    }

    fn decode_response(bytes: &[u8]) -> ControlResponse {
        decode_json(bytes).unwrap()
    }

    #[test]
    fn test_control_subscribe() {
        let (service, _capture, _rx) = setup();
        let worker = ControlWorker::new(service.clone(), 1024);

        let request = encode_json(&ControlRequest::Subscribe {
            client_id: "c1".to_string(),
            topic: "v1.1/Things".to_string(),
        })
        .unwrap();
        let (bytes, ok) = worker.process(&request);
        assert!(ok);
        assert!(decode_response(&bytes).is_ok());
        assert_eq!(service.subscription_count(), 1);
    }

    #[test]
    fn test_control_rejects_garbage_and_oversize() {
        let (service, _capture, _rx) = setup();
        let worker = ControlWorker::new(service, 64);

        let (bytes, ok) = worker.process(b"invalid data");
        assert!(!ok);
        assert_eq!(decode_response(&bytes).code, error_codes::INVALID_REQUEST);

        let (_, ok) = worker.process(&vec![0u8; 65]);
        assert!(!ok);
    }

    #[test]
    fn test_ingest_queues_watched_mutations() {
        let (service, capture, mut rx) = setup();
        service.on_subscribe("v1.1/Datastreams(52)/Observations", "c1").unwrap();
        let worker = IngestWorker::new(capture, 4096);

        let message = serde_json::json!({
            "entity_type": "Observations",
            "id": "7",
            "change": "created",
            "membership": { "Datastreams": ["52"] }
        });
        let frame = encode_frame(&serde_json::to_vec(&message).unwrap()).unwrap();
        assert_eq!(worker.process(&frame).unwrap(), EmitOutcome::Queued);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.entity.id, "7");

        let sensor = serde_json::json!({ "entity_type": "Sensors", "id": "1", "change": "unknown" });
        let frame = encode_frame(&serde_json::to_vec(&sensor).unwrap()).unwrap();
        assert_eq!(worker.process(&frame).unwrap(), EmitOutcome::Unwatched);
    }

    #[test]
    fn test_ingest_rejects_unknown_type() {
        let (_service, capture, _rx) = setup();
        let worker = IngestWorker::new(capture, 4096);

        let message = serde_json::json!({ "entity_type": "Widgets", "id": "1", "change": "created" });
        let frame = encode_frame(&serde_json::to_vec(&message).unwrap()).unwrap();
        assert!(worker.process(&frame).is_err());
    }

    #[test]
    fn test_transport_creation() {
        let (service, capture, _rx) = setup();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new()
            .with_control_address(format!("ipc://{}", dir.path().join("ctl.sock").display()))
            .with_ingest_address(format!("ipc://{}", dir.path().join("in.sock").display()));

        match Transport::new(&config, service, capture) {
            Ok(_) => {}
            Err(Error::Transport(msg)) if msg.contains("Permission denied") => {}
            Err(err) => panic!("transport creation failed: {err}"),
        }
    }

    #[test]
    fn test_transport_requires_control_address() {
        let (service, capture, _rx) = setup();
        let config = ServerConfig::new().with_control_address("");
        assert!(create_transport(&config, service, capture).is_err());
    }
}
