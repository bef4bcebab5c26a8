//! Server configuration.

use clap::Parser;

use stanotify_proto::{ParserConfig, DEFAULT_VERSIONS};

use crate::broker::QoS;

/// Default address for the control (subscribe/unsubscribe) socket.
pub const DEFAULT_CONTROL_ADDRESS: &str = "tcp://0.0.0.0:9100";

/// Default address for the publish socket.
pub const DEFAULT_PUBLISH_ADDRESS: &str = "tcp://0.0.0.0:9101";

/// Default address for the mutation ingest socket.
pub const DEFAULT_INGEST_ADDRESS: &str = "tcp://0.0.0.0:9102";

/// Default capacity of the change capture queue.
pub const DEFAULT_CAPTURE_CAPACITY: usize = 4096;

/// Default maximum message size (4 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

fn default_transport_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .clamp(1, 4)
}

/// Settings for topic parsing and dispatch.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Topic parser settings.
    pub parser: ParserConfig,
    /// QoS used when publishing notifications.
    pub qos: QoS,
    /// Capacity of the queue between commit hooks and dispatch.
    pub capture_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            qos: QoS::AtLeastOnce,
            capture_capacity: DEFAULT_CAPTURE_CAPACITY,
        }
    }
}

/// Notification server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address of the REP socket receiving control requests.
    pub control_address: String,

    /// Address of the PUB socket notifications are published on.
    pub publish_address: String,

    /// Address of the PULL socket receiving mutation events. None disables ingest.
    pub ingest_address: Option<String>,

    /// Maximum message size in bytes.
    pub max_message_size: usize,

    /// Number of control worker loops.
    pub transport_workers: usize,

    /// Parser and dispatch settings.
    pub notify: NotifyConfig,
}

impl ServerConfig {
    /// Create a configuration with default addresses.
    pub fn new() -> Self {
        Self {
            control_address: DEFAULT_CONTROL_ADDRESS.to_string(),
            publish_address: DEFAULT_PUBLISH_ADDRESS.to_string(),
            ingest_address: Some(DEFAULT_INGEST_ADDRESS.to_string()),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            transport_workers: default_transport_workers(),
            notify: NotifyConfig::default(),
        }
    }

    /// Set the control address.
    pub fn with_control_address(mut self, address: impl Into<String>) -> Self {
        self.control_address = address.into();
        self
    }

    /// Set the publish address.
    pub fn with_publish_address(mut self, address: impl Into<String>) -> Self {
        self.publish_address = address.into();
        self
    }

    /// Set the ingest address.
    pub fn with_ingest_address(mut self, address: impl Into<String>) -> Self {
        self.ingest_address = Some(address.into());
        self
    }

    /// Disable the ingest socket.
    pub fn without_ingest(mut self) -> Self {
        self.ingest_address = None;
        self
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the number of control worker loops.
    pub fn with_transport_workers(mut self, workers: usize) -> Self {
        self.transport_workers = workers.max(1);
        self
    }

    /// Set the parser and dispatch settings.
    pub fn with_notify(mut self, notify: NotifyConfig) -> Self {
        self.notify = notify;
        self
    }

    /// Check if mutation ingest is enabled.
    pub fn has_ingest(&self) -> bool {
        self.ingest_address.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "stanotify-server")]
#[command(version, about = "SensorThings change notification server", long_about = None)]
pub struct Args {
    /// Control socket address.
    #[arg(long, default_value = DEFAULT_CONTROL_ADDRESS)]
    pub control: String,

    /// Publish socket address.
    #[arg(long, default_value = DEFAULT_PUBLISH_ADDRESS)]
    pub publish: String,

    /// Mutation ingest socket address.
    #[arg(long, default_value = DEFAULT_INGEST_ADDRESS)]
    pub ingest: String,

    /// Disable the mutation ingest socket.
    #[arg(long)]
    pub no_ingest: bool,

    /// Accepted topic version prefixes (repeatable).
    #[arg(long = "version-prefix")]
    pub versions: Vec<String>,

    /// Strip quoting from parenthesized identifiers in topics.
    #[arg(long)]
    pub unquote_ids: bool,

    /// QoS for published notifications (0, 1 or 2).
    #[arg(long, default_value_t = 1)]
    pub qos: u8,

    /// Change capture queue capacity.
    #[arg(long, default_value_t = DEFAULT_CAPTURE_CAPACITY)]
    pub capture_capacity: usize,

    /// Maximum message size in megabytes.
    #[arg(long, default_value_t = 4)]
    pub max_message_mb: usize,

    /// Control worker loops (0 = auto).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> Result<ServerConfig, crate::Error> {
        let qos = QoS::try_from(self.qos)?;
        let versions = if self.versions.is_empty() {
            DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect()
        } else {
            self.versions
        };

        let max_message_size = self
            .max_message_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "max message size of {} MB is too large",
                    self.max_message_mb
                ))
            })?;

        let transport_workers = if self.workers == 0 {
            default_transport_workers()
        } else {
            self.workers.max(1)
        };

        Ok(ServerConfig {
            control_address: self.control,
            publish_address: self.publish,
            ingest_address: if self.no_ingest {
                None
            } else {
                Some(self.ingest)
            },
            max_message_size,
            transport_workers,
            notify: NotifyConfig {
                parser: ParserConfig::new()
                    .with_versions(versions)
                    .with_unquote_ids(self.unquote_ids),
                qos,
                capture_capacity: self.capture_capacity.max(1),
            },
        })
    }
}
