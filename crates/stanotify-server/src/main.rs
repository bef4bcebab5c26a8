//! stanotify-server - standalone change notification server.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stanotify_proto::{ModelPathValidator, TopicParser};
use stanotify_server::{
    create_transport, start_processor, Args, EventDispatcher, JsonSerializer, NngBroker,
    NotificationService, SubscriptionRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stanotify_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting notification server"
    );

    let config = Args::parse().into_config()?;

    tracing::info!(
        control_address = %config.control_address,
        publish_address = %config.publish_address,
        ingest_address = ?config.ingest_address,
        versions = ?config.notify.parser.versions,
        qos = ?config.notify.qos,
        "configuration loaded"
    );

    let registry = Arc::new(SubscriptionRegistry::new());
    let broker = Arc::new(NngBroker::listen(&config.publish_address)?);
    let dispatcher = Arc::new(EventDispatcher::new(
        registry.clone(),
        Arc::new(JsonSerializer::new()),
        broker,
        config.notify.qos,
    ));
    let capture = start_processor(dispatcher, config.notify.capture_capacity);

    let parser = TopicParser::new(config.notify.parser.clone(), Arc::new(ModelPathValidator::new()));
    let service = Arc::new(NotificationService::new(parser, registry));

    let transport = create_transport(&config, service, capture)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(());
    });

    tracing::info!("server ready, accepting subscriptions");
    match transport.run_until_shutdown(shutdown_rx).await {
        Ok(()) => {
            tracing::info!("server shutdown complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            return Err(e.into());
        }
    }

    Ok(())
}
