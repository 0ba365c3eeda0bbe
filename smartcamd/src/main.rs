use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::protocol::STATUS_NO_MOTION;
use smartcamd::api;
use smartcamd::config::Config;
use smartcamd::notify::NotificationDispatcher;
use smartcamd::ssdp::{self, RegistrationTable, SsdpResponder};
use smartcamd::status_feed;
use smartcamd::subscriber_manager::{self, SubscriberHandle};
use smartcamd::subscribers::SubscriberStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smartcamd=info"))
        )
        .init();

    tracing::info!("Starting smartcamd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/smartcam/smartcamd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // A corrupt subscriber file stops startup here
    let store = SubscriberStore::open(&config.subscribers.path)?;
    tracing::info!(
        "Loaded {} subscriber(s) from {:?}",
        store.len(),
        config.subscribers.path
    );
    let subscribers = SubscriberHandle::spawn(store);

    let dispatcher = NotificationDispatcher::new(subscribers.clone(), &config.notify, STATUS_NO_MOTION)?;

    // Device identity
    let device_uuid = config
        .device
        .uuid
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let local_ip = match config.device.advertise_address {
        Some(ip) => ip,
        None => ssdp::detect_local_ipv4(config.ssdp.multicast_group)?,
    };

    // Extract port from listen address
    let api_port = config.api.listen
        .split(':')
        .last()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);

    let presentation_url = config
        .device
        .presentation_url
        .clone()
        .unwrap_or_else(|| format!("http://{}/", local_ip));
    let location = format!("http://{}:{}{}", local_ip, api_port, config.api.descriptor_path);

    // Register self-advertisement
    let mut table = RegistrationTable::new();
    table.register(ssdp::device_registration(&device_uuid, &location, &config.ssdp));
    let responder = SsdpResponder::bind(&config.ssdp, table)?;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn SSDP responder task
    let ssdp_cancel = cancel.clone();
    let ssdp_handle = tokio::spawn(async move {
        if let Err(e) = responder.run(ssdp_cancel).await {
            tracing::error!("SSDP responder error: {}", e);
        }
    });

    // Spawn optional subscriber sweep
    let sweep_handle = (config.subscribers.sweep_interval_secs > 0).then(|| {
        let sweep_cancel = cancel.clone();
        let sweep_subscribers = subscribers.clone();
        let interval = std::time::Duration::from_secs(config.subscribers.sweep_interval_secs);
        tokio::spawn(async move {
            if let Err(e) = subscriber_manager::run_sweep(sweep_subscribers, interval, sweep_cancel).await {
                tracing::error!("Subscriber sweep error: {}", e);
            }
        })
    });

    // Status changes arrive as lines on stdin
    let feed_cancel = cancel.clone();
    let feed_dispatcher = dispatcher.clone();
    let feed_rx = status_feed::spawn_stdin_reader();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = status_feed::run(feed_rx, feed_dispatcher, feed_cancel).await {
            tracing::error!("Status feed error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        subscribers: subscribers.clone(),
        status_rx: dispatcher.status(),
        psk: Arc::new(config.api.psk.clone()),
        descriptor: Arc::new(api::descriptor::render(&device_uuid, &config.device.friendly_name, &presentation_url)),
    };
    let app = api::routes::router(app_state, &config.api.descriptor_path);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}, descriptor at {}", config.api.listen, location);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation; the responder sends byebye on its way out
    cancel.cancel();

    let _ = tokio::join!(ssdp_handle, feed_handle, server_handle);
    if let Some(handle) = sweep_handle {
        let _ = handle.await;
    }

    // Shutdown subscriber thread
    if let Err(e) = subscribers.shutdown().await {
        tracing::error!("Failed to shutdown subscriber thread: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
