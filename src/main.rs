//! wh-notifier - real-time notification bridge between a wormhole-mapping
//! service and a chat platform.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use wh_notifier::config::{self, Config, LegacyEnv};
use wh_notifier::http::{self, HealthSource};
use wh_notifier::notifier::NotificationCoordinator;
use wh_notifier::processor::EventProcessor;
use wh_notifier::registry::{MapRegistry, RegistryMode};
use wh_notifier::sse::SseSupervisor;
use wh_notifier::transport::persistent::{PersistentValues, SqlxPersistentValues};
use wh_notifier::transport::voice::NoopVoiceParticipantsSource;
use wh_notifier::transport::webhook::WebhookTransport;
use wh_notifier::{metrics, static_info};

struct SupervisorHealth(Arc<SseSupervisor>);

impl HealthSource for SupervisorHealth {
    fn is_healthy(&self) -> bool {
        self.0.any_connected()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!("configuration validation failed with {} error(s)", errors.len()));
    }

    info!(server = %config.server.name, "starting wh-notifier");

    let legacy = LegacyEnv::from_environment();
    let (registry, _maps_updated_rx) =
        MapRegistry::new(config.maps.base_url.clone(), config.maps.api_key.clone(), legacy.clone());
    let registry = Arc::new(registry);

    // Seed the registry before anything else reads it: a fatal_init_error if
    // neither the control plane nor the legacy fallback produce a single map.
    if let Err(err) = registry.refresh().await {
        if registry.all_maps().is_empty() {
            error!(error = %err, "no map configuration available from control plane or legacy fallback");
            return Err(anyhow::anyhow!("failed to obtain any map configuration: {err}"));
        }
        tracing::warn!(error = %err, "initial control-plane refresh failed, continuing with legacy configuration");
    }
    info!(count = registry.all_maps().len(), "map registry seeded");

    let webhook_url = config
        .transport
        .webhook_url
        .clone()
        .expect("validate() guarantees transport.webhook_url is set");
    let transport = Arc::new(WebhookTransport::new(
        webhook_url,
        Duration::from_secs(config.transport.dispatch_timeout_secs),
    ));

    let persistent: Arc<dyn PersistentValues> = match SqlxPersistentValues::new("wh-notifier.db").await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open persistent store, priority list will not survive restarts");
            Arc::new(wh_notifier::transport::persistent::InMemoryPersistentValues::default())
        }
    };

    let mut notifications_config = config.notifications.clone();
    if registry.mode() == RegistryMode::Legacy {
        if let Some(legacy) = &legacy {
            notifications_config.apply_legacy(legacy);
        }
    }

    let coordinator = Arc::new(NotificationCoordinator::new(
        notifications_config,
        transport,
        persistent,
        Arc::new(NoopVoiceParticipantsSource),
        config.transport.circuit_failure_threshold,
        Duration::from_secs(config.transport.circuit_cooldown_secs),
    ));
    if let Err(e) = coordinator.load_persisted_priority_set().await {
        tracing::warn!(error = %e, "failed to load persisted priority systems");
    }

    let static_info = Arc::new(static_info::StaticInfoClient::new(config.maps.base_url.clone()));
    let processor = Arc::new(EventProcessor::new(registry.clone(), coordinator, static_info));

    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);

    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT - initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM - initiating graceful shutdown"),
        }
    });

    // Periodic control-plane config refresh.
    {
        let registry = registry.clone();
        let interval_secs = config.maps.refresh_interval_secs;
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = registry.refresh().await {
                            tracing::warn!(error = %e, "control-plane refresh failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // The Supervisor must not start SSE clients before this point: the
    // registry refresh above is the "initial bulk data load" gate.
    let supervisor = Arc::new(SseSupervisor::new(
        config.maps.base_url.clone(),
        registry.clone(),
        processor,
        shutdown_tx.clone(),
    ));
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await });
    }
    info!("SSE supervisor started");

    if config.metrics.port == 0 {
        info!("metrics HTTP server disabled");
    } else {
        metrics::init();
        let health: Arc<dyn HealthSource> = Arc::new(SupervisorHealth(supervisor.clone()));
        let port = config.metrics.port;
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            http::run_http_server(port, health, shutdown_rx).await;
        });
        info!(port, "metrics HTTP server started");
    }

    let mut shutdown_rx = shutdown_tx.subscribe();
    let _ = shutdown_rx.recv().await;

    info!("shutting down, draining in-flight work");
    tokio::time::sleep(Duration::from_secs(5)).await;

    Ok(())
}
