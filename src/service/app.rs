//! Main application state and service coordination
//!
//! Wires the queue manager to its store, chat platform, moderation check and
//! game-server link, and owns the background tasks of the running service.

use crate::commands::CommandHandler;
use crate::config::{validate_config, AppConfig};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::platform::{InMemoryModeration, RecordingChatPlatform};
use crate::queue::QueueManager;
use crate::rcon::{GameServerLink, StaticSecretsStore, UdpRconClient};
use crate::scheduler::AnnouncementScheduler;
use crate::service::health::HealthCheck;
use crate::session::SessionController;
use crate::store::InMemoryQueueStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    queue_store: Arc<InMemoryQueueStore>,
    platform: Arc<RecordingChatPlatform>,
    moderation: Arc<InMemoryModeration>,
    queue_manager: Arc<QueueManager>,
    command_handler: Arc<CommandHandler>,

    metrics_service: Arc<MetricsService>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing pickup-room service");

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;
        info!(
            "Configuration: service={}, default team size={}, auto start={}, game servers={}",
            config.service.name,
            config.pickup.default_team_size,
            config.pickup.auto_start_when_full,
            config.rcon.passwords.len()
        );

        let metrics_service = Self::initialize_metrics(&config)?;
        let metrics_collector = metrics_service.collector();

        let queue_store = Arc::new(InMemoryQueueStore::new());
        let platform = Arc::new(RecordingChatPlatform::new());
        let moderation = Arc::new(InMemoryModeration::new());

        let server_link = GameServerLink::new(
            Arc::new(UdpRconClient::new(&config.rcon)),
            Arc::new(StaticSecretsStore::from_settings(&config.rcon)),
        )
        .with_metrics(metrics_collector.clone());

        let scheduler = Arc::new(
            AnnouncementScheduler::new(server_link.clone(), config.announcement_delays())
                .with_metrics(metrics_collector.clone()),
        );
        let session = Arc::new(
            SessionController::new(platform.clone(), config.pickup.voice_category.clone())
                .with_scheduler(scheduler),
        );

        let queue_manager = Arc::new(
            QueueManager::new(
                queue_store.clone(),
                platform.clone(),
                moderation.clone(),
                config.pickup.clone(),
            )
            .with_session(session)
            .with_server_link(server_link)
            .with_metrics(metrics_collector.clone()),
        );
        let command_handler = Arc::new(CommandHandler::new(
            queue_manager.clone(),
            metrics_collector,
        ));

        Ok(Self {
            config,
            queue_store,
            platform,
            moderation,
            queue_manager,
            command_handler,
            metrics_service,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the health endpoints and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting pickup-room service");

        self.mark_running(true).await;
        self.metrics_service.health_server().attach(self);
        self.start_metrics_service().await?;
        self.start_background_tasks().await;

        info!("✅ Pickup-room service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of pickup-room service");

        self.mark_running(false).await;
        self.stop_background_tasks().await;

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats =
            self.queue_manager
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Pickup-room service shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn mark_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn queue_manager(&self) -> Arc<QueueManager> {
        self.queue_manager.clone()
    }

    pub fn command_handler(&self) -> Arc<CommandHandler> {
        self.command_handler.clone()
    }

    pub fn queue_store(&self) -> Arc<InMemoryQueueStore> {
        self.queue_store.clone()
    }

    /// The platform adapter; the console driver reads its recorded notices
    pub fn platform(&self) -> Arc<RecordingChatPlatform> {
        self.platform.clone()
    }

    pub fn moderation(&self) -> Arc<InMemoryModeration> {
        self.moderation.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    fn initialize_metrics(config: &AppConfig) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(HealthServer::new(health_config, metrics_collector.clone()));

        Ok(Arc::new(MetricsService::new(
            metrics_collector,
            health_server,
        )))
    }

    async fn start_metrics_service(&self) -> Result<(), ServiceError> {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.lock().await.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Keep the uptime and health gauges current
    async fn start_background_tasks(&self) {
        let metrics_collector = self.metrics_service.collector();
        let queue_manager = self.queue_manager.clone();
        let is_running = self.is_running.clone();
        let started_at = self.started_at;
        let has_servers = !self.config.rcon.passwords.is_empty();

        let health_metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            info!("Health metrics task started");

            while *is_running.read().await {
                interval.tick().await;

                let uptime_seconds = started_at.elapsed().as_secs() as i64;
                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(uptime_seconds);

                let manager_ok = match queue_manager.get_stats().await {
                    Ok(stats) => {
                        debug!(
                            "Queue stats - created: {}, removed: {}, games: {}",
                            stats.queues_created, stats.queues_removed, stats.games_started
                        );
                        true
                    }
                    Err(e) => {
                        warn!("Failed to get queue stats for metrics update: {}", e);
                        false
                    }
                };

                metrics_collector.update_component_health("queue_manager", manager_ok);
                metrics_collector.update_component_health("game_server_link", has_servers);
                metrics_collector.update_health_status(match (manager_ok, has_servers) {
                    (true, true) => 2,
                    (true, false) => 1,
                    _ => 0,
                });
            }

            info!("Health metrics task stopped");
        });
        self.background_tasks.lock().await.push(health_metrics_task);

        info!("Background maintenance tasks started");
    }

    async fn stop_background_tasks(&self) {
        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        let task_count = tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for task in tasks {
            task.abort();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("✅ All {} background tasks stopped", task_count);
    }

    /// Current detailed health, logged at debug level
    pub async fn health_report(self: &Arc<Self>) -> anyhow::Result<HealthCheck> {
        let health = HealthCheck::check(self.clone()).await?;
        debug!("Health: {}", health.status);
        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::GuildMember;

    #[tokio::test]
    async fn test_app_state_wires_command_handler() {
        let app_state = AppState::new(AppConfig::default()).await.unwrap();
        assert!(!app_state.is_running().await);

        let alice = GuildMember {
            id: 1,
            username: "alice".to_string(),
            nickname: None,
            administrator: false,
        };
        let reply = app_state
            .command_handler()
            .handle(1, &alice, "create ctf 3 -novoice")
            .await
            .unwrap();
        assert!(!reply.is_rejected());
        assert_eq!(app_state.queue_store().len(), 1);
        assert!(!app_state.platform().published(1).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.pickup.default_team_size = 0;

        let result = AppState::new(config).await;
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_health_report() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).await.unwrap());
        app_state.mark_running(true).await;

        let health = app_state.health_report().await.unwrap();
        assert_eq!(health.service, "pickup-room");
    }
}
