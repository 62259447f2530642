//! Health checks of the running service
//!
//! Readiness and liveness probes plus a detailed check that reports every
//! component and the queue statistics.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as the health status metric
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// The worse of two statuses
    fn worst(self, other: &HealthStatus) -> HealthStatus {
        if other.as_gauge() < self.as_gauge() {
            other.clone()
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Why the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Queue statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Queues currently stored, across all guilds
    pub active_queues: usize,
    pub queues_created: u64,
    pub queues_removed: u64,
    pub players_subscribed: u64,
    pub players_wait_listed: u64,
    pub promotions: u64,
    pub games_started: u64,
    pub games_stopped: u64,
    pub uptime_info: String,
}

impl HealthCheck {
    /// Check every component and gather statistics
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_queue_manager(&app_state).await,
            Self::check_game_server_link(&app_state),
        ];

        // A stopped service is unhealthy no matter what the components say
        let overall_status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(&check.status));

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// The service runs and its queue manager answers
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_queue_manager(&app_state).await.status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_queue_manager(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match app_state.queue_manager().get_stats().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Queue manager stats check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "queue_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Game servers are optional; without any password configured the
    /// control commands are unavailable and the service is degraded
    fn check_game_server_link(app_state: &AppState) -> ComponentCheck {
        let (status, message) = if app_state.config().rcon.passwords.is_empty() {
            (
                HealthStatus::Degraded,
                Some("No game server passwords configured".to_string()),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "game_server_link".to_string(),
            status,
            message,
            duration_ms: 0,
        }
    }

    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let active_queues = app_state.queue_store().len();

        match app_state.queue_manager().get_stats().await {
            Ok(stats) => ServiceStats {
                active_queues,
                queues_created: stats.queues_created,
                queues_removed: stats.queues_removed,
                players_subscribed: stats.players_subscribed,
                players_wait_listed: stats.players_wait_listed,
                promotions: stats.promotions,
                games_started: stats.games_started,
                games_stopped: stats.games_stopped,
                uptime_info: format!("Up {}s", app_state.uptime().as_secs()),
            },
            Err(e) => {
                debug!("Failed to get queue stats for health check: {}", e);
                ServiceStats {
                    active_queues,
                    uptime_info: "Service running".to_string(),
                    ..ServiceStats::default()
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
