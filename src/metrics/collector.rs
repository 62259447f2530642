//! Metrics collection using Prometheus
//!
//! Counters and histograms for queue activity, game-server traffic and
//! command handling, registered on a single registry.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the pickup service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    rcon_metrics: RconMetrics,
    command_metrics: CommandMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue lifecycle metrics
#[derive(Clone)]
pub struct QueueMetrics {
    pub queues_created_total: IntCounter,
    pub queues_removed_total: IntCounterVec,

    /// Joins by the list the user landed on
    pub subscriptions_total: IntCounterVec,

    /// Waiting users promoted into a freed spot
    pub promotions_total: IntCounter,

    pub games_started_total: IntCounterVec,
    pub games_stopped_total: IntCounter,

    /// Queue fill at start time, in percent
    pub readiness_at_start: Histogram,
}

/// Game-server control traffic
#[derive(Clone)]
pub struct RconMetrics {
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub announcements_total: IntCounterVec,
}

/// Command handling
#[derive(Clone)]
pub struct CommandMetrics {
    pub commands_total: IntCounterVec,
    pub command_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let rcon_metrics = RconMetrics::new(&registry)?;
        let command_metrics = CommandMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            rcon_metrics,
            command_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn rcon(&self) -> &RconMetrics {
        &self.rcon_metrics
    }

    pub fn commands(&self) -> &CommandMetrics {
        &self.command_metrics
    }

    pub fn record_queue_created(&self) {
        self.queue_metrics.queues_created_total.inc();
    }

    /// Record a queue going away; `reason` is `empty`, `deleted` or `stopped`
    pub fn record_queue_removed(&self, reason: &str) {
        self.queue_metrics
            .queues_removed_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a join landing on `subscribers` or `wait_list`
    pub fn record_subscription(&self, list: &str) {
        self.queue_metrics
            .subscriptions_total
            .with_label_values(&[list])
            .inc();
    }

    pub fn record_promotion(&self) {
        self.queue_metrics.promotions_total.inc();
    }

    pub fn record_game_started(&self, coop: bool, readiness: u8) {
        let mode = if coop { "coop" } else { "versus" };
        self.queue_metrics
            .games_started_total
            .with_label_values(&[mode])
            .inc();
        self.queue_metrics
            .readiness_at_start
            .observe(readiness as f64);
    }

    pub fn record_game_stopped(&self) {
        self.queue_metrics.games_stopped_total.inc();
    }

    /// Record one control-client exchange
    pub fn record_rcon_request(&self, command: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };
        self.rcon_metrics
            .requests_total
            .with_label_values(&[command, status])
            .inc();
        self.rcon_metrics
            .request_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    pub fn record_announcement(&self, success: bool) {
        let status = if success { "sent" } else { "failed" };
        self.rcon_metrics
            .announcements_total
            .with_label_values(&[status])
            .inc();
    }

    /// Record a handled command; `outcome` is `ok`, `rejected` or `error`
    pub fn record_command(&self, command: &str, outcome: &str, duration: Duration) {
        self.command_metrics
            .commands_total
            .with_label_values(&[command, outcome])
            .inc();
        self.command_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("pickup_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "pickup_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("pickup_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queues_created_total =
            IntCounter::new("pickup_room_queues_created_total", "Total queues created")?;
        registry.register(Box::new(queues_created_total.clone()))?;

        let queues_removed_total = IntCounterVec::new(
            Opts::new("pickup_room_queues_removed_total", "Total queues removed"),
            &["reason"],
        )?;
        registry.register(Box::new(queues_removed_total.clone()))?;

        let subscriptions_total = IntCounterVec::new(
            Opts::new(
                "pickup_room_subscriptions_total",
                "Users added to a queue, by list",
            ),
            &["list"],
        )?;
        registry.register(Box::new(subscriptions_total.clone()))?;

        let promotions_total = IntCounter::new(
            "pickup_room_wait_list_promotions_total",
            "Waiting users promoted into a queue",
        )?;
        registry.register(Box::new(promotions_total.clone()))?;

        let games_started_total = IntCounterVec::new(
            Opts::new("pickup_room_games_started_total", "Total games started"),
            &["mode"],
        )?;
        registry.register(Box::new(games_started_total.clone()))?;

        let games_stopped_total =
            IntCounter::new("pickup_room_games_stopped_total", "Total games stopped")?;
        registry.register(Box::new(games_stopped_total.clone()))?;

        let readiness_at_start = Histogram::with_opts(
            HistogramOpts::new(
                "pickup_room_readiness_at_start",
                "Queue readiness when a game starts",
            )
            .buckets(vec![25.0, 50.0, 75.0, 90.0, 100.0]),
        )?;
        registry.register(Box::new(readiness_at_start.clone()))?;

        Ok(Self {
            queues_created_total,
            queues_removed_total,
            subscriptions_total,
            promotions_total,
            games_started_total,
            games_stopped_total,
            readiness_at_start,
        })
    }
}

impl RconMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("pickup_room_rcon_requests_total", "Game server commands sent"),
            &["command", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_room_rcon_request_duration_seconds",
                "Game server round trip time",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 3.0]),
            &["command"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let announcements_total = IntCounterVec::new(
            Opts::new(
                "pickup_room_announcements_total",
                "Delayed in-game roster announcements",
            ),
            &["status"],
        )?;
        registry.register(Box::new(announcements_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
            announcements_total,
        })
    }
}

impl CommandMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let commands_total = IntCounterVec::new(
            Opts::new("pickup_room_commands_total", "Commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "pickup_room_command_duration_seconds",
                "Command handling time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        Ok(Self {
            commands_total,
            command_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _rcon = collector.rcon();
        let _commands = collector.commands();
    }

    #[test]
    fn test_queue_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_queue_created();
        collector.record_subscription("subscribers");
        collector.record_subscription("subscribers");
        collector.record_subscription("wait_list");
        collector.record_promotion();
        collector.record_game_started(false, 100);
        collector.record_queue_removed("stopped");

        let queue = collector.queue();
        assert_eq!(queue.queues_created_total.get(), 1);
        assert_eq!(
            queue
                .subscriptions_total
                .with_label_values(&["subscribers"])
                .get(),
            2
        );
        assert_eq!(queue.promotions_total.get(), 1);
        assert_eq!(
            queue.games_started_total.with_label_values(&["versus"]).get(),
            1
        );
    }

    #[test]
    fn test_rcon_and_command_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_rcon_request("status", false, Duration::from_millis(3));
        collector.record_announcement(true);
        collector.record_command("add", "ok", Duration::from_millis(1));

        assert_eq!(
            collector
                .rcon()
                .requests_total
                .with_label_values(&["status", "error"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .commands()
                .commands_total
                .with_label_values(&["add", "ok"])
                .get(),
            1
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
