//! Main entry point for the pickup-room service
//!
//! Loads the configuration, starts the queue engine with its health
//! endpoints and, in console mode, reads commands from standard input.

use anyhow::Result;
use clap::Parser;
use pickup_room::config::AppConfig;
use pickup_room::platform::GuildMember;
use pickup_room::service::{AppState, HealthCheck, HealthStatus};
use pickup_room::types::GuildId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

/// Pickup Room - pickup queues, team formation and game-server control
#[derive(Parser)]
#[command(
    name = "pickup-room",
    version,
    about = "Pickup queue matchmaking service for game communities",
    long_about = "Pickup Room keeps named queues per guild, forms teams once a queue \
                 fills, allocates voice channels and announces the rosters on the \
                 game server over RCON."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    #[arg(long, help = "Start games as soon as a queue fills")]
    auto_start: bool,

    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,

    #[arg(
        long,
        help = "Read commands from stdin as '<user id> <name> <command...>'"
    )]
    console: bool,

    #[arg(long, default_value_t = 1, help = "Guild the console commands run in")]
    guild: GuildId,

    #[arg(
        long,
        value_delimiter = ',',
        help = "User ids treated as guild administrators in console mode"
    )]
    admins: Vec<u64>,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Check a freshly built service and exit with its status
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = Arc::new(AppState::new(config).await?);
    app_state.mark_running(true).await;

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            for check in &health.checks {
                println!(
                    "  {}: {}{}",
                    check.name,
                    check.status,
                    check
                        .message
                        .as_ref()
                        .map(|m| format!(" ({})", m))
                        .unwrap_or_default()
                );
            }

            if health.status == HealthStatus::Unhealthy {
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C) signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Run console commands until the input closes
///
/// Each line is `<user id> <name> <command...>`. Replies and the notices the
/// command produced are printed to stdout.
async fn run_console<R>(app_state: Arc<AppState>, input: R, guild_id: GuildId, admins: Vec<u64>)
where
    R: AsyncBufRead + Unpin,
{
    let handler = app_state.command_handler();
    let platform = app_state.platform();
    let mut lines = LinesStream::new(input.lines());

    println!("Console ready: '<user id> <name> <command...>' per line");
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut parts = line.trim().splitn(3, char::is_whitespace);
        let (Some(id), Some(name), Some(command)) = (parts.next(), parts.next(), parts.next())
        else {
            println!("usage: <user id> <name> <command...>");
            continue;
        };
        let Ok(id) = id.parse::<u64>() else {
            println!("'{}' is not a user id", id);
            continue;
        };

        let member = GuildMember {
            id,
            username: name.to_string(),
            nickname: None,
            administrator: admins.contains(&id),
        };

        platform.clear_history();
        match handler.handle(guild_id, &member, command).await {
            Ok(reply) => println!("{}", reply.text()),
            Err(e) => println!("error: {}", e),
        }
        for event in platform.published(guild_id) {
            match serde_json::to_string(&event) {
                Ok(json) => println!("  notice: {}", json),
                Err(e) => warn!("Failed to serialize notice: {}", e),
            }
        }
    }
    info!("Console input closed");
}

fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Pickup Room Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   Default team size: {}", config.pickup.default_team_size);
    info!("   Auto start: {}", config.pickup.auto_start_when_full);
    info!("   Game servers: {}", config.rcon.passwords.len());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(config_path) => AppConfig::from_file(config_path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }
    if args.auto_start {
        config.pickup.auto_start_when_full = true;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Pickup Room Service is running");
    if args.console {
        let console = run_console(
            app_state.clone(),
            BufReader::new(tokio::io::stdin()),
            args.guild,
            args.admins.clone(),
        );
        tokio::select! {
            _ = console => {},
            _ = wait_for_shutdown_signal() => {},
        }
    } else {
        info!("Press Ctrl+C to shutdown gracefully...");
        wait_for_shutdown_signal().await;
    }

    info!("🛑 Beginning graceful shutdown...");
    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with an error: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Pickup Room Service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_lines_drive_the_command_handler() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).await.unwrap());
        let input: &[u8] = b"1 alice create ctf 1\n\
                             \n\
                             not-a-line\n\
                             x bob add ctf\n\
                             2 bob add ctf\n\
                             3 carol delete ctf\n";

        run_console(app_state.clone(), input, 7, vec![]).await;

        let queue = app_state
            .queue_manager()
            .get(7, "ctf")
            .await
            .unwrap()
            .expect("queue created from the console");
        assert_eq!(queue.subscribers().len(), 2);
        assert_eq!(queue.subscribers()[1].name, "bob");
    }

    #[tokio::test]
    async fn test_console_admins_may_delete_foreign_queues() {
        let app_state = Arc::new(AppState::new(AppConfig::default()).await.unwrap());
        let input: &[u8] = b"1 alice create ctf\n9 mod delete ctf\n";

        run_console(app_state.clone(), input, 7, vec![9]).await;

        assert!(app_state.queue_manager().get(7, "ctf").await.unwrap().is_none());
    }
}
