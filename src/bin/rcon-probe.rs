//! RCON Probe CLI Tool
//!
//! Talks to a game server the way the pickup service does, for checking
//! passwords and addresses before configuring them.
//!
//! Usage:
//!   cargo run --bin rcon-probe -- --host ra3.se --port 27960 --password secret status
//!   cargo run --bin rcon-probe -- --host ra3.se --password secret dumpuser Grunt
//!   cargo run --bin rcon-probe -- --host ra3.se --password secret say "Red Team: alpha"
//!   cargo run --bin rcon-probe -- --host ra3.se --password secret raw "map q3dm17"

use anyhow::Result;
use clap::{Parser, Subcommand};
use pickup_room::config::RconSettings;
use pickup_room::rcon::protocol::say_command;
use pickup_room::rcon::{parse_client_info, parse_status, ServerControl, UdpRconClient};

#[derive(Parser)]
#[command(name = "rcon-probe")]
#[command(about = "Send RCON commands to a Quake 3 style game server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Game server host name or address
    #[arg(long)]
    host: String,

    /// Game server port
    #[arg(long, default_value_t = 27960)]
    port: u16,

    /// RCON password
    #[arg(long)]
    password: String,

    /// Round-trip timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the map and the player table
    Status,
    /// Show the userinfo of one player
    Dumpuser {
        /// Player name or client number
        player: String,
    },
    /// Print a message on the server (no reply is awaited)
    Say {
        message: String,
    },
    /// Send any command and print the sanitized reply
    Raw {
        command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = RconSettings {
        timeout_ms: cli.timeout_ms,
        ..RconSettings::default()
    };
    let client = UdpRconClient::new(&settings);

    println!("🎯 {}:{}", cli.host, cli.port);

    match cli.command {
        Commands::Status => {
            let reply = client
                .send_command("status", &cli.host, &cli.password, cli.port, false)
                .await?;
            let status = parse_status(&reply);

            println!("Map: {}", status.map.as_deref().unwrap_or("unknown"));
            if status.players.is_empty() {
                println!("No players");
            }
            for player in &status.players {
                println!(
                    "  #{:<3} {:<20} score {:>4}  ping {:>4}  {}",
                    player.client_id, player.clean_name, player.score, player.ping, player.address
                );
            }
        }
        Commands::Dumpuser { player } => {
            let reply = client
                .send_command(
                    &format!("dumpuser {}", player),
                    &cli.host,
                    &cli.password,
                    cli.port,
                    false,
                )
                .await?;
            let info = parse_client_info(&reply);
            if info.is_empty() {
                println!("❌ No userinfo in reply:\n{}", reply);
            } else {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
        }
        Commands::Say { message } => {
            client
                .send_command(
                    &say_command(&message),
                    &cli.host,
                    &cli.password,
                    cli.port,
                    true,
                )
                .await?;
            println!("✅ Sent");
        }
        Commands::Raw { command } => {
            let reply = client
                .send_command(&command, &cli.host, &cli.password, cli.port, false)
                .await?;
            println!("{}", reply);
        }
    }

    Ok(())
}
