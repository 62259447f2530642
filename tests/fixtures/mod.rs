//! Test fixtures shared by the integration tests
//!
//! Provides a complete queue system wired to in-memory adapters and a fake
//! game server that answers RCON datagrams on the loopback interface.

#![allow(dead_code)]

use pickup_room::config::{PickupSettings, RconSettings};
use pickup_room::metrics::MetricsCollector;
use pickup_room::platform::{GuildMember, InMemoryModeration, RecordingChatPlatform};
use pickup_room::queue::QueueManager;
use pickup_room::rcon::protocol::OOB_PREFIX;
use pickup_room::rcon::{GameServerLink, StaticSecretsStore, UdpRconClient};
use pickup_room::scheduler::AnnouncementScheduler;
use pickup_room::session::SessionController;
use pickup_room::store::InMemoryQueueStore;
use pickup_room::types::{GuildId, Subscriber};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

pub const GUILD: GuildId = 42;

pub const STATUS_REPLY: &str = "map: q3dm17\n\
num score ping name            address               rate\n\
--- ----- ---- --------------- --------------------- -----\n\
  0     5   20 ^1Red^7Grunt    10.0.0.1:27960        25000\n\
  1    -2   48 Sarge           10.0.0.2:27960        25000\n";

pub const DUMPUSER_REPLY: &str = "userinfo\n--------\n\
name                ^1Red^7Grunt\n\
rate                25000\n\
snaps               40\n\
DiscordId           1001\n";

/// Queue manager plus handles on every adapter it talks to
pub struct TestSystem {
    pub manager: QueueManager,
    pub store: Arc<InMemoryQueueStore>,
    pub platform: Arc<RecordingChatPlatform>,
    pub moderation: Arc<InMemoryModeration>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub fn new(settings: PickupSettings) -> Self {
        Self::build(settings, None)
    }

    /// A system whose queues can reach `server` with `password`
    pub fn with_game_server(
        settings: PickupSettings,
        server: &FakeGameServer,
        password: &str,
        delays: Vec<Duration>,
    ) -> Self {
        Self::build(settings, Some((server.addr, password.to_string(), delays)))
    }

    fn build(settings: PickupSettings, server: Option<(SocketAddr, String, Vec<Duration>)>) -> Self {
        let store = Arc::new(InMemoryQueueStore::new());
        let platform = Arc::new(RecordingChatPlatform::new());
        let moderation = Arc::new(InMemoryModeration::new());
        let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));

        let mut session = SessionController::new(platform.clone(), settings.voice_category.clone());
        let mut manager = QueueManager::new(
            store.clone(),
            platform.clone(),
            moderation.clone(),
            settings,
        )
        .with_metrics(metrics.clone());

        if let Some((addr, password, delays)) = server {
            let link = game_server_link(addr, &password).with_metrics(metrics.clone());
            let scheduler = AnnouncementScheduler::new(link.clone(), delays)
                .with_metrics(metrics.clone());
            session = session.with_scheduler(Arc::new(scheduler));
            manager = manager.with_server_link(link);
        }

        Self {
            manager: manager.with_session(Arc::new(session)),
            store,
            platform,
            moderation,
            metrics,
        }
    }
}

/// A link that talks UDP to `addr` with a short timeout
pub fn game_server_link(addr: SocketAddr, password: &str) -> GameServerLink {
    let settings = RconSettings {
        timeout_ms: 500,
        ..RconSettings::default()
    };
    let mut secrets = StaticSecretsStore::new(HashMap::new());
    secrets.insert(&addr.ip().to_string(), addr.port(), password);

    GameServerLink::new(Arc::new(UdpRconClient::new(&settings)), Arc::new(secrets))
}

pub fn subscriber(id: u64) -> Subscriber {
    Subscriber::new(id, format!("player{}", id))
}

pub fn member(id: u64, name: &str) -> GuildMember {
    GuildMember {
        id,
        username: name.to_string(),
        nickname: None,
        administrator: false,
    }
}

pub fn admin(id: u64, name: &str) -> GuildMember {
    GuildMember {
        administrator: true,
        ..member(id, name)
    }
}

/// Operators that point a queue at the fake server
pub fn server_operators(server: &FakeGameServer) -> String {
    format!(
        "-rcon -novoice -host:{} -port:{}",
        server.addr.ip(),
        server.addr.port()
    )
}

/// Minimal Quake 3 style server answering `status`, `dumpuser` and `say`
pub struct FakeGameServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeGameServer {
    pub async fn start(password: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake game server");
        let addr = socket.local_addr().expect("Fake game server has no address");
        let received = Arc::new(Mutex::new(Vec::new()));

        let password = password.to_string();
        let log = received.clone();
        let handle = tokio::spawn(async move {
            let mut buffer = vec![0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buffer).await else {
                    break;
                };
                let Some((given, command)) = parse_request(&buffer[..len]) else {
                    continue;
                };
                log.lock().unwrap().push(command.clone());

                let reply = if given != password {
                    Some("Bad rconpassword.\n".to_string())
                } else if command == "status" {
                    Some(STATUS_REPLY.to_string())
                } else if command.starts_with("dumpuser ") {
                    Some(DUMPUSER_REPLY.to_string())
                } else if command.starts_with("say ") {
                    None
                } else {
                    Some(format!("Unknown command: {}\n", command))
                };

                if let Some(text) = reply {
                    let mut datagram = OOB_PREFIX.to_vec();
                    datagram.extend_from_slice(b"print\n");
                    datagram.extend_from_slice(text.as_bytes());
                    let _ = socket.send_to(&datagram, peer).await;
                }
            }
        });

        Self {
            addr,
            received,
            handle,
        }
    }

    /// Commands received so far, password stripped
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn said(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|c| c.starts_with("say "))
            .collect()
    }
}

impl Drop for FakeGameServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn parse_request(datagram: &[u8]) -> Option<(String, String)> {
    let body = datagram.strip_prefix(&OOB_PREFIX[..])?;
    let text = String::from_utf8_lossy(body);
    let rest = text.strip_prefix("rcon ")?;
    let (password, command) = rest.split_once(' ')?;
    Some((password.to_string(), command.trim_end().to_string()))
}
