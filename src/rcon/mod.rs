//! Game-server control
//!
//! [`GameServerLink`] combines the UDP client, the password lookup and the
//! reply parsers into the three commands the pickup service issues:
//! `status`, `dumpuser <name>` and `say "<message>"`.

pub mod client;
pub mod protocol;
pub mod secrets;
pub mod status;

pub use client::{ServerControl, UdpRconClient};
pub use secrets::{SecretsStore, StaticSecretsStore};
pub use status::{
    parse_client_info, parse_status, strip_color_codes, ClientInfo, ServerStatus, StatusPlayer,
};

use crate::error::{PickupError, Result};
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const REJECTED_PASSWORD_MARKERS: [&str; 2] = ["Bad rconpassword", "No rconpassword set"];

/// Issues pickup commands against game servers
#[derive(Clone)]
pub struct GameServerLink {
    control: Arc<dyn ServerControl>,
    secrets: Arc<dyn SecretsStore>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl GameServerLink {
    pub fn new(control: Arc<dyn ServerControl>, secrets: Arc<dyn SecretsStore>) -> Self {
        Self {
            control,
            secrets,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Map name and players currently on the server
    pub async fn status(&self, host: &str, port: u16) -> Result<ServerStatus> {
        let reply = self.request("status", host, port, false).await?;
        Ok(parse_status(&reply))
    }

    /// Userinfo of one player; fails when the server knows nothing about them
    pub async fn client_info(&self, host: &str, port: u16, player: &str) -> Result<ClientInfo> {
        let reply = self
            .request(&format!("dumpuser {}", player), host, port, false)
            .await?;
        let info = parse_client_info(&reply);
        if info.is_empty() {
            return Err(PickupError::RconMalformedResponse {
                reason: format!("no userinfo for '{}'", player),
            }
            .into());
        }
        Ok(info)
    }

    /// Print a chat line on the server without waiting for a reply
    pub async fn say(&self, host: &str, port: u16, message: &str) -> Result<()> {
        self.request(&protocol::say_command(message), host, port, true)
            .await
            .map(|_| ())
    }

    async fn request(
        &self,
        command: &str,
        host: &str,
        port: u16,
        fire_and_forget: bool,
    ) -> Result<String> {
        let password = self.secrets.rcon_password(host, port).await?.ok_or_else(|| {
            PickupError::ConfigurationError {
                message: format!("no rcon password configured for {}:{}", host, port),
            }
        })?;

        let label = command.split_whitespace().next().unwrap_or("unknown").to_string();
        let started = Instant::now();
        let result = self
            .control
            .send_command(command, host, &password, port, fire_and_forget)
            .await
            .and_then(|reply| check_reply(reply, host, port));

        if let Some(metrics) = &self.metrics {
            metrics.record_rcon_request(&label, result.is_ok(), started.elapsed());
        }
        match &result {
            Ok(reply) => debug!("rcon '{}' on {}:{} returned {} bytes", label, host, port, reply.len()),
            Err(e) => warn!("rcon '{}' on {}:{} failed: {}", label, host, port, e),
        }
        result
    }
}

fn check_reply(reply: String, host: &str, port: u16) -> Result<String> {
    if REJECTED_PASSWORD_MARKERS
        .iter()
        .any(|marker| reply.contains(marker))
    {
        return Err(PickupError::RconMalformedResponse {
            reason: format!("{}:{} rejected the rcon password", host, port),
        }
        .into());
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::pickup_error;
    use client::MockServerControl;
    use mockall::predicate::*;

    fn secrets() -> Arc<StaticSecretsStore> {
        let mut store = StaticSecretsStore::default();
        store.insert("ra3.se", 27960, "frag");
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_status_parses_reply() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .with(eq("status"), eq("ra3.se"), eq("frag"), eq(27960), eq(false))
            .times(1)
            .returning(|_, _, _, _, _| {
                Ok("map: q3dm17\n0 3 50 ^1Grunt 1.2.3.4:27960 25000\n".to_string())
            });

        let link = GameServerLink::new(Arc::new(control), secrets());
        let status = link.status("ra3.se", 27960).await.unwrap();

        assert_eq!(status.map.as_deref(), Some("q3dm17"));
        assert_eq!(status.players[0].clean_name, "Grunt");
    }

    #[tokio::test]
    async fn test_missing_password_is_configuration_error() {
        let control = MockServerControl::new();
        let link = GameServerLink::new(Arc::new(control), secrets());

        let err = link.status("unknown.host", 27960).await.unwrap_err();
        assert!(matches!(
            pickup_error(&err),
            Some(PickupError::ConfigurationError { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_password() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .returning(|_, _, _, _, _| Ok("Bad rconpassword.\n".to_string()));

        let link = GameServerLink::new(Arc::new(control), secrets());
        let err = link.status("ra3.se", 27960).await.unwrap_err();
        assert!(matches!(
            pickup_error(&err),
            Some(PickupError::RconMalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_client_info_for_unknown_player() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .with(eq("dumpuser ghost"), always(), always(), always(), eq(false))
            .returning(|_, _, _, _, _| Ok("Player ghost is not on the server\n".to_string()));

        let link = GameServerLink::new(Arc::new(control), secrets());
        assert!(link.client_info("ra3.se", 27960, "ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_say_is_fire_and_forget() {
        let mut control = MockServerControl::new();
        control
            .expect_send_command()
            .with(eq("say \"gl hf\""), always(), always(), always(), eq(true))
            .times(1)
            .returning(|_, _, _, _, _| Ok(String::new()));

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let link = GameServerLink::new(Arc::new(control), secrets()).with_metrics(metrics.clone());
        link.say("ra3.se", 27960, "gl hf").await.unwrap();

        assert_eq!(
            metrics
                .rcon()
                .requests_total
                .with_label_values(&["say", "success"])
                .get(),
            1
        );
    }
}
