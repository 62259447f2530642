//! UDP control client

use crate::config::RconSettings;
use crate::error::{PickupError, Result};
use crate::rcon::protocol::{frame_command, sanitize_response};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Sends one command to a game server and returns its printable reply
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// With `fire_and_forget` set the call returns as soon as the datagram is
    /// sent and the reply is an empty string.
    async fn send_command(
        &self,
        command: &str,
        host: &str,
        password: &str,
        port: u16,
        fire_and_forget: bool,
    ) -> Result<String>;
}

/// Control client speaking the out-of-band protocol over UDP
///
/// Every call opens its own socket and waits for a single reply datagram.
/// Nothing is retried.
#[derive(Debug, Clone)]
pub struct UdpRconClient {
    timeout: Duration,
    buffer_size: usize,
    redaction_marker: String,
}

impl UdpRconClient {
    pub fn new(settings: &RconSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            buffer_size: settings.buffer_size.max(1),
            redaction_marker: settings.redaction_marker.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn exchange(
        &self,
        datagram: &[u8],
        host: &str,
        port: u16,
        fire_and_forget: bool,
    ) -> std::io::Result<Option<Vec<u8>>> {
        let bind_addr = if host.contains(':') { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect((host, port)).await?;
        socket.send(datagram).await?;

        if fire_and_forget {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.buffer_size];
        let received = socket.recv(&mut buffer).await?;
        buffer.truncate(received);
        Ok(Some(buffer))
    }
}

#[async_trait]
impl ServerControl for UdpRconClient {
    async fn send_command(
        &self,
        command: &str,
        host: &str,
        password: &str,
        port: u16,
        fire_and_forget: bool,
    ) -> Result<String> {
        let address = format!("{}:{}", host, port);
        let datagram = frame_command(password, command);
        debug!(
            "Sending rcon command '{}' to {} ({} bytes)",
            command.split_whitespace().next().unwrap_or(""),
            address,
            datagram.len()
        );

        let reply = tokio::time::timeout(
            self.timeout,
            self.exchange(&datagram, host, port, fire_and_forget),
        )
        .await
        .map_err(|_| PickupError::RconUnreachable {
            address: address.clone(),
            message: format!("no reply within {}ms", self.timeout.as_millis()),
        })?
        .map_err(|e| PickupError::RconUnreachable {
            address: address.clone(),
            message: e.to_string(),
        })?;

        let Some(bytes) = reply else {
            return Ok(String::new());
        };

        if bytes.is_empty() {
            return Err(PickupError::RconMalformedResponse {
                reason: format!("empty reply from {}", address),
            }
            .into());
        }

        Ok(sanitize_response(&bytes, password, &self.redaction_marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::pickup_error;

    fn settings(timeout_ms: u64) -> RconSettings {
        RconSettings {
            timeout_ms,
            ..RconSettings::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip_against_loopback_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let responder = tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let (len, peer) = server.recv_from(&mut buffer).await.unwrap();
            let request = buffer[..len].to_vec();

            let mut reply = vec![0xFF; 4];
            reply.extend_from_slice(b"print\nmap: q3dm6\nrcon hunter2 ok\0");
            server.send_to(&reply, peer).await.unwrap();
            request
        });

        let client = UdpRconClient::new(&settings(1000));
        let reply = client
            .send_command("status", "127.0.0.1", "hunter2", port, false)
            .await
            .unwrap();

        assert_eq!(reply, "map: q3dm6\nrcon [REDACTED] ok");
        let request = responder.await.unwrap();
        assert_eq!(&request[4..], b"rcon hunter2 status\n\n");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let client = UdpRconClient::new(&settings(50));
        let err = client
            .send_command("status", "127.0.0.1", "pw", port, false)
            .await
            .unwrap_err();

        assert!(matches!(
            pickup_error(&err),
            Some(PickupError::RconUnreachable { .. })
        ));
        drop(server);
    }

    #[tokio::test]
    async fn test_fire_and_forget_does_not_wait() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let client = UdpRconClient::new(&settings(50));
        let reply = client
            .send_command("say \"hi\"", "127.0.0.1", "pw", port, true)
            .await
            .unwrap();
        assert!(reply.is_empty());

        let mut buffer = [0u8; 64];
        let (len, _) = server.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[4..len], b"rcon pw say \"hi\"\n\n");
    }
}
