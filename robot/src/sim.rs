use std::net::{Ipv4Addr, SocketAddr};
use common::{DiscoveryAnnounce, DiscoveryReply, HostCommand, Result, RobotMessage};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use crate::config::RobotConfig;
use crate::responder::Responder;

pub struct RobotSim {
    config: RobotConfig,
    responder: Responder,
}

impl RobotSim {
    pub fn new(config: RobotConfig) -> Self {
        let responder = Responder::new(&config);
        Self { config, responder }
    }

    /// Discovers the host, holds a session, and reconnects until `shutdown`.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Robot {} starting as {:?} (role {})",
            self.config.robot_id,
            self.config.kind,
            self.config.kind.role().unwrap_or("none")
        );

        while !shutdown.is_cancelled() {
            let url = match self.config.endpoint.clone() {
                Some(url) => url,
                None => match self.discover(&shutdown).await? {
                    Some(url) => url,
                    None => break,
                },
            };

            match self.run_session(&url, &shutdown).await {
                Ok(()) => info!("Session with {} ended", url),
                Err(e) => warn!("Session with {} failed: {}", url, e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.reconnect_delay) => {}
            }
        }
        info!("Robot {} stopped", self.config.robot_id);
        Ok(())
    }

    /// Announces until a host replies. Returns `None` if cancelled first.
    pub async fn discover(&self, shutdown: &CancellationToken) -> Result<Option<String>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let announce = DiscoveryAnnounce {
            robot_id: self.config.robot_id.clone(),
            callsign: self.config.callsign.clone(),
        };
        let payload = serde_json::to_vec(&announce)?;
        let mut buffer = vec![0u8; 1024];

        info!("Looking for the host via {}", self.config.discovery_addr);
        loop {
            if let Err(e) = socket.send_to(&payload, self.config.discovery_addr).await {
                warn!("Announce to {} failed: {}", self.config.discovery_addr, e);
            }

            let received = tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                received = timeout(self.config.announce_interval, socket.recv_from(&mut buffer)) => received,
            };
            match received {
                Ok(Ok((len, from))) => match parse_reply(&buffer[..len], from) {
                    Some(url) => {
                        info!("Host at {} says connect to {}", from, url);
                        return Ok(Some(url));
                    }
                    None => debug!("Ignoring {} bytes from {}", len, from),
                },
                Ok(Err(e)) => error!("Discovery receive error: {}", e),
                Err(_) => debug!("No reply within {:?}", self.config.announce_interval),
            }
        }
    }

    /// One session: hello, periodic heartbeats, and command replies.
    pub async fn run_session(&mut self, url: &str, shutdown: &CancellationToken) -> Result<()> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut source) = ws.split();
        info!("Connected to {}", url);

        let hello = RobotMessage::Hello {
            id: self.config.robot_id.clone(),
            role: self.config.kind.role().map(str::to_string),
        };
        sink.send(Message::text(hello.encode()?)).await?;

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let hb = RobotMessage::Hb.encode()?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.close().await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    sink.send(Message::text(hb.clone())).await?;
                }
                inbound = source.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let command = match HostCommand::decode(text.as_str()) {
                            Ok(command) => command,
                            Err(e) => {
                                warn!("Unreadable command {:?}: {}", text.as_str(), e);
                                continue;
                            }
                        };
                        debug!("Received {:?}", command);
                        for reply in self.responder.respond(&command) {
                            sink.send(Message::text(reply.encode()?)).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}

fn parse_reply(payload: &[u8], from: SocketAddr) -> Option<String> {
    let reply: DiscoveryReply = serde_json::from_slice(payload).ok()?;
    if reply.ws.starts_with("ws://") || reply.ws.starts_with("wss://") {
        Some(reply.ws)
    } else {
        warn!("Reply from {} has no usable endpoint: {:?}", from, reply.ws);
        None
    }
}
