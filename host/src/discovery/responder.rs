use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use common::{DiscoveryAnnounce, DiscoveryConfig, DiscoveryReply, Result, SessionConfig};
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::host::HostEvent;

/// Answers robot announce datagrams with the session endpoint URL.
pub struct DiscoveryResponder {
    socket: Arc<UdpSocket>,
    max_packet_size: usize,
    stop_grace: Duration,
    session_port: u16,
    session_path: String,
    events: mpsc::Sender<HostEvent>,
}

impl DiscoveryResponder {
    pub async fn bind(
        config: &DiscoveryConfig,
        session: &SessionConfig,
        events: mpsc::Sender<HostEvent>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        info!("Discovery responder bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            max_packet_size: config.max_packet_size,
            stop_grace: config.stop_grace,
            session_port: session.port,
            session_path: session.path.clone(),
            events,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Starts the receive loop on its own task.
    pub fn spawn(self) -> Result<DiscoveryHandle> {
        let local_addr = self.local_addr()?;
        let cancel = CancellationToken::new();
        let grace = self.stop_grace;
        let task = tokio::spawn(self.receive_loop(cancel.clone()));
        Ok(DiscoveryHandle {
            cancel,
            task,
            local_addr,
            grace,
        })
    }

    async fn receive_loop(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; self.max_packet_size];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                    Err(e) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        // ICMP port-unreachable from an earlier reply surfaces here on some platforms.
                        warn!("Discovery receive error: {}", e);
                    }
                },
            }
        }
        debug!("Discovery receive loop exited");
    }

    async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) {
        let Some(announce) = DiscoveryAnnounce::parse(payload) else {
            debug!("Ignoring {} byte datagram from {}", payload.len(), peer);
            return;
        };
        debug!("Announce from {} at {}", announce.robot_id, peer);

        let reply = DiscoveryReply {
            ws: self.endpoint_url(peer),
        };
        let robot_id = announce.robot_id.clone();

        let announced = HostEvent::RobotAnnounced {
            robot_id: announce.robot_id,
            callsign: announce.callsign,
            peer,
        };
        if self.events.send(announced).await.is_err() {
            return;
        }

        match serde_json::to_vec(&reply) {
            Ok(data) => match self.socket.send_to(&data, peer).await {
                Ok(_) => info!("Told {} at {} to connect to {}", robot_id, peer, reply.ws),
                Err(e) => warn!("Discovery reply to {} failed: {}", peer, e),
            },
            Err(e) => warn!("Failed to encode discovery reply: {}", e),
        }
    }

    fn endpoint_url(&self, peer: SocketAddr) -> String {
        let local = self.socket.local_addr().ok();
        let host = reply_host(local, peer);
        endpoint_url(host, self.session_port, &self.session_path)
    }
}

/// Running responder. Dropping it leaves the task running; call [`DiscoveryHandle::stop`].
pub struct DiscoveryHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
    grace: Duration,
}

impl DiscoveryHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Unblocks the pending receive and joins the task, aborting it after the grace period.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(_) => info!("Discovery responder stopped"),
            Err(_) => {
                warn!("Discovery responder did not stop within {:?}, aborting", self.grace);
                self.task.abort();
            }
        }
    }
}

pub(crate) fn endpoint_url(host: IpAddr, port: u16, path: &str) -> String {
    format!("ws://{}{}", SocketAddr::new(host, port), path)
}

/// Address a robot at `peer` should use to reach this host.
///
/// A socket bound to a concrete address answers with that address. A wildcard
/// bind asks the routing table which local interface faces the peer.
pub(crate) fn reply_host(local: Option<SocketAddr>, peer: SocketAddr) -> IpAddr {
    if let Some(local) = local {
        if !local.ip().is_unspecified() {
            return local.ip();
        }
    }
    route_to(peer).unwrap_or(match peer {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
    })
}

fn route_to(peer: SocketAddr) -> Option<IpAddr> {
    let any: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let probe = std::net::UdpSocket::bind(any).ok()?;
    probe.connect(peer).ok()?;
    let ip = probe.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
