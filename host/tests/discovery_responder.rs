use common::{DiscoveryConfig, DiscoveryReply, Result, SessionConfig};
use fleet_host::discovery::DiscoveryResponder;
use fleet_host::HostEvent;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn start_responder() -> Result<(fleet_host::discovery::DiscoveryHandle, mpsc::Receiver<HostEvent>)> {
    let (tx, rx) = mpsc::channel(16);
    let discovery = DiscoveryConfig {
        port: 0,
        ..Default::default()
    };
    let session = SessionConfig {
        port: 8123,
        ..Default::default()
    };
    let responder = DiscoveryResponder::bind(&discovery, &session, tx).await?;
    Ok((responder.spawn()?, rx))
}

async fn announce(port: u16, payload: &[u8]) -> Result<UdpSocket> {
    let robot = UdpSocket::bind("127.0.0.1:0").await?;
    robot.send_to(payload, ("127.0.0.1", port)).await?;
    Ok(robot)
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_announce_gets_unicast_reply_and_event() -> Result<()> {
        let (handle, mut events) = start_responder().await?;
        let port = handle.local_addr().port();

        let robot = announce(port, br#"{"robotId":"AA:BB:CC","callsign":"Scout"}"#).await?;
        let mut buf = [0u8; 256];
        let (len, from) = timeout(Duration::from_secs(2), robot.recv_from(&mut buf))
            .await
            .expect("no discovery reply")?;
        assert_eq!(from.port(), port);

        let reply: DiscoveryReply = serde_json::from_slice(&buf[..len])?;
        assert_eq!(reply.ws, "ws://127.0.0.1:8123/esp32");

        match timeout(Duration::from_secs(1), events.recv()).await.expect("no event") {
            Some(HostEvent::RobotAnnounced { robot_id, callsign, peer }) => {
                assert_eq!(robot_id, "AA:BB:CC");
                assert_eq!(callsign.as_deref(), Some("Scout"));
                assert_eq!(peer, robot.local_addr()?);
            }
            _ => panic!("expected a RobotAnnounced event"),
        }

        handle.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_noise_is_ignored() -> Result<()> {
        let (handle, mut events) = start_responder().await?;
        let port = handle.local_addr().port();

        let noise: [&[u8]; 3] = [b"not json", br#"{"robotId":"   "}"#, br#"{"callsign":"x"}"#];
        for payload in noise {
            let robot = announce(port, payload).await?;
            let mut buf = [0u8; 256];
            let reply = timeout(Duration::from_millis(200), robot.recv_from(&mut buf)).await;
            assert!(reply.is_err(), "unexpected reply to {:?}", String::from_utf8_lossy(payload));
        }
        assert!(events.try_recv().is_err());

        // Still answering afterwards.
        let robot = announce(port, br#"{"robotId":"bot-1"}"#).await?;
        let mut buf = [0u8; 256];
        timeout(Duration::from_secs(2), robot.recv_from(&mut buf))
            .await
            .expect("responder stopped answering")?;

        handle.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_releases_port() -> Result<()> {
        let (handle, _events) = start_responder().await?;
        let port = handle.local_addr().port();

        timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stop took too long");

        let rebound = UdpSocket::bind(("0.0.0.0", port)).await;
        assert!(rebound.is_ok());
        Ok(())
    }
}
