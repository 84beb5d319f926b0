use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use crate::error::{FleetError, Result};

/// Everything the host needs to start, with defaults that match the robot firmware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub session: SessionConfig,
    pub scan: ScanConfig,
    /// Bind address of the HTTP control API
    pub http_bind: String,
    /// Phase the host starts in (`main_menu`, `lobby`, `playing`, `ended`)
    pub initial_phase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub max_packet_size: usize,
    /// How long `stop` waits for the receive task before aborting it
    pub stop_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub bind_host: String,
    pub port: u16,
    pub path: String,
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub board_role: String,
    pub tank_role: String,
    /// Role that receives drive and turret passthrough commands
    pub drive_role: String,
    pub ack_timeout: Duration,
    pub emit_timeout: Duration,
    pub result_timeout: Duration,
    /// Period of the host loop's scan step while a scan is running
    pub tick: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 30560,
            max_packet_size: 1024,
            stop_grace: Duration::from_millis(200),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            path: "/esp32".to_string(),
            heartbeat_timeout: Duration::from_secs(6),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            board_role: "test_board".to_string(),
            tank_role: "robot_tank".to_string(),
            drive_role: "robot_tank".to_string(),
            ack_timeout: Duration::from_millis(1000),
            emit_timeout: Duration::from_millis(500),
            result_timeout: Duration::from_millis(1800),
            tick: Duration::from_millis(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            session: SessionConfig::default(),
            scan: ScanConfig::default(),
            http_bind: "0.0.0.0:8090".to_string(),
            initial_phase: "main_menu".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Config {
    /// Defaults overridden by `FLEET_*` environment variables.
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            discovery: DiscoveryConfig {
                port: env_or("FLEET_DISCOVERY_PORT", defaults.discovery.port)?,
                max_packet_size: env_or("FLEET_DISCOVERY_MAX_PACKET", defaults.discovery.max_packet_size)?,
                stop_grace: env_millis("FLEET_DISCOVERY_STOP_GRACE_MS", defaults.discovery.stop_grace)?,
            },
            session: SessionConfig {
                bind_host: env_or("FLEET_SESSION_HOST", defaults.session.bind_host)?,
                port: env_or("FLEET_SESSION_PORT", defaults.session.port)?,
                path: env_or("FLEET_SESSION_PATH", defaults.session.path)?,
                heartbeat_timeout: env_millis("FLEET_HEARTBEAT_TIMEOUT_MS", defaults.session.heartbeat_timeout)?,
                sweep_interval: env_interval("FLEET_SWEEP_INTERVAL_MS", defaults.session.sweep_interval)?,
            },
            scan: ScanConfig {
                board_role: env_or("FLEET_BOARD_ROLE", defaults.scan.board_role)?,
                tank_role: env_or("FLEET_TANK_ROLE", defaults.scan.tank_role)?,
                drive_role: env_or("FLEET_DRIVE_ROLE", defaults.scan.drive_role)?,
                ack_timeout: env_millis("FLEET_ACK_TIMEOUT_MS", defaults.scan.ack_timeout)?,
                emit_timeout: env_millis("FLEET_EMIT_TIMEOUT_MS", defaults.scan.emit_timeout)?,
                result_timeout: env_millis("FLEET_RESULT_TIMEOUT_MS", defaults.scan.result_timeout)?,
                tick: env_interval("FLEET_SCAN_TICK_MS", defaults.scan.tick)?,
            },
            http_bind: env_or("FLEET_HTTP_BIND", defaults.http_bind)?,
            initial_phase: env_or("FLEET_INITIAL_PHASE", defaults.initial_phase)?,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FleetError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    let millis = env_or(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

/// Like [`env_millis`], for timer periods, which must be non-zero.
fn env_interval(key: &str, default: Duration) -> Result<Duration> {
    let period = env_millis(key, default)?;
    if period.is_zero() {
        return Err(FleetError::ConfigError(format!("{} must be greater than zero", key)));
    }
    Ok(period)
}
