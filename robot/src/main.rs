//! Simulated robot for exercising the fleet host without hardware

use chrono::Local;
use clap::Parser;
use common::Result;
use env_logger::fmt::Color;
use env_logger::Builder;
use log::{info, LevelFilter};
use robot_sim::config::default_robot_id;
use robot_sim::{RobotConfig, RobotKind, RobotSim};
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn setup_logger() {
    let mut builder = Builder::from_default_env();

    builder
        .format(|buf, record| {
            let mut timestamp_style = buf.style();
            let mut level_style = buf.style();
            let mut message_style = buf.style();

            let level_color = match record.level() {
                log::Level::Error => Color::Red,
                log::Level::Warn => Color::Yellow,
                log::Level::Info => Color::Green,
                log::Level::Debug => Color::Cyan,
                log::Level::Trace => Color::White,
            };

            let timestamp = Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "{} {} {}",
                timestamp_style.set_color(Color::Rgb(100, 100, 100)).value(timestamp),
                level_style.set_color(level_color).value(record.level()),
                message_style.set_color(Color::White).value(record.args())
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
}

#[derive(Parser)]
#[command(about = "Simulated board or tank robot")]
struct Args {
    #[arg(long, value_enum, default_value = "tank")]
    kind: RobotKind,

    /// Robot id; defaults to this machine's MAC address
    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    callsign: Option<String>,

    /// Announce destination
    #[arg(long, default_value = "255.255.255.255:30560")]
    discovery: SocketAddr,

    /// Connect straight to this session URL instead of discovering
    #[arg(long)]
    url: Option<String>,

    /// Bearing of the simulated source in degrees (boards only)
    #[arg(long, default_value_t = 90.0)]
    bearing: f64,

    /// Probability of missing a hit (boards only)
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,

    #[arg(long, default_value_t = 2000)]
    heartbeat_ms: u64,

    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger();
    let args = Args::parse();

    let mut config = RobotConfig::new(args.id.unwrap_or_else(default_robot_id), args.kind);
    config.callsign = args.callsign;
    config.discovery_addr = args.discovery;
    config.endpoint = args.url;
    config.source_bearing = args.bearing;
    config.dropout = args.dropout;
    config.heartbeat_interval = Duration::from_millis(args.heartbeat_ms);
    config.seed = args.seed;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, disconnecting");
            ctrl_c.cancel();
        }
    });

    RobotSim::new(config).run(shutdown).await
}
