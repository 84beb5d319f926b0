//! Main entry point for the robot fleet host

use actix_web::main as actix_main;
use chrono::Local;
use common::{Config, Result};
use env_logger::fmt::Color;
use env_logger::Builder;
use fleet_host::FleetServer;
use log::{info, LevelFilter};
use std::io::Write;
use tokio_util::sync::CancellationToken;

const BANNER: &str = r#"
╔═══════════════════════════════════════════════════════════════════╗
║                                                                   ║
║   ███████╗██╗     ███████╗███████╗████████╗                       ║
║   ██╔════╝██║     ██╔════╝██╔════╝╚══██╔══╝                       ║
║   █████╗  ██║     █████╗  █████╗     ██║                          ║
║   ██╔══╝  ██║     ██╔══╝  ██╔══╝     ██║                          ║
║   ██║     ███████╗███████╗███████╗   ██║                          ║
║   ╚═╝     ╚══════╝╚══════╝╚══════╝   ╚═╝                          ║
║                                                                   ║
║   Robot Fleet Host v0.1.0                                         ║
║                                                                   ║
╚═══════════════════════════════════════════════════════════════════╝
"#;

fn setup_logger() {
    let mut builder = Builder::from_default_env();

    builder
        .format(|buf, record| {
            let mut timestamp_style = buf.style();
            let mut level_style = buf.style();
            let mut target_style = buf.style();
            let mut message_style = buf.style();

            let level_color = match record.level() {
                log::Level::Error => Color::Red,
                log::Level::Warn => Color::Yellow,
                log::Level::Info => Color::Green,
                log::Level::Debug => Color::Cyan,
                log::Level::Trace => Color::White,
            };

            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "{} {} [{}] {}",
                timestamp_style.set_color(Color::Rgb(100, 100, 100)).value(timestamp),
                level_style.set_color(level_color).value(record.level()),
                target_style.set_color(Color::Blue).value(record.target()),
                message_style.set_color(Color::White).value(record.args())
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
}

#[actix_main]
async fn main() -> Result<()> {
    setup_logger();
    println!("{}", BANNER);

    let config = Config::load()?;
    info!("✓ Configuration loaded");
    info!(
        "  discovery udp/{}, sessions ws://{}{}, control http://{}",
        config.discovery.port,
        config.session.bind_address(),
        config.session.path,
        config.http_bind
    );
    info!(
        "  heartbeat timeout {:?}, sweep every {:?}",
        config.session.heartbeat_timeout, config.session.sweep_interval
    );

    let server = FleetServer::new(config)?;
    info!("✓ Starting in phase {}", server.phase().current());

    server.start(CancellationToken::new()).await
}
