//! Server module wiring the host loop, the robot session endpoint and the
//! HTTP control API together.

use std::sync::Arc;
use actix_web::{web, App, HttpServer};
use common::{Config, Result};
use log::{error, info};
use tokio_util::sync::CancellationToken;
use crate::directory::InMemoryDirectory;
use crate::frames::FrameStore;
use crate::host::Host;
use crate::phase::{GamePhase, PhaseGate};
use crate::session::SessionEndpoint;

pub mod handlers;

pub use handlers::ApiState;

/// The whole robot host process.
pub struct FleetServer {
    config: Config,
    directory: InMemoryDirectory,
    phase: PhaseGate,
    frames: FrameStore,
}

impl FleetServer {
    pub fn new(config: Config) -> Result<Self> {
        let initial: GamePhase = config.initial_phase.parse()?;
        Ok(Self {
            config,
            directory: InMemoryDirectory::new(),
            phase: PhaseGate::new(initial),
            frames: FrameStore::new(),
        })
    }

    pub fn phase(&self) -> PhaseGate {
        self.phase.clone()
    }

    /// Runs until Ctrl-C or until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting robot fleet host...");
        let config = self.config;

        let directory = Arc::new(self.directory.clone());
        let mut host = Host::new(config.clone(), directory, self.phase.clone(), self.frames.clone());

        // Bind the session port first so discovery advertises the real one.
        let endpoint = SessionEndpoint::bind(&config.session, host.handle().events()).await?;
        host.advertise_session_port(endpoint.local_addr()?.port());

        let state = ApiState {
            host: host.handle(),
            directory: self.directory.clone(),
            phase: self.phase.clone(),
            frames: self.frames.clone(),
        };

        let host_task = tokio::spawn(host.run(shutdown.clone()));
        let endpoint_task = tokio::spawn(endpoint.run(shutdown.clone()));

        info!("Starting HTTP control API on {}", config.http_bind);
        let http_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(handlers::configure)
                .wrap(
                    actix_cors::Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header(),
                )
        })
        .disable_signals()
        .bind(&config.http_bind)?
        .run();
        let http_handle = http_server.handle();
        tokio::pin!(http_server);
        info!("All services started");

        let finished = tokio::select! {
            result = &mut http_server => Some(result),
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                None
            }
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
                None
            }
        };

        shutdown.cancel();
        let http_result = match finished {
            Some(result) => result,
            None => {
                http_handle.stop(true).await;
                (&mut http_server).await
            }
        };
        if let Err(e) = http_result {
            error!("HTTP server failed: {}", e);
        }
        for (name, task) in [("host loop", host_task), ("session endpoint", endpoint_task)] {
            if let Err(e) = task.await {
                error!("{} task failed: {}", name, e);
            }
        }
        info!("Robot fleet host stopped");
        Ok(())
    }
}
