//! Coarse game phase, used to gate hello acceptance and the discovery listener.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use common::{FleetError, Result};
use log::info;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    MainMenu,
    Lobby,
    Playing,
    Ended,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::MainMenu => "main_menu",
            GamePhase::Lobby => "lobby",
            GamePhase::Playing => "playing",
            GamePhase::Ended => "ended",
        }
    }

    /// Robots may say hello and discovery is answered only in this phase.
    pub fn is_discovery_open(&self) -> bool {
        *self == GamePhase::Lobby
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamePhase {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "main_menu" | "menu" => Ok(GamePhase::MainMenu),
            "lobby" => Ok(GamePhase::Lobby),
            "playing" => Ok(GamePhase::Playing),
            "ended" => Ok(GamePhase::Ended),
            other => Err(FleetError::ConfigError(format!("unknown phase {:?}", other))),
        }
    }
}

/// Shared, observable current phase.
#[derive(Clone)]
pub struct PhaseGate {
    tx: Arc<watch::Sender<GamePhase>>,
}

impl PhaseGate {
    pub fn new(initial: GamePhase) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> GamePhase {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GamePhase> {
        self.tx.subscribe()
    }

    pub fn go_to_lobby(&self) -> Result<GamePhase> {
        self.transition(GamePhase::MainMenu, GamePhase::Lobby)
    }

    pub fn start_game(&self) -> Result<GamePhase> {
        self.transition(GamePhase::Lobby, GamePhase::Playing)
    }

    pub fn end_game(&self) -> Result<GamePhase> {
        self.transition(GamePhase::Playing, GamePhase::Ended)
    }

    /// Allowed from any phase.
    pub fn back_to_menu(&self) -> GamePhase {
        self.set(GamePhase::MainMenu);
        GamePhase::MainMenu
    }

    fn transition(&self, from: GamePhase, to: GamePhase) -> Result<GamePhase> {
        let current = self.current();
        if current != from {
            return Err(FleetError::PhaseTransition {
                from: current.to_string(),
                to: to.to_string(),
            });
        }
        self.set(to);
        Ok(to)
    }

    fn set(&self, phase: GamePhase) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
        if changed {
            info!("Phase changed to {}", phase);
        }
    }
}
