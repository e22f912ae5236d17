use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ian_packets::builtin::ClientHeartbeatPacket;
use tracing::{debug, warn};

use crate::event::{HeartbeatLost, HeartbeatRegained};

/// Default interval between client heartbeats: 3 seconds.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(3);

/// Default time without a server heartbeat before it counts as lost: 15 seconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Heartbeat timing.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Minimum time between client heartbeats. Default: 3s.
    pub send_interval: Duration,
    /// Silence after which the server heartbeat is lost. Default: 15s.
    pub timeout: Duration,
    /// Whether client heartbeats are sent automatically. Default: on.
    pub auto_send: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            auto_send: true,
        }
    }
}

#[derive(Debug)]
struct State {
    last_received: Instant,
    last_sent: Option<Instant>,
    lost: bool,
    active: bool,
    auto_send: bool,
}

/// Tracks heartbeats in both directions.
///
/// Server heartbeats are only monitored while a game is running. Each
/// lost/regained episode is reported exactly once.
#[derive(Debug)]
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Mutex<State>,
}

impl HeartbeatManager {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    pub fn new_at(config: HeartbeatConfig, now: Instant) -> Self {
        let auto_send = config.auto_send;
        Self {
            config,
            state: Mutex::new(State {
                last_received: now,
                last_sent: None,
                lost: false,
                active: false,
                auto_send,
            }),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// A server heartbeat arrived.
    pub fn on_heartbeat(&self) -> Option<HeartbeatRegained> {
        self.on_heartbeat_at(Instant::now())
    }

    pub fn on_heartbeat_at(&self, now: Instant) -> Option<HeartbeatRegained> {
        let mut state = self.state();
        state.last_received = now;
        regain(&mut state)
    }

    /// A game started: begin monitoring server heartbeats.
    pub fn on_game_start(&self) -> Option<HeartbeatRegained> {
        self.on_game_start_at(Instant::now())
    }

    pub fn on_game_start_at(&self, now: Instant) -> Option<HeartbeatRegained> {
        let mut state = self.state();
        state.last_received = now;
        state.active = true;
        regain(&mut state)
    }

    /// The game ended: stop monitoring server heartbeats.
    pub fn on_game_over(&self) {
        let mut state = self.state();
        state.active = false;
        debug!("heartbeat monitoring paused");
    }

    /// Report a lost heartbeat if the server has been silent too long.
    pub fn check_for_heartbeat(&self) -> Option<HeartbeatLost> {
        self.check_for_heartbeat_at(Instant::now())
    }

    pub fn check_for_heartbeat_at(&self, now: Instant) -> Option<HeartbeatLost> {
        let mut state = self.state();
        if !state.active || state.lost {
            return None;
        }
        let silent = now.saturating_duration_since(state.last_received);
        if silent <= self.config.timeout {
            return None;
        }
        state.lost = true;
        warn!(silent_ms = silent.as_millis() as u64, "server heartbeat lost");
        Some(HeartbeatLost)
    }

    /// A client heartbeat to send, if one is due.
    pub fn send_heartbeat_if_needed(&self) -> Option<ClientHeartbeatPacket> {
        self.send_heartbeat_if_needed_at(Instant::now())
    }

    pub fn send_heartbeat_if_needed_at(&self, now: Instant) -> Option<ClientHeartbeatPacket> {
        let mut state = self.state();
        if !state.auto_send {
            return None;
        }
        let due = state
            .last_sent
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.config.send_interval);
        if !due {
            return None;
        }
        state.last_sent = Some(now);
        Some(ClientHeartbeatPacket)
    }

    pub fn set_auto_send(&self, auto_send: bool) {
        self.state().auto_send = auto_send;
    }

    pub fn is_auto_send(&self) -> bool {
        self.state().auto_send
    }

    /// Whether the server heartbeat is currently lost.
    pub fn is_lost(&self) -> bool {
        self.state().lost
    }

    /// Whether server heartbeats are being monitored.
    pub fn is_active(&self) -> bool {
        self.state().active
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HeartbeatManager {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}

fn regain(state: &mut State) -> Option<HeartbeatRegained> {
    if !state.lost {
        return None;
    }
    state.lost = false;
    debug!("server heartbeat regained");
    Some(HeartbeatRegained)
}
