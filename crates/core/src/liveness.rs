//! Per-peer heartbeat monitoring.
//!
//! On admission the server spawns one monitor per peer. Each tick the
//! monitor checks the peer's last inbound heartbeat and sends one of its
//! own; a silent peer or a failed send closes the session. The client
//! reciprocates on the same cadence, so either side detects a dead link
//! within one timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::protocol::Command;
use crate::registry::{ControlHandle, PeerRegistry, SessionId};

/// Cadence of outbound heartbeats, both directions.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Silence threshold after which a peer is declared dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Spawn the detached monitor thread for an admitted peer.
pub(crate) fn spawn_monitor(
    registry: PeerRegistry,
    handle: ControlHandle,
    id: SessionId,
    running: Arc<AtomicBool>,
    interval: Duration,
    timeout: Duration,
) {
    thread::spawn(move || monitor_loop(registry, handle, id, running, interval, timeout));
}

fn monitor_loop(
    registry: PeerRegistry,
    handle: ControlHandle,
    id: SessionId,
    running: Arc<AtomicBool>,
    interval: Duration,
    timeout: Duration,
) {
    loop {
        thread::sleep(interval);

        if !running.load(Ordering::SeqCst) {
            return;
        }

        // Session already closed by the read loop or a previous tick.
        let Some(last_tick) = registry.last_tick(&handle) else {
            return;
        };

        if last_tick.elapsed() > timeout {
            tracing::info!(id, peer = %handle.peer_addr(), "heartbeat timeout, closing session");
            registry.remove(&handle);
            handle.shutdown();
            return;
        }

        if let Err(error) = handle.send(&Command::Heartbeat.to_bytes()) {
            tracing::info!(id, peer = %handle.peer_addr(), %error, "heartbeat send failed, closing session");
            registry.remove(&handle);
            handle.shutdown();
            return;
        }
    }
}
