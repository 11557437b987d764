//! TCP control channel: accept loop and per-connection session state machine.
//!
//! ## Session states
//!
//! ```text
//! Fresh   --GetFormat--> Fresh     reply tag|size|descriptor
//! Fresh   --StartPlay--> Playing   admit, reply tag|id, start liveness
//! Playing --Heartbeat--> Playing   refresh last_tick
//! Playing --GetFormat--> Playing   reply tag|size|descriptor
//! *       --other / read error-->  Terminated (absorbing)
//! ```
//!
//! Terminated removes the peer from the registry, half-shuts the socket and
//! exits the loop. One read loop per connection; replies go out in request
//! order through the handle's write mutex.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::liveness;
use crate::protocol::{self, Command, TAG_LEN};
use crate::registry::{ControlHandle, PeerRegistry};

/// Poll interval between accept attempts on the non-blocking listener.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Read timeout on control sockets, so read loops observe cancellation.
const READ_POLL: Duration = Duration::from_millis(500);

/// Everything a control connection needs from the server.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub registry: PeerRegistry,
    pub running: Arc<AtomicBool>,
    /// Encoded audio-format descriptor, built once at capture start.
    pub descriptor: Arc<Vec<u8>>,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

/// Non-blocking TCP accept loop.
///
/// Checks the running flag between accepts with a 50 ms poll interval so
/// that `Server::stop` can terminate it promptly.
pub(crate) fn accept_loop(listener: TcpListener, ctx: SessionContext) {
    while ctx.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                tracing::info!(%peer_addr, "accepted control connection");
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let ctx = ctx.clone();
                thread::spawn(move || Connection::handle(stream, ctx));
            }
            Err(ref error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(error) => {
                if ctx.running.load(Ordering::SeqCst) {
                    tracing::warn!(%error, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Outcome of a cancellable exact read.
enum ReadOutcome {
    Tag(u32),
    /// Peer closed the connection.
    Eof,
    /// Server stop observed mid-wait.
    Stopped,
}

/// Read one little-endian command tag, polling the running flag across
/// read-timeout wakeups. Accumulates partial reads so a tag split across
/// TCP reads is reassembled rather than lost.
fn read_tag(reader: &mut TcpStream, running: &AtomicBool) -> std::io::Result<ReadOutcome> {
    let mut buf = [0u8; TAG_LEN];
    let mut filled = 0;

    while filled < buf.len() {
        if !running.load(Ordering::SeqCst) {
            return Ok(ReadOutcome::Stopped);
        }
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(ReadOutcome::Eof),
            Ok(n) => filled += n,
            Err(ref error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut
                    || error.kind() == std::io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(error) => return Err(error),
        }
    }

    Ok(ReadOutcome::Tag(u32::from_le_bytes(buf)))
}

/// A single control connection with its own lifecycle.
struct Connection {
    reader: TcpStream,
    handle: ControlHandle,
    ctx: SessionContext,
    /// Set once StartPlay succeeds; gates Heartbeat and registry cleanup.
    admitted: bool,
}

impl Connection {
    /// Entry point: set up a connection and run its command loop.
    fn handle(stream: TcpStream, ctx: SessionContext) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        // Control-plane latency matters more than throughput here.
        if let Err(error) = stream.set_nodelay(true) {
            tracing::debug!(%peer_addr, %error, "failed to set TCP_NODELAY");
        }
        if stream.set_read_timeout(Some(READ_POLL)).is_err() {
            return;
        }

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(_) => return,
        };

        let mut conn = Connection {
            reader,
            handle: ControlHandle::new(stream, peer_addr),
            ctx,
            admitted: false,
        };

        let reason = conn.run();
        conn.cleanup();

        tracing::info!(%peer_addr, reason, "control connection closed");
    }

    /// Command loop. Returns the reason for exiting.
    fn run(&mut self) -> &'static str {
        loop {
            let tag = match read_tag(&mut self.reader, &self.ctx.running) {
                Ok(ReadOutcome::Tag(tag)) => tag,
                Ok(ReadOutcome::Eof) => return "closed by peer",
                Ok(ReadOutcome::Stopped) => return "server stopping",
                Err(error) => {
                    tracing::debug!(peer = %self.handle.peer_addr(), %error, "control read error");
                    return "read error";
                }
            };

            match Command::from_tag(tag) {
                Some(Command::GetFormat) => {
                    let reply = protocol::encode_format_reply(&self.ctx.descriptor);
                    if self.handle.send(&reply).is_err() {
                        return "write error";
                    }
                }
                Some(Command::StartPlay) => match self.ctx.registry.admit(&self.handle) {
                    Some(id) => {
                        if self
                            .handle
                            .send(&protocol::encode_start_play_reply(id))
                            .is_err()
                        {
                            return "write error";
                        }
                        self.admitted = true;
                        liveness::spawn_monitor(
                            self.ctx.registry.clone(),
                            self.handle.clone(),
                            id,
                            self.ctx.running.clone(),
                            self.ctx.heartbeat_interval,
                            self.ctx.heartbeat_timeout,
                        );
                        tracing::info!(id, peer = %self.handle.peer_addr(), "play session started");
                    }
                    None => {
                        let _ = self.handle.send(&protocol::encode_start_play_reply(0));
                        return "duplicate start_play";
                    }
                },
                Some(Command::Heartbeat) if self.admitted => {
                    self.ctx.registry.touch(&self.handle);
                }
                other => {
                    tracing::warn!(
                        peer = %self.handle.peer_addr(),
                        tag = format_args!("{tag:#010x}"),
                        command = ?other,
                        "protocol violation"
                    );
                    return "protocol violation";
                }
            }
        }
    }

    /// Terminated state: remove from the registry (if admitted) and
    /// half-shutdown the socket.
    fn cleanup(&self) {
        if self.admitted {
            self.ctx.registry.remove(&self.handle);
        }
        self.handle.shutdown();
    }
}
