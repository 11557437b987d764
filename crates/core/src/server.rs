//! Server lifecycle and audio fan-out.

use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{CaptureSource, FrameSink};
use crate::error::{CastError, Result};
use crate::liveness::{HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};
use crate::registry::PeerRegistry;
use crate::segment::{self, DEFAULT_MTU};
use crate::transport::tcp::{self, SessionContext};
use crate::transport::udp::{self, UdpTransport};

/// Tunables for a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path MTU used to size UDP segments. The default assumes Ethernet
    /// with PPPoE framing; raise it for jumbo frames, lower it for tunnels.
    pub mtu: usize,
    /// Cadence of outbound heartbeats to admitted peers.
    pub heartbeat_interval: Duration,
    /// Silence threshold after which a peer is closed.
    pub heartbeat_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
        }
    }
}

/// Fan-out pipeline: segments capture frames and sends them to every
/// admitted peer with a bound UDP endpoint.
///
/// Owned by the [`Server`]; the capture adapter reaches it only through a
/// weak [`FrameSink`] handle, so frames delivered after teardown are
/// discarded instead of keeping the pipeline alive.
pub struct Broadcaster {
    socket: Arc<UdpSocket>,
    registry: PeerRegistry,
    running: Arc<AtomicBool>,
    mtu: usize,
}

impl Broadcaster {
    pub(crate) fn broadcast(&self, frame: &[u8], block_align: usize) {
        if frame.is_empty() || !self.running.load(Ordering::SeqCst) {
            return;
        }

        let Some(seg_size) = segment::segment_size(self.mtu, block_align) else {
            tracing::warn!(block_align, mtu = self.mtu, "frame dropped: no aligned segment fits");
            return;
        };

        let destinations = self.registry.snapshot_destinations();
        if destinations.is_empty() {
            return;
        }

        for seg in segment::segment_frame(frame, seg_size) {
            for (id, addr) in &destinations {
                // Fire-and-forget: a lost segment is indistinguishable from
                // network loss, which receivers already tolerate.
                if let Err(error) = self.socket.send_to(seg, addr) {
                    tracing::trace!(id, %addr, %error, "segment send failed");
                }
            }
        }
    }
}

/// High-level streaming server orchestrator.
///
/// Owns the peer registry, the shared UDP socket, the capture adapter and
/// the background threads. Binds TCP and UDP to the **same** `(host, port)`
/// — the control channel and the audio channel are correlated by session id,
/// not by port.
///
/// # Usage
///
/// ```no_run
/// use lancast::{Server, ServerConfig};
/// # fn capture() -> Box<dyn lancast::CaptureSource> { unimplemented!() }
///
/// let mut server = Server::new("192.168.1.10:5530", capture());
/// server.start().unwrap();
/// // ... capture adapter now feeds every admitted peer ...
/// server.stop();
/// ```
pub struct Server {
    bind_addr: String,
    config: ServerConfig,
    registry: PeerRegistry,
    running: Arc<AtomicBool>,
    capture: Box<dyn CaptureSource>,
    broadcaster: Option<Arc<Broadcaster>>,
    threads: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server with the default configuration.
    ///
    /// `bind_addr` must be `host:port` with an explicit non-zero port (both
    /// transports bind it); validation happens in [`start`](Self::start).
    pub fn new(bind_addr: &str, capture: Box<dyn CaptureSource>) -> Self {
        Self::with_config(bind_addr, capture, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, capture: Box<dyn CaptureSource>, config: ServerConfig) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            config,
            registry: PeerRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            capture,
            broadcaster: None,
            threads: Vec::new(),
        }
    }

    /// Bind both transports, start loopback capture, and spawn the accept
    /// and hello loops.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CastError::AlreadyRunning);
        }

        let addr: SocketAddr = self.bind_addr.parse().map_err(|_| {
            CastError::InvalidBindAddress(format!(
                "expected host:port with explicit port, got {:?}",
                self.bind_addr
            ))
        })?;
        if addr.port() == 0 {
            return Err(CastError::InvalidBindAddress(
                "port must be explicit (non-zero)".to_string(),
            ));
        }

        let udp = UdpTransport::bind(addr)?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let broadcaster = Arc::new(Broadcaster {
            socket: udp.socket(),
            registry: self.registry.clone(),
            running: self.running.clone(),
            mtu: self.config.mtu,
        });

        let descriptor = Arc::new(self.capture.format().encode());
        if let Err(error) = self.capture.start(FrameSink::new(&broadcaster)) {
            self.running.store(false, Ordering::SeqCst);
            return Err(error);
        }

        tracing::info!(addr = %self.bind_addr, "control channel listening");
        tracing::info!(addr = %self.bind_addr, "audio channel listening");

        let ctx = SessionContext {
            registry: self.registry.clone(),
            running: self.running.clone(),
            descriptor,
            heartbeat_interval: self.config.heartbeat_interval,
            heartbeat_timeout: self.config.heartbeat_timeout,
        };
        self.threads
            .push(thread::spawn(move || tcp::accept_loop(listener, ctx)));

        let socket = udp.socket();
        let registry = self.registry.clone();
        let running = self.running.clone();
        self.threads
            .push(thread::spawn(move || udp::hello_loop(socket, registry, running)));

        self.broadcaster = Some(broadcaster);
        Ok(())
    }

    /// Stop the server: signal cancellation, join the acceptor and hello
    /// threads, stop capture, clear the registry (closing every control
    /// socket), and release the UDP socket — in that order.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("server stopping");

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.capture.stop();
        self.registry.clear_and_shutdown();
        // Last strong broadcaster reference: releases the UDP socket and
        // disconnects every outstanding FrameSink.
        self.broadcaster = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of admitted peers (bound or not).
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// The peer registry (used by embedders for inspection and by tests).
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AudioFormat, SampleEncoding};

    struct NullCapture;

    impl CaptureSource for NullCapture {
        fn start(&mut self, _sink: FrameSink) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}

        fn format(&self) -> AudioFormat {
            AudioFormat {
                sample_rate: 48_000,
                channels: 2,
                encoding: SampleEncoding::F32,
            }
        }
    }

    #[test]
    fn start_rejects_port_zero() {
        let mut server = Server::new("127.0.0.1:0", Box::new(NullCapture));
        let err = server.start().unwrap_err();
        match &err {
            CastError::InvalidBindAddress(msg) => assert!(msg.contains("non-zero"), "{msg}"),
            other => panic!("expected InvalidBindAddress, got {other:?}"),
        }
    }

    #[test]
    fn start_rejects_missing_port() {
        let mut server = Server::new("127.0.0.1", Box::new(NullCapture));
        assert!(matches!(
            server.start().unwrap_err(),
            CastError::InvalidBindAddress(_)
        ));
    }

    #[test]
    fn start_is_not_reentrant() {
        let mut server = Server::new("127.0.0.1:18591", Box::new(NullCapture));
        server.start().expect("first start");
        assert!(matches!(
            server.start().unwrap_err(),
            CastError::AlreadyRunning
        ));
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut server = Server::new("127.0.0.1:18592", Box::new(NullCapture));
        server.start().expect("start");
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }
}
