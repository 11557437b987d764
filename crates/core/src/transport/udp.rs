//! UDP transport: hello intake and segment delivery.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::protocol;
use crate::registry::PeerRegistry;

/// Poll interval for observing the running flag while waiting for hellos.
const RECV_POLL: Duration = Duration::from_millis(500);

/// Receive buffer for the hello loop. A hello is 4 bytes; anything longer
/// is malformed and gets dropped, so a small buffer suffices.
const HELLO_BUF_LEN: usize = 16;

/// The single UDP socket, bound to the same address as the TCP acceptor.
///
/// Shared between the hello receive loop and the fan-out sender; `UdpSocket`
/// is internally synchronized, so no locking is needed around sends.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind to the server address with a receive timeout so the hello loop
    /// can observe cancellation.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle to the underlying socket.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

/// Endless hello intake: each valid 4-byte datagram binds a session id to
/// its UDP source endpoint.
///
/// The hello is unauthenticated — an on-LAN peer that forges another
/// session's id hijacks that stream. Accepted limitation of the trusted-LAN
/// deployment model.
pub(crate) fn hello_loop(socket: Arc<UdpSocket>, registry: PeerRegistry, running: Arc<AtomicBool>) {
    let mut buf = [0u8; HELLO_BUF_LEN];

    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, source)) => match protocol::decode_hello(&buf[..len]) {
                Some(id) => {
                    // Unknown ids are dropped (and warned about) inside bind_udp;
                    // the client may retry by re-sending its hello.
                    registry.bind_udp(id, source);
                }
                None => {
                    tracing::warn!(len, %source, "malformed hello datagram, dropped");
                }
            },
            Err(ref error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(error) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(%error, "hello receive error");
                }
            }
        }
    }
    tracing::debug!("hello loop exited");
}
