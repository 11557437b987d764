//! Peer registry — the single source of truth for who receives audio.
//!
//! A peer enters the registry when its control connection issues StartPlay
//! and leaves on disconnect, protocol violation, heartbeat timeout, or
//! server stop. The record's UDP endpoint stays unbound until the peer's
//! hello datagram arrives; unbound peers receive no segments.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

/// Server-assigned session identifier. Nonzero once assigned; 0 is reserved
/// for "not assigned" and signals rejection in the StartPlay reply.
pub type SessionId = u32;

static NEXT_HANDLE_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity handle for one control connection.
///
/// Wraps the write half of the accepted TCP stream. Cloning shares the
/// underlying connection; equality and ordering compare the identity token,
/// never the socket. Writes (replies, heartbeats) from different threads are
/// serialized by the inner mutex — the read side stays exclusive to the
/// connection's read loop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    token: u64,
    writer: Arc<Mutex<TcpStream>>,
    peer_addr: SocketAddr,
}

impl ControlHandle {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            token: NEXT_HANDLE_TOKEN.fetch_add(1, Ordering::Relaxed),
            writer: Arc::new(Mutex::new(stream)),
            peer_addr,
        }
    }

    /// Process-unique identity token.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Remote address of the control connection, for logging.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Write a full control-channel message.
    pub fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut stream = self.writer.lock();
        stream.write_all(bytes)?;
        stream.flush()
    }

    /// Half-shutdown both directions. Unblocks the connection's read loop.
    pub fn shutdown(&self) {
        let _ = self.writer.lock().shutdown(Shutdown::Both);
    }
}

impl PartialEq for ControlHandle {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for ControlHandle {}

/// Registry record for one admitted peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Assigned session id, nonzero.
    pub id: SessionId,
    /// Control connection the peer was admitted on.
    pub handle: ControlHandle,
    /// UDP endpoint learned from the peer's hello datagram.
    pub udp: Option<SocketAddr>,
    /// Last inbound heartbeat (or admission time).
    pub last_tick: Instant,
}

/// Ordered mapping from control-connection identity to [`PeerRecord`].
///
/// Cheap to clone — clones share state. Session ids come from a counter
/// scoped to this instance, so tests can rebuild a fresh server without
/// process-wide state; ids are monotonic, nonzero, and skip zero on wrap.
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    peers: RwLock<BTreeMap<u64, PeerRecord>>,
    next_id: AtomicU32,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                peers: RwLock::new(BTreeMap::new()),
                next_id: AtomicU32::new(1),
            }),
        }
    }

    /// Test-only: start the id counter at an arbitrary value, so the wrap
    /// path is reachable without four billion admissions.
    #[cfg(test)]
    fn with_next_id(next_id: u32) -> Self {
        let registry = Self::new();
        registry.inner.next_id.store(next_id, Ordering::SeqCst);
        registry
    }

    fn allocate_id(&self) -> SessionId {
        loop {
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            if id != 0 {
                return id;
            }
        }
    }

    /// Admit a peer, assigning the next session id.
    ///
    /// `None` when the handle is already admitted — duplicate admission is a
    /// protocol error and the caller replies with id 0.
    pub fn admit(&self, handle: &ControlHandle) -> Option<SessionId> {
        let mut peers = self.inner.peers.write();
        if peers.contains_key(&handle.token()) {
            tracing::error!(peer = %handle.peer_addr(), "duplicate admission");
            return None;
        }

        let id = self.allocate_id();
        peers.insert(
            handle.token(),
            PeerRecord {
                id,
                handle: handle.clone(),
                udp: None,
                last_tick: Instant::now(),
            },
        );
        tracing::debug!(id, peer = %handle.peer_addr(), total = peers.len(), "peer admitted");
        Some(id)
    }

    /// Bind the UDP endpoint for the peer holding `id`.
    ///
    /// Repeated hellos overwrite the endpoint with the latest source address.
    /// Returns false (and warns) when no admitted peer holds the id — the
    /// hello raced ahead of StartPlay or the session is already gone.
    pub fn bind_udp(&self, id: SessionId, addr: SocketAddr) -> bool {
        let mut peers = self.inner.peers.write();
        match peers.values_mut().find(|record| record.id == id) {
            Some(record) => {
                tracing::debug!(id, udp = %addr, peer = %record.handle.peer_addr(), "udp endpoint bound");
                record.udp = Some(addr);
                true
            }
            None => {
                tracing::warn!(id, udp = %addr, "hello for unknown session id, dropped");
                false
            }
        }
    }

    /// Refresh the peer's liveness timestamp. No-op when absent.
    pub fn touch(&self, handle: &ControlHandle) {
        if let Some(record) = self.inner.peers.write().get_mut(&handle.token()) {
            record.last_tick = Instant::now();
        }
    }

    /// Liveness timestamp for the peer, if still registered.
    pub fn last_tick(&self, handle: &ControlHandle) -> Option<Instant> {
        self.inner
            .peers
            .read()
            .get(&handle.token())
            .map(|record| record.last_tick)
    }

    pub fn contains(&self, handle: &ControlHandle) -> bool {
        self.inner.peers.read().contains_key(&handle.token())
    }

    /// Remove the peer's record.
    ///
    /// Idempotent: removing an absent handle logs a warning and returns
    /// `None` rather than faulting.
    pub fn remove(&self, handle: &ControlHandle) -> Option<PeerRecord> {
        let removed = self.inner.peers.write().remove(&handle.token());
        match &removed {
            Some(record) => {
                tracing::debug!(id = record.id, peer = %handle.peer_addr(), "peer removed")
            }
            None => tracing::warn!(peer = %handle.peer_addr(), "remove of unregistered peer"),
        }
        removed
    }

    /// Fan-out destinations: admitted peers with a bound UDP endpoint.
    pub fn snapshot_destinations(&self) -> Vec<(SessionId, SocketAddr)> {
        self.inner
            .peers
            .read()
            .values()
            .filter_map(|record| record.udp.map(|addr| (record.id, addr)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.peers.read().is_empty()
    }

    /// Empty the registry, half-shutting every control socket (server stop).
    pub fn clear_and_shutdown(&self) {
        let mut peers = self.inner.peers.write();
        for record in peers.values() {
            record.handle.shutdown();
        }
        let dropped = peers.len();
        peers.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "registry cleared");
        }
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// Real connected socket pair; registry tests only need the handle identity.
    fn test_handle(listener: &TcpListener) -> ControlHandle {
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let peer_addr = stream.local_addr().unwrap();
        let (accepted, _) = listener.accept().unwrap();
        drop(stream);
        ControlHandle::new(accepted, peer_addr)
    }

    fn fixture() -> (TcpListener, PeerRegistry) {
        (
            TcpListener::bind("127.0.0.1:0").unwrap(),
            PeerRegistry::new(),
        )
    }

    #[test]
    fn ids_are_unique_and_nonzero() {
        let (listener, registry) = fixture();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..16 {
            let handle = test_handle(&listener);
            let id = registry.admit(&handle).unwrap();
            assert_ne!(id, 0);
            assert!(seen.insert(id), "id {id} assigned twice");
        }
    }

    #[test]
    fn id_counter_skips_zero_on_wrap() {
        let (listener, _) = fixture();
        let registry = PeerRegistry::with_next_id(u32::MAX);

        let handle = test_handle(&listener);
        assert_eq!(registry.admit(&handle), Some(u32::MAX));

        // The counter wraps to 0 next; zero is reserved for "not assigned"
        // and must never be handed out.
        let handle = test_handle(&listener);
        assert_eq!(registry.admit(&handle), Some(1));
    }

    #[test]
    fn ids_are_instance_scoped() {
        let (listener, first) = fixture();
        let handle = test_handle(&listener);
        assert_eq!(first.admit(&handle), Some(1));

        let second = PeerRegistry::new();
        let handle = test_handle(&listener);
        assert_eq!(second.admit(&handle), Some(1));
    }

    #[test]
    fn duplicate_admission_rejected() {
        let (listener, registry) = fixture();
        let handle = test_handle(&listener);
        assert!(registry.admit(&handle).is_some());
        assert_eq!(registry.admit(&handle), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn admissions_minus_removals() {
        let (listener, registry) = fixture();
        let handles: Vec<_> = (0..5).map(|_| test_handle(&listener)).collect();
        for handle in &handles {
            registry.admit(handle).unwrap();
        }
        for handle in handles.iter().take(2) {
            assert!(registry.remove(handle).is_some());
        }
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn remove_is_idempotent() {
        let (listener, registry) = fixture();
        let handle = test_handle(&listener);
        registry.admit(&handle).unwrap();
        assert!(registry.contains(&handle));
        assert!(registry.remove(&handle).is_some());
        assert!(!registry.contains(&handle));
        assert!(registry.remove(&handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn binding_is_idempotent_and_latest_wins() {
        let (listener, registry) = fixture();
        let handle = test_handle(&listener);
        let id = registry.admit(&handle).unwrap();

        let first: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let second: SocketAddr = "10.0.0.2:4001".parse().unwrap();
        assert!(registry.bind_udp(id, first));
        assert!(registry.bind_udp(id, second));

        assert_eq!(registry.snapshot_destinations(), vec![(id, second)]);
    }

    #[test]
    fn hello_for_unknown_id_dropped() {
        let (_listener, registry) = fixture();
        assert!(!registry.bind_udp(42, "10.0.0.1:4000".parse().unwrap()));
        assert!(registry.snapshot_destinations().is_empty());
    }

    #[test]
    fn unbound_peers_excluded_from_destinations() {
        let (listener, registry) = fixture();
        let bound = test_handle(&listener);
        let straggler = test_handle(&listener);
        let id = registry.admit(&bound).unwrap();
        registry.admit(&straggler).unwrap();
        registry.bind_udp(id, "192.168.1.9:5000".parse().unwrap());

        let destinations = registry.snapshot_destinations();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].0, id);
    }

    #[test]
    fn touch_refreshes_last_tick() {
        let (listener, registry) = fixture();
        let handle = test_handle(&listener);
        registry.admit(&handle).unwrap();
        let before = registry.last_tick(&handle).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.touch(&handle);
        assert!(registry.last_tick(&handle).unwrap() > before);
    }

    #[test]
    fn clear_empties_registry() {
        let (listener, registry) = fixture();
        for _ in 0..3 {
            let handle = test_handle(&listener);
            registry.admit(&handle).unwrap();
        }
        registry.clear_and_shutdown();
        assert!(registry.is_empty());
        assert!(registry.snapshot_destinations().is_empty());
    }
}
