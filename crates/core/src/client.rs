//! Client session driver: negotiate, register, stream in, heartbeat.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::audio::PlaybackSink;
use crate::error::{CastError, FormatErrorKind, Result};
use crate::liveness::HEARTBEAT_INTERVAL;
use crate::protocol::{self, AudioFormat, Command, MAX_DESCRIPTOR_LEN};
use crate::registry::SessionId;

/// Receive buffer for inbound audio datagrams. Segments are MTU-sized, so
/// 4 KiB leaves generous headroom for larger path MTUs.
const DATAGRAM_BUF_LEN: usize = 4096;

/// Remote audio player.
///
/// Connects to a server's control channel, negotiates the stream format,
/// registers its UDP endpoint and feeds received PCM into a
/// [`PlaybackSink`]. Mirrors the server's heartbeat cadence; a lost control
/// connection stops the stream.
///
/// # Usage
///
/// ```no_run
/// use lancast::Client;
/// # fn sink() -> Box<dyn lancast::PlaybackSink> { unimplemented!() }
///
/// let mut client = Client::new();
/// client.start("192.168.1.10", 5530, sink()).unwrap();
/// // ... audio renders until stop() or the server goes away ...
/// client.stop();
/// ```
pub struct Client {
    running: Arc<AtomicBool>,
    control: Option<TcpStream>,
    sink: Option<Arc<Mutex<Box<dyn PlaybackSink>>>>,
    threads: Vec<JoinHandle<()>>,
    session_id: Option<SessionId>,
    format: Option<AudioFormat>,
}

impl Client {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            control: None,
            sink: None,
            threads: Vec::new(),
            session_id: None,
            format: None,
        }
    }

    /// Connect, negotiate and start streaming into `sink`.
    ///
    /// Steps: TCP connect → GetFormat → StartPlay → UDP hello → sink init →
    /// spawn the heartbeat and audio-in threads. Any handshake failure tears
    /// the session down and is returned.
    pub fn start(&mut self, host: &str, port: u16, mut sink: Box<dyn PlaybackSink>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CastError::AlreadyRunning);
        }

        let server_addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| CastError::InvalidServerAddress(format!("{host}:{port}")))?
            .next()
            .ok_or_else(|| CastError::InvalidServerAddress(format!("{host}:{port}")))?;

        let mut control = TcpStream::connect(server_addr)?;
        if let Err(error) = control.set_nodelay(true) {
            tracing::debug!(%error, "failed to set TCP_NODELAY");
        }

        let format = negotiate_format(&mut control)?;
        let id = start_play(&mut control)?;
        tracing::info!(id, ?format, server = %server_addr, "admitted to stream");

        let udp = bind_udp_for(server_addr)?;
        udp.send_to(&protocol::encode_hello(id), server_addr)?;
        udp.set_read_timeout(Some(HEARTBEAT_INTERVAL))?;

        sink.init(&format)?;
        sink.start()?;

        self.running.store(true, Ordering::SeqCst);
        self.session_id = Some(id);
        self.format = Some(format);
        self.control = Some(control.try_clone()?);

        let sink = Arc::new(Mutex::new(sink));
        self.sink = Some(sink.clone());

        // Heartbeat out every interval; any readable inbound command doubles
        // as the server's liveness signal.
        control.set_read_timeout(Some(HEARTBEAT_INTERVAL))?;
        let running = self.running.clone();
        self.threads
            .push(thread::spawn(move || heartbeat_loop(control, running)));

        let running = self.running.clone();
        self.threads
            .push(thread::spawn(move || audio_in_loop(udp, sink, running)));

        Ok(())
    }

    /// Stop streaming: signal cancellation, close the control channel, join
    /// both worker threads and release the playback sink.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(control) = self.control.take() {
            let _ = control.shutdown(Shutdown::Both);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        if let Some(sink) = self.sink.take() {
            sink.lock().stop();
        }
        self.session_id = None;
    }

    /// True while both worker threads should keep going. Turns false on
    /// `stop` or when the control connection is lost.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Session id assigned by the server, while running.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Format negotiated during the handshake.
    pub fn format(&self) -> Option<&AudioFormat> {
        self.format.as_ref()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_u32(stream: &mut TcpStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// GetFormat exchange: request, validate the reply framing, parse the
/// descriptor. A parse failure here is fatal for the session.
fn negotiate_format(control: &mut TcpStream) -> Result<AudioFormat> {
    control.write_all(&Command::GetFormat.to_bytes())?;

    let tag = read_u32(control)?;
    if tag != Command::GetFormat.tag() {
        return Err(CastError::UnexpectedReply {
            expected: Command::GetFormat,
            got: tag,
        });
    }

    let size = read_u32(control)? as usize;
    if size == 0 {
        return Err(CastError::EmptyFormat);
    }
    if size > MAX_DESCRIPTOR_LEN {
        return Err(CastError::Format {
            kind: FormatErrorKind::Oversized { len: size },
        });
    }

    let mut descriptor = vec![0u8; size];
    control.read_exact(&mut descriptor)?;
    AudioFormat::decode(&descriptor)
}

/// StartPlay exchange: request admission, validate the reply, reject id 0.
fn start_play(control: &mut TcpStream) -> Result<SessionId> {
    control.write_all(&Command::StartPlay.to_bytes())?;

    let tag = read_u32(control)?;
    if tag != Command::StartPlay.tag() {
        return Err(CastError::UnexpectedReply {
            expected: Command::StartPlay,
            got: tag,
        });
    }

    let id = read_u32(control)?;
    if id == 0 {
        return Err(CastError::SessionRejected);
    }
    Ok(id)
}

/// Ephemeral UDP socket matching the server's address family.
fn bind_udp_for(server_addr: SocketAddr) -> Result<UdpSocket> {
    let local: SocketAddr = match server_addr {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    Ok(UdpSocket::bind(local)?)
}

/// Send Heartbeat every interval and drain inbound commands.
///
/// The read timeout doubles as the send cadence; a closed or failing
/// control connection flips the running flag so the audio loop winds down
/// with it.
fn heartbeat_loop(mut control: TcpStream, running: Arc<AtomicBool>) {
    let mut buf = [0u8; protocol::TAG_LEN];

    while running.load(Ordering::SeqCst) {
        if let Err(error) = control.write_all(&Command::Heartbeat.to_bytes()) {
            tracing::info!(%error, "control channel lost");
            running.store(false, Ordering::SeqCst);
            return;
        }

        match control.read(&mut buf) {
            Ok(0) => {
                tracing::info!("control channel closed by server");
                running.store(false, Ordering::SeqCst);
                return;
            }
            Ok(_) => {
                // Any inbound traffic is a liveness signal; the only command
                // the server sends after admission is Heartbeat.
                tracing::trace!("server heartbeat");
            }
            Err(ref error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(error) => {
                tracing::info!(%error, "control read error");
                running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Receive audio datagrams and hand each buffer to the playback sink.
///
/// Tolerant of transient UDP failures: receive errors are logged and the
/// loop continues.
fn audio_in_loop(udp: UdpSocket, sink: Arc<Mutex<Box<dyn PlaybackSink>>>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; DATAGRAM_BUF_LEN];

    while running.load(Ordering::SeqCst) {
        match udp.recv(&mut buf) {
            Ok(0) => continue,
            Ok(len) => sink.lock().play(&buf[..len]),
            Err(ref error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(error) => {
                tracing::warn!(%error, "datagram receive failed");
            }
        }
    }
    tracing::debug!("audio receive loop exited");
}
