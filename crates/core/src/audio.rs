//! Adapter contracts for the platform audio layer.
//!
//! The engine never touches an audio device. The server consumes a
//! [`CaptureSource`] (loopback capture on the host OS) and the client drives
//! a [`PlaybackSink`] (PCM render on the playback device); both are supplied
//! by the embedder.

use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::protocol::AudioFormat;
use crate::server::Broadcaster;

/// Loopback capture adapter, consumed by the server.
///
/// `start` hands the adapter a [`FrameSink`]; the adapter calls
/// [`FrameSink::deliver`] from its own capture thread for every PCM frame.
pub trait CaptureSource: Send {
    /// Start loopback recording, delivering frames into `sink`.
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop recording. The adapter must not call the sink afterwards
    /// (late calls are harmless no-ops, but wasted work).
    fn stop(&mut self);

    /// The capture format, published to clients during format negotiation.
    fn format(&self) -> AudioFormat;
}

/// PCM render adapter, consumed by the client.
pub trait PlaybackSink: Send {
    /// Prepare the render device for the negotiated format.
    fn init(&mut self, format: &AudioFormat) -> Result<()>;

    /// Begin rendering.
    fn start(&mut self) -> Result<()>;

    /// Queue one received buffer for playback. Must not block: the caller
    /// is the datagram receive loop.
    fn play(&mut self, frame: &[u8]);

    /// Stop rendering and release the device.
    fn stop(&mut self);
}

/// Frame callback handed to the capture adapter.
///
/// Holds only a weak handle to the server's broadcaster, so a capture thread
/// that outlives `Server::stop` cannot keep the fan-out pipeline alive:
/// after teardown the upgrade fails and frames are silently discarded.
/// Callable from any thread.
#[derive(Clone)]
pub struct FrameSink {
    broadcaster: Weak<Broadcaster>,
}

impl FrameSink {
    pub(crate) fn new(broadcaster: &Arc<Broadcaster>) -> Self {
        Self {
            broadcaster: Arc::downgrade(broadcaster),
        }
    }

    /// A sink that discards every frame. Useful for adapter tests.
    pub fn disconnected() -> Self {
        Self {
            broadcaster: Weak::new(),
        }
    }

    /// Fan a capture frame out to every admitted peer.
    ///
    /// `block_align` is the frame's bytes-per-sample-frame; segment lengths
    /// are kept multiples of it. No-op once the server is torn down.
    pub fn deliver(&self, frame: &[u8], block_align: usize) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.broadcast(frame, block_align);
        }
    }
}
