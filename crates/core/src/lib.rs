//! # lancast — LAN loopback-audio streaming engine
//!
//! Streams the audio a host machine is playing to remote players on the
//! same LAN with low latency. The server captures the default output
//! device through a pluggable adapter, publishes its format, admits
//! players over a reliable control channel and fans PCM out to them over
//! an unreliable datagram channel. The protocol assumes a trusted LAN:
//! no authentication, encryption, retransmission or congestion control.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Embedder (capture/playback adapters, CLI)   │
//! ├──────────────────────────────────────────────┤
//! │  Server / Client   — lifecycle, orchestration│
//! │  PeerRegistry      — admitted-peer records   │
//! ├──────────────────────────────────────────────┤
//! │  Protocol          — commands, format codec  │
//! │  Liveness          — heartbeat monitoring    │
//! ├──────────────────────────────────────────────┤
//! │  Transport         — TCP control, UDP audio  │
//! │  Segment           — MTU-aware frame slicing │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Both transports share one `(host, port)`. A play session is correlated
//! across them by an opaque nonzero session id: assigned on the control
//! channel at StartPlay, echoed back in the client's UDP hello datagram.
//!
//! ## Dataflow
//!
//! Server: capture adapter → [`FrameSink`] → segmentation → per-peer UDP
//! send. Client: TCP negotiate → UDP hello → datagrams → [`PlaybackSink`].
//! Heartbeats flow both ways every 3 s; 15 s of silence closes a session.
//!
//! ## Quick start
//!
//! ```no_run
//! use lancast::Server;
//! # fn capture() -> Box<dyn lancast::CaptureSource> { unimplemented!() }
//!
//! let mut server = Server::new("0.0.0.0:5530", capture());
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Server`] orchestrator, [`ServerConfig`], fan-out.
//! - [`client`] — [`Client`] session driver.
//! - [`registry`] — [`PeerRegistry`] and per-peer records.
//! - [`protocol`] — wire codec: command tags, format descriptor, hello.
//! - [`transport`] — TCP accept/read loops, UDP socket and hello intake.
//! - [`segment`] — MTU-aware segmentation of capture frames.
//! - [`liveness`] — heartbeat constants and per-peer monitoring.
//! - [`audio`] — adapter traits ([`CaptureSource`], [`PlaybackSink`]).
//! - [`addr`] — bind-address selection helper.
//! - [`error`] — [`CastError`] and [`Result`] alias.

pub mod addr;
pub mod audio;
pub mod client;
pub mod error;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod segment;
pub mod server;
pub mod transport;

pub use audio::{CaptureSource, FrameSink, PlaybackSink};
pub use client::Client;
pub use error::{CastError, FormatErrorKind, Result};
pub use protocol::{AudioFormat, Command, SampleEncoding};
pub use registry::{ControlHandle, PeerRecord, PeerRegistry, SessionId};
pub use server::{Broadcaster, Server, ServerConfig};
