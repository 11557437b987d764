//! Binary session protocol.
//!
//! The control channel (TCP) and the audio channel (UDP) share one compact
//! wire format. Every multi-byte field is **little-endian**, on every
//! architecture.
//!
//! ## Control channel exchanges
//!
//! ```text
//! C → S   GetFormat request    tag:u32
//! S → C   GetFormat reply      tag:u32 | size:u32 | descriptor[size]
//! C → S   StartPlay request    tag:u32
//! S → C   StartPlay reply      tag:u32 | id:u32        (id = 0 ⇒ rejected)
//! C ↔ S   Heartbeat            tag:u32
//! ```
//!
//! ## Audio channel
//!
//! ```text
//! C → S   Hello                id:u32                  (binds the UDP endpoint)
//! S → C   Segment              block-aligned PCM bytes, no header
//! ```
//!
//! Segments carry no sequence numbers; the channel is fire-and-forget and
//! loss is indistinguishable from underrun at the receiver.

pub mod command;
pub mod format;

pub use command::{
    decode_hello, encode_format_reply, encode_hello, encode_start_play_reply, Command, HELLO_LEN,
    TAG_LEN,
};
pub use format::{AudioFormat, SampleEncoding, DESCRIPTOR_LEN, MAX_DESCRIPTOR_LEN};
