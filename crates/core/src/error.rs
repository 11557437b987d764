//! Error types for the streaming engine.

use std::fmt;

use crate::protocol::Command;

/// Errors that can occur in the streaming engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io) — socket/network failures.
/// - **Lifecycle**: [`AlreadyRunning`](Self::AlreadyRunning),
///   [`InvalidBindAddress`](Self::InvalidBindAddress),
///   [`InvalidServerAddress`](Self::InvalidServerAddress).
/// - **Handshake**: [`UnexpectedReply`](Self::UnexpectedReply),
///   [`SessionRejected`](Self::SessionRejected),
///   [`EmptyFormat`](Self::EmptyFormat).
/// - **Codec**: [`Format`](Self::Format) — malformed audio-format descriptor.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a server or client that is already running.
    #[error("already running")]
    AlreadyRunning,

    /// Server bind address was not `host:port` with an explicit non-zero port.
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    /// Client could not resolve the server address.
    #[error("invalid server address: {0}")]
    InvalidServerAddress(String),

    /// A control-channel reply carried a different command tag than the
    /// request it answers.
    #[error("unexpected reply: expected {expected:?}, got tag {got:#010x}")]
    UnexpectedReply { expected: Command, got: u32 },

    /// The server answered StartPlay with session id 0.
    #[error("server rejected the play session")]
    SessionRejected,

    /// GetFormat reply declared a zero-length descriptor.
    #[error("empty format descriptor")]
    EmptyFormat,

    /// Failed to parse the audio-format descriptor.
    #[error("format descriptor error: {kind}")]
    Format { kind: FormatErrorKind },
}

/// Specific kind of audio-format descriptor failure.
#[derive(Debug)]
pub enum FormatErrorKind {
    /// Descriptor shorter than the fixed record.
    Truncated { len: usize },
    /// Descriptor larger than any format this protocol can describe.
    Oversized { len: usize },
    /// Encoding tag outside the known set.
    UnknownEncoding(u32),
    /// Channel count of zero.
    ZeroChannels,
    /// Sample rate of zero.
    ZeroSampleRate,
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => write!(f, "truncated descriptor ({len} bytes)"),
            Self::Oversized { len } => write!(f, "oversized descriptor ({len} bytes)"),
            Self::UnknownEncoding(tag) => write!(f, "unknown encoding tag {tag}"),
            Self::ZeroChannels => write!(f, "zero channels"),
            Self::ZeroSampleRate => write!(f, "zero sample rate"),
        }
    }
}

/// Convenience alias for `Result<T, CastError>`.
pub type Result<T> = std::result::Result<T, CastError>;
