//! Audio-format descriptor.
//!
//! The descriptor is the opaque payload of the GetFormat reply. Only this
//! module knows its layout — a fixed little-endian record:
//!
//! ```text
//! encoding:u32 | channels:u32 | sample_rate:u32
//! ```
//!
//! The server produces it once per capture session; the client must parse it
//! before admission. Parsers tolerate trailing bytes so the record can grow
//! without breaking older clients.

use crate::error::{CastError, FormatErrorKind, Result};

/// Length in bytes of the fixed descriptor record.
pub const DESCRIPTOR_LEN: usize = 12;

/// Upper bound on a descriptor a client will accept from the wire.
pub const MAX_DESCRIPTOR_LEN: usize = 4096;

/// Sample encoding of the capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SampleEncoding {
    /// Signed 16-bit PCM.
    PcmS16 = 1,
    /// Signed 24-bit PCM, packed.
    PcmS24 = 2,
    /// Signed 32-bit PCM.
    PcmS32 = 3,
    /// IEEE 754 binary32.
    F32 = 4,
}

impl SampleEncoding {
    /// The wire tag for this encoding.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a wire tag. Tag 0 is reserved and invalid.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::PcmS16),
            2 => Some(Self::PcmS24),
            3 => Some(Self::PcmS32),
            4 => Some(Self::F32),
            _ => None,
        }
    }

    /// Bytes per sample for a single channel.
    pub const fn bytes_per_sample(self) -> u32 {
        match self {
            Self::PcmS16 => 2,
            Self::PcmS24 => 3,
            Self::PcmS32 | Self::F32 => 4,
        }
    }
}

/// Self-describing audio format published by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second, Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u32,
    /// Per-sample encoding.
    pub encoding: SampleEncoding,
}

impl AudioFormat {
    /// Bytes per fully specified sample frame across all channels.
    ///
    /// Every UDP segment length is a multiple of this.
    pub const fn block_align(&self) -> u32 {
        self.encoding.bytes_per_sample() * self.channels
    }

    /// Serialize the descriptor record.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DESCRIPTOR_LEN);
        out.extend_from_slice(&self.encoding.tag().to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out
    }

    /// Parse a descriptor record, validating every field.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DESCRIPTOR_LEN {
            return Err(CastError::Format {
                kind: FormatErrorKind::Truncated { len: bytes.len() },
            });
        }

        let word = |i: usize| u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());

        let encoding_tag = word(0);
        let encoding = SampleEncoding::from_tag(encoding_tag).ok_or(CastError::Format {
            kind: FormatErrorKind::UnknownEncoding(encoding_tag),
        })?;

        let channels = word(4);
        if channels == 0 {
            return Err(CastError::Format {
                kind: FormatErrorKind::ZeroChannels,
            });
        }

        let sample_rate = word(8);
        if sample_rate == 0 {
            return Err(CastError::Format {
                kind: FormatErrorKind::ZeroSampleRate,
            });
        }

        Ok(Self {
            sample_rate,
            channels,
            encoding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_f32() -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            encoding: SampleEncoding::F32,
        }
    }

    #[test]
    fn descriptor_round_trip() {
        let format = stereo_f32();
        let bytes = format.encode();
        assert_eq!(bytes.len(), DESCRIPTOR_LEN);
        assert_eq!(AudioFormat::decode(&bytes).unwrap(), format);
    }

    #[test]
    fn descriptor_is_little_endian() {
        let bytes = stereo_f32().encode();
        assert_eq!(&bytes[..4], &[4, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[2, 0, 0, 0]);
        // 48_000 = 0xBB80
        assert_eq!(&bytes[8..], &[0x80, 0xBB, 0, 0]);
    }

    #[test]
    fn decode_tolerates_trailing_bytes() {
        let mut bytes = stereo_f32().encode();
        bytes.extend_from_slice(&[0xFF; 8]);
        assert_eq!(AudioFormat::decode(&bytes).unwrap(), stereo_f32());
    }

    #[test]
    fn decode_rejects_truncated() {
        let err = AudioFormat::decode(&[0u8; 11]).unwrap_err();
        assert!(matches!(
            err,
            CastError::Format {
                kind: FormatErrorKind::Truncated { len: 11 }
            }
        ));
    }

    #[test]
    fn decode_rejects_unknown_encoding() {
        let mut bytes = stereo_f32().encode();
        bytes[..4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            AudioFormat::decode(&bytes).unwrap_err(),
            CastError::Format {
                kind: FormatErrorKind::UnknownEncoding(99)
            }
        ));
    }

    #[test]
    fn decode_rejects_zero_fields() {
        let mut bytes = stereo_f32().encode();
        bytes[4..8].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            AudioFormat::decode(&bytes).unwrap_err(),
            CastError::Format {
                kind: FormatErrorKind::ZeroChannels
            }
        ));

        let mut bytes = stereo_f32().encode();
        bytes[8..].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            AudioFormat::decode(&bytes).unwrap_err(),
            CastError::Format {
                kind: FormatErrorKind::ZeroSampleRate
            }
        ));
    }

    #[test]
    fn block_align_table() {
        let align = |encoding, channels| {
            AudioFormat {
                sample_rate: 48_000,
                channels,
                encoding,
            }
            .block_align()
        };
        assert_eq!(align(SampleEncoding::PcmS16, 2), 4);
        assert_eq!(align(SampleEncoding::PcmS24, 2), 6);
        assert_eq!(align(SampleEncoding::PcmS32, 2), 8);
        assert_eq!(align(SampleEncoding::F32, 1), 4);
        assert_eq!(align(SampleEncoding::F32, 6), 24);
    }
}
