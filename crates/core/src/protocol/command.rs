//! Command tags and control-channel framing.

/// Length in bytes of a command tag on the wire.
pub const TAG_LEN: usize = 4;

/// Length in bytes of a UDP hello datagram.
pub const HELLO_LEN: usize = 4;

/// Control-channel command, carried as a little-endian `u32` tag.
///
/// The set is closed: any other tag value is a protocol violation and the
/// receiving side closes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// Reserved. Never valid on the wire; treated as a violation.
    None = 0,
    /// Request the audio-format descriptor.
    GetFormat = 1,
    /// Request admission to the audio stream.
    StartPlay = 2,
    /// Liveness signal, sent by either side.
    Heartbeat = 3,
}

impl Command {
    /// The wire tag for this command.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a wire tag. `None` for tags outside the command set.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::GetFormat),
            2 => Some(Self::StartPlay),
            3 => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// Serialize the tag as it appears on the wire.
    pub fn to_bytes(self) -> [u8; TAG_LEN] {
        self.tag().to_le_bytes()
    }
}

/// Build a GetFormat reply: `tag | size | descriptor`.
///
/// `size` is the exact descriptor length; the descriptor bytes are opaque to
/// this layer.
pub fn encode_format_reply(descriptor: &[u8]) -> Vec<u8> {
    let mut reply = Vec::with_capacity(TAG_LEN * 2 + descriptor.len());
    reply.extend_from_slice(&Command::GetFormat.to_bytes());
    reply.extend_from_slice(&(descriptor.len() as u32).to_le_bytes());
    reply.extend_from_slice(descriptor);
    reply
}

/// Build a StartPlay reply: `tag | id`. An id of 0 signals rejection.
pub fn encode_start_play_reply(id: u32) -> [u8; 8] {
    let mut reply = [0u8; 8];
    reply[..4].copy_from_slice(&Command::StartPlay.to_bytes());
    reply[4..].copy_from_slice(&id.to_le_bytes());
    reply
}

/// Build the UDP hello datagram carrying the assigned session id.
pub fn encode_hello(id: u32) -> [u8; HELLO_LEN] {
    id.to_le_bytes()
}

/// Decode a hello datagram. `None` unless it is exactly 4 bytes.
pub fn decode_hello(datagram: &[u8]) -> Option<u32> {
    let bytes: [u8; HELLO_LEN] = datagram.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        for cmd in [
            Command::None,
            Command::GetFormat,
            Command::StartPlay,
            Command::Heartbeat,
        ] {
            assert_eq!(Command::from_tag(cmd.tag()), Some(cmd));
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        assert_eq!(Command::from_tag(4), None);
        assert_eq!(Command::from_tag(0xDEAD), None);
        assert_eq!(Command::from_tag(u32::MAX), None);
    }

    #[test]
    fn tags_are_little_endian() {
        assert_eq!(Command::StartPlay.to_bytes(), [2, 0, 0, 0]);
    }

    #[test]
    fn format_reply_framing() {
        let reply = encode_format_reply(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(&reply[..4], &[1, 0, 0, 0]);
        assert_eq!(&reply[4..8], &[3, 0, 0, 0]);
        assert_eq!(&reply[8..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn start_play_reply_framing() {
        let reply = encode_start_play_reply(0x0102_0304);
        assert_eq!(&reply[..4], &[2, 0, 0, 0]);
        assert_eq!(&reply[4..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn hello_round_trip() {
        assert_eq!(decode_hello(&encode_hello(7)), Some(7));
    }

    #[test]
    fn hello_rejects_runt_and_oversize() {
        assert_eq!(decode_hello(&[1, 0, 0]), None);
        assert_eq!(decode_hello(&[1, 0, 0, 0, 0]), None);
        assert_eq!(decode_hello(&[]), None);
    }
}
