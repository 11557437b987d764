//! Socket plumbing: the TCP control channel and the UDP audio channel.
//!
//! Both transports bind the same `(host, port)`. TCP carries the framed
//! session protocol; UDP carries the 4-byte hello inbound and bare PCM
//! segments outbound. All loops are cancellable: they poll the server's
//! running flag between socket operations.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
