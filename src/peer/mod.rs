//! BitTorrent peer-wire protocol: handshake, framed messages, and the
//! small per-connection state machine used to download a single piece.
pub mod connection;
pub mod handshake;
pub mod message;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;

/// A peer's 20-byte identity, as carried in the handshake's final 20
/// bytes. A thin newtype over the raw array so call sites that only
/// want to print it (e.g. the `handshake` CLI subcommand) get a
/// `Display` impl instead of hand-rolling `hex::encode` themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerId(pub [u8; 20]);

impl From<[u8; 20]> for PeerId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The states a connection passes through while fetching one piece.
/// The implementation does not track `choked` transitions after the
/// first unchoke: once unchoked, a connection is assumed usable until
/// an I/O failure proves otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Fresh,
    Handshaken,
    BitfieldSeen,
    Interested,
    Unchoked,
    Closed,
}
