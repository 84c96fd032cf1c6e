//! Drives one peer through the state machine needed to request pieces:
//! handshake, receive its bitfield, announce interest, wait for unchoke.
//! Thin enough that `piece.rs` talks to the underlying `TcpStream`
//! directly for the request/piece exchange once a connection is ready.
use super::handshake::Handshake;
use super::message::Message;
use super::{ConnectionState, PeerError, PeerResult};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::instrument;

pub struct PeerConnection {
    pub stream: TcpStream,
    pub state: ConnectionState,
    pub bitfield: Option<Vec<u8>>,
}

impl PeerConnection {
    /// Connects, performs the handshake, and leaves the connection in
    /// `Handshaken` state ready for `await_ready`.
    #[instrument(level = "debug", skip(peer_id))]
    pub async fn open(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<Self> {
        let (stream, _their_handshake) = Handshake::perform(addr, info_hash, peer_id).await?;
        Ok(Self {
            stream,
            state: ConnectionState::Handshaken,
            bitfield: None,
        })
    }

    /// Reads the peer's bitfield, sends `interested`, and blocks until
    /// `unchoke` arrives. Any other message received before unchoke is a
    /// protocol error: this client never pipelines or requests anything
    /// out of order, so nothing else should arrive first.
    #[instrument(level = "debug", skip(self))]
    pub async fn await_ready(&mut self) -> PeerResult<()> {
        match Message::read(&mut self.stream).await? {
            Message::Bitfield(bits) => {
                self.bitfield = Some(bits);
                self.state = ConnectionState::BitfieldSeen;
            }
            other => {
                return Err(PeerError::Protocol(format!(
                    "expected bitfield, got {other:?}"
                )))
            }
        }

        Message::Interested.write(&mut self.stream).await?;
        self.state = ConnectionState::Interested;

        match Message::read(&mut self.stream).await? {
            Message::Unchoke => {
                self.state = ConnectionState::Unchoked;
                Ok(())
            }
            other => Err(PeerError::Protocol(format!(
                "expected unchoke, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_state_ordering() {
        assert_ne!(ConnectionState::Fresh, ConnectionState::Unchoked);
    }
}
