//! The BitTorrent peer handshake: the first 68 bytes exchanged between
//! two peers. It verifies both sides are talking about the same torrent
//! (via info_hash) and exchanges peer IDs.
use super::{PeerError, PeerResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::instrument;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// A parsed 68-byte handshake frame:
/// `<19><"BitTorrent protocol"><8 reserved><20 info_hash><20 peer_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    #[instrument(level = "trace", skip(stream))]
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Self> {
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await?;

        if buf[0] != 19 {
            return Err(PeerError::Handshake(format!(
                "unexpected protocol string length {}",
                buf[0]
            )));
        }
        if &buf[1..20] != PROTOCOL {
            return Err(PeerError::Handshake("unrecognized protocol string".into()));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    #[instrument(level = "trace", skip(stream, self))]
    pub async fn write(&self, stream: &mut TcpStream) -> PeerResult<()> {
        stream.write_all(&self.serialize()).await?;
        Ok(())
    }

    pub fn validate(&self, expected_info_hash: [u8; 20]) -> PeerResult<()> {
        if self.info_hash != expected_info_hash {
            return Err(PeerError::Handshake(format!(
                "info hash mismatch: got {}, expected {}",
                hex::encode(self.info_hash),
                hex::encode(expected_info_hash)
            )));
        }
        Ok(())
    }

    /// Connects to `peer_addr`, exchanges handshakes, and returns the
    /// peer's handshake once its info_hash has been validated.
    #[instrument(level = "debug", skip(peer_id))]
    pub async fn perform(
        peer_addr: std::net::SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<(TcpStream, Handshake)> {
        let mut stream = TcpStream::connect(peer_addr).await?;
        Handshake::new(info_hash, peer_id).write(&mut stream).await?;
        let peer_handshake = Handshake::read(&mut stream).await?;
        peer_handshake.validate(info_hash)?;
        Ok((stream, peer_handshake))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn serializes_to_68_bytes_with_expected_layout() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        let buf = hs.serialize();
        assert_eq!(buf.len(), 68);
        assert_eq!(buf[0], 19);
        assert_eq!(&buf[1..20], PROTOCOL);
        assert_eq!(&buf[28..48], &[1u8; 20]);
        assert_eq!(&buf[48..68], &[2u8; 20]);
    }

    #[test]
    fn validate_rejects_mismatched_info_hash() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        assert!(hs.validate([9u8; 20]).is_err());
        assert!(hs.validate([1u8; 20]).is_ok());
    }

    /// A cooperating local responder that mirrors back whatever 68
    /// bytes it receives, standing in for a remote peer whose identity
    /// is exactly the bytes this client sent it.
    #[tokio::test]
    async fn round_trips_through_a_loopback_echo_responder() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 68];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let info_hash = [7u8; 20];
        let peer_id = [9u8; 20];
        let (_stream, their_handshake) = Handshake::perform(addr, info_hash, peer_id)
            .await
            .unwrap();

        assert_eq!(their_handshake.info_hash, info_hash);
        assert_eq!(their_handshake.peer_id, peer_id);
    }
}
