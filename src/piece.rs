//! Downloads and verifies a single piece from a single peer.
//!
//! A piece is split into 16 KiB blocks requested sequentially (no
//! pipelining): each `request` is followed by its matching `piece`
//! message before the next `request` is sent. Once all blocks are in,
//! the assembled piece is SHA-1 hashed and compared byte-for-byte
//! against the torrent's recorded digest -- not the digest's hex
//! encoding, which a piece full of zero bytes could accidentally match.
use crate::peer::connection::PeerConnection;
use crate::peer::message::Message;
use crate::peer::{PeerError, PeerResult};
use crate::torrent::TorrentMetadata;
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::instrument;

const BLOCK_SIZE: u32 = 16 * 1024;

#[derive(Debug, Error)]
pub enum PieceError {
    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("piece index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("downloaded piece {index} failed hash verification")]
    HashMismatch { index: usize },
}

pub type PieceResult<T> = std::result::Result<T, PieceError>;

/// Connects to `addr`, downloads piece `index` of `metadata`, and
/// verifies it before returning the piece bytes.
#[instrument(level = "debug", skip(metadata, peer_id))]
pub async fn download_piece(
    addr: SocketAddr,
    metadata: &TorrentMetadata,
    peer_id: [u8; 20],
    index: usize,
) -> PieceResult<Vec<u8>> {
    if index >= metadata.num_pieces() {
        return Err(PieceError::IndexOutOfRange(index));
    }

    let mut conn = PeerConnection::open(addr, metadata.info_hash, peer_id).await?;
    conn.await_ready().await?;

    let piece_size = metadata.piece_size(index) as u32;
    let piece = download_piece_from_connection(&mut conn, index as u32, piece_size).await?;

    let expected = metadata
        .piece_hash(index)
        .expect("index already range-checked above");
    let mut hasher = Sha1::new();
    hasher.update(&piece);
    let actual: [u8; 20] = hasher.finalize().into();

    if actual.as_slice() != expected {
        return Err(PieceError::HashMismatch { index });
    }

    Ok(piece)
}

/// Requests every 16 KiB block of a piece, one at a time, over an
/// already-unchoked connection.
async fn download_piece_from_connection(
    conn: &mut PeerConnection,
    index: u32,
    piece_size: u32,
) -> PieceResult<Vec<u8>> {
    let mut piece = vec![0u8; piece_size as usize];
    let mut begin = 0u32;

    while begin < piece_size {
        let length = std::cmp::min(BLOCK_SIZE, piece_size - begin);

        Message::Request { index, begin, length }
            .write(&mut conn.stream)
            .await?;

        match Message::read(&mut conn.stream).await? {
            Message::Piece {
                index: got_index,
                begin: got_begin,
                block,
            } => {
                if got_index != index || got_begin != begin || block.len() as u32 != length {
                    return Err(PieceError::Peer(PeerError::Protocol(format!(
                        "unexpected piece block: index={got_index} begin={got_begin} len={}",
                        block.len()
                    ))));
                }
                piece[begin as usize..(begin + length) as usize].copy_from_slice(&block);
            }
            other => {
                return Err(PieceError::Peer(PeerError::Protocol(format!(
                    "expected piece message, got {other:?}"
                ))))
            }
        }

        begin += length;
    }

    Ok(piece)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_divides_evenly_into_standard_piece_length() {
        assert_eq!(256 * 1024 % BLOCK_SIZE, 0);
    }

    #[test]
    fn rejects_out_of_range_hash_comparison_as_bytes_not_hex() {
        // A piece of all-zero bytes must not accidentally satisfy a
        // hex-string comparison against its own hex-encoded digest.
        let zero_piece = vec![0u8; 16384];
        let mut hasher = Sha1::new();
        hasher.update(&zero_piece);
        let digest: [u8; 20] = hasher.finalize().into();
        let hex_digest = hex::encode(digest);
        assert_ne!(digest.as_slice(), hex_digest.as_bytes());
    }
}
