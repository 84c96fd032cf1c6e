//! Whole-file download orchestration: announces to the tracker, then
//! downloads every piece concurrently, trying peers in order for each
//! piece until one succeeds.
//!
//! Pieces occupy disjoint byte ranges of the output file, so each
//! write task can use a positional write (`write_at`) against a shared
//! file handle with no locking: two tasks never touch the same bytes.
use crate::piece::{download_piece, PieceError};
use crate::torrent::TorrentMetadata;
use crate::tracker::{Client as TrackerClient, Peer, TrackerError};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("tracker announce failed: {0}")]
    Tracker(#[from] TrackerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no peers were returned by the tracker")]
    NoPeers,

    #[error("piece {index} could not be downloaded from any of {tried} peer(s): {source}")]
    PieceFailed {
        index: usize,
        tried: usize,
        #[source]
        source: PieceError,
    },

    #[error("background download task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Downloads the whole file described by `metadata` into `output_path`,
/// spreading piece downloads across the peers reported by the tracker.
#[instrument(level = "info", skip(metadata), fields(name = %metadata.name))]
pub async fn download_file(metadata: &TorrentMetadata, output_path: &Path) -> DownloadResult<()> {
    let tracker = TrackerClient::new(6881);
    let announce = tracker.announce(metadata).await?;
    if announce.peers.is_empty() {
        return Err(DownloadError::NoPeers);
    }
    tracing::info!(peer_count = announce.peers.len(), "received peer list from tracker");

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output_path)?;
    file.set_len(metadata.length as u64)?;
    let file = Arc::new(file);

    let metadata = Arc::new(metadata.clone());
    let peers: Arc<Vec<Peer>> = Arc::new(announce.peers);
    let peer_id = tracker.peer_id();

    let mut tasks = Vec::with_capacity(metadata.num_pieces());
    for index in 0..metadata.num_pieces() {
        let metadata = Arc::clone(&metadata);
        let peers = Arc::clone(&peers);
        let file = Arc::clone(&file);
        tasks.push(tokio::spawn(async move {
            download_and_write_piece(metadata, peers, file, index, peer_id).await
        }));
    }

    for task in tasks {
        task.await??;
    }

    Ok(())
}

/// Tries every peer in order for one piece, writes the verified piece
/// at its absolute file offset, and gives up only once every peer has
/// failed.
#[instrument(level = "debug", skip(metadata, peers, file, peer_id))]
async fn download_and_write_piece(
    metadata: Arc<TorrentMetadata>,
    peers: Arc<Vec<Peer>>,
    file: Arc<std::fs::File>,
    index: usize,
    peer_id: [u8; 20],
) -> DownloadResult<()> {
    let mut last_error = None;
    for peer in peers.iter() {
        match download_piece(peer.socket_addr(), &metadata, peer_id, index).await {
            Ok(piece) => {
                let offset = index as u64 * metadata.piece_length as u64;
                let file = Arc::clone(&file);
                tokio::task::spawn_blocking(move || write_at_all(&file, &piece, offset)).await??;
                tracing::debug!(index, peer = %peer, "piece verified and written");
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(index, peer = %peer, error = %err, "peer failed, trying next");
                last_error = Some(err);
            }
        }
    }

    Err(DownloadError::PieceFailed {
        index,
        tried: peers.len(),
        source: last_error.expect("peers list was checked non-empty by the caller"),
    })
}

/// `write_at` only guarantees it writes *some* prefix of `buf`; loop
/// until the whole piece has landed, same as `write_all` does for
/// sequential writers.
fn write_at_all(file: &std::fs::File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    while !buf.is_empty() {
        let written = file.write_at(buf, offset)?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole piece buffer",
            ));
        }
        buf = &buf[written..];
        offset += written as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Piece byte ranges must never overlap, for any piece count and
    /// any (possibly short) last piece -- this is what lets every
    /// piece task write through the shared file handle without a lock.
    #[test]
    fn piece_offsets_are_disjoint_and_cover_the_file() {
        let piece_length: u64 = 16384;
        let length: u64 = 16384 * 3 + 500; // last piece is short
        let num_pieces = ((length + piece_length - 1) / piece_length) as usize;

        let mut ranges = Vec::with_capacity(num_pieces);
        for index in 0..num_pieces {
            let offset = index as u64 * piece_length;
            let size = std::cmp::min(piece_length, length - offset);
            ranges.push(offset..offset + size);
        }

        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a, b) = (&ranges[i], &ranges[j]);
                assert!(a.end <= b.start || b.end <= a.start, "ranges {a:?} and {b:?} overlap");
            }
        }
        assert_eq!(ranges.last().unwrap().end, length);
    }

    /// `write_at_all` must place each piece's bytes at its absolute
    /// offset in the output file regardless of write order, so the
    /// assembled file is byte-identical no matter which piece task
    /// finishes first.
    #[test]
    fn write_at_all_places_bytes_at_the_right_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.set_len(32).unwrap();

        // Write the second half before the first, mirroring that piece
        // tasks complete in no particular order.
        write_at_all(&file, &[2u8; 16], 16).unwrap();
        write_at_all(&file, &[1u8; 16], 0).unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(&contents[0..16], &[1u8; 16][..]);
        assert_eq!(&contents[16..32], &[2u8; 16][..]);
    }
}
