//! Torrent file parsing and error handling logic.
//!
//! This module provides types and error handling for working with
//! `.torrent` files: decoding, schema validation, and the info-hash.
use thiserror::Error;
pub mod info_hash;
pub mod metadata;

pub use metadata::TorrentMetadata;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("torrent metadata does not match the expected schema: {0}")]
    SchemaError(String),

    #[error("invalid pieces hash length (not a multiple of 20)")]
    InvalidPiecesHashLength,
}

/// Result type for torrent operations derived from `std::result`
pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
