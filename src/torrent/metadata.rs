//! Single-file torrent metadata: the typed projection the rest of the
//! client works against, over the dynamic `BencodeValue` the decoder
//! produces. Multi-file torrents are out of scope (see `Non-goals` in
//! the project's spec) and are rejected with `SchemaError`, not
//! silently ignored.
use crate::bencode::BencodeValue;
use crate::torrent::info_hash::calculate_info_hash;
use crate::torrent::{TorrentError, TorrentResult};

const PIECE_HASH_LEN: usize = 20;

/// A typed view over a decoded `.torrent` dictionary: announce URL,
/// suggested output file name, total payload length, nominal piece
/// length, and the concatenated 20-byte piece digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    pub announce: String,
    pub name: String,
    pub length: i64,
    pub piece_length: i64,
    pub pieces: Vec<u8>,
    pub info_hash: [u8; 20],
}

impl TorrentMetadata {
    /// Number of pieces, `P = len(pieces) / 20`.
    pub fn num_pieces(&self) -> usize {
        self.pieces.len() / PIECE_HASH_LEN
    }

    /// Expected SHA-1 digest for piece `index`.
    pub fn piece_hash(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(PIECE_HASH_LEN)?;
        let end = start.checked_add(PIECE_HASH_LEN)?;
        self.pieces.get(start..end)
    }

    /// Size in bytes of piece `index`. Every piece but the last is
    /// exactly `piece_length`; the last piece is whatever remains.
    ///
    /// Computed as `min(piece_length, length - index*piece_length)`
    /// rather than the `length / piece_length >= index` comparison
    /// some reference implementations use, which yields a spurious
    /// zero-length last piece whenever `length` is an exact multiple
    /// of `piece_length`.
    pub fn piece_size(&self, index: usize) -> i64 {
        let consumed = index as i64 * self.piece_length;
        std::cmp::min(self.piece_length, self.length - consumed)
    }

    #[tracing::instrument(level = "debug", skip(data))]
    pub fn parse(data: BencodeValue) -> TorrentResult<TorrentMetadata> {
        let root = data
            .as_dict()
            .ok_or_else(|| TorrentError::SchemaError("root is not a dictionary".into()))?;

        let announce = root
            .get(b"announce".as_slice())
            .and_then(BencodeValue::as_string)
            .ok_or_else(|| TorrentError::SchemaError("missing or invalid 'announce'".into()))?;
        let announce = String::from_utf8(announce.to_vec())
            .map_err(|e| TorrentError::SchemaError(format!("announce is not UTF-8: {e}")))?;

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| TorrentError::SchemaError("missing 'info'".into()))?;
        let info = info_value
            .as_dict()
            .ok_or_else(|| TorrentError::SchemaError("'info' is not a dictionary".into()))?;

        if info.contains_key(b"files".as_slice()) {
            return Err(TorrentError::SchemaError(
                "multi-file torrents are not supported".into(),
            ));
        }

        let name = info
            .get(b"name".as_slice())
            .and_then(BencodeValue::as_string)
            .ok_or_else(|| TorrentError::SchemaError("missing or invalid 'info.name'".into()))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|e| TorrentError::SchemaError(format!("info.name is not UTF-8: {e}")))?;

        let length = info
            .get(b"length".as_slice())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| TorrentError::SchemaError("missing or invalid 'info.length'".into()))?;
        if length <= 0 {
            return Err(TorrentError::SchemaError(
                "'info.length' must be positive".into(),
            ));
        }

        let piece_length = info
            .get(b"piece length".as_slice())
            .and_then(BencodeValue::as_integer)
            .ok_or_else(|| {
                TorrentError::SchemaError("missing or invalid 'info.piece length'".into())
            })?;
        if piece_length <= 0 {
            return Err(TorrentError::SchemaError(
                "'info.piece length' must be positive".into(),
            ));
        }

        let pieces = info
            .get(b"pieces".as_slice())
            .and_then(BencodeValue::as_string)
            .ok_or_else(|| TorrentError::SchemaError("missing or invalid 'info.pieces'".into()))?
            .to_vec();
        if pieces.len() % PIECE_HASH_LEN != 0 {
            return Err(TorrentError::InvalidPiecesHashLength);
        }

        let info_hash = calculate_info_hash(info)?;

        let metadata = TorrentMetadata {
            announce,
            name,
            length,
            piece_length,
            pieces,
            info_hash,
        };

        let num_pieces = metadata.num_pieces();
        if num_pieces == 0 {
            return Err(TorrentError::SchemaError("torrent has zero pieces".into()));
        }
        let last_size = metadata.piece_size(num_pieces - 1);
        if last_size <= 0 || last_size > metadata.piece_length {
            return Err(TorrentError::SchemaError(format!(
                "last piece size {last_size} out of range (0, {}]",
                metadata.piece_length
            )));
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decoder::decode;

    fn sample_bytes(length: i64, piece_length: i64, num_pieces: usize) -> Vec<u8> {
        let pieces: Vec<u8> = (0..num_pieces).flat_map(|i| [i as u8; 20]).collect();
        format!(
            "d8:announce20:http://tracker.test/4:infod6:lengthi{length}e12:piece lengthi{piece_length}e4:name1:x6:pieces{}:",
            pieces.len()
        )
        .into_bytes()
        .into_iter()
        .chain(pieces)
        .chain(*b"ee")
        .collect()
    }

    #[test]
    fn parses_exact_multiple_length() {
        let bytes = sample_bytes(32768, 16384, 2);
        let (value, _) = decode(&bytes).unwrap();
        let metadata = TorrentMetadata::parse(value).unwrap();
        assert_eq!(metadata.num_pieces(), 2);
        assert_eq!(metadata.piece_size(0), 16384);
        assert_eq!(metadata.piece_size(1), 16384);
    }

    #[test]
    fn parses_short_last_piece() {
        let bytes = sample_bytes(20000, 16384, 2);
        let (value, _) = decode(&bytes).unwrap();
        let metadata = TorrentMetadata::parse(value).unwrap();
        assert_eq!(metadata.piece_size(0), 16384);
        assert_eq!(metadata.piece_size(1), 20000 - 16384);
    }

    #[test]
    fn rejects_multi_file_torrent() {
        let bytes = b"d8:announce4:http4:infod6:lengthi1e12:piece lengthi1e4:name1:x5:filesle6:pieces20:aaaaaaaaaaaaaaaaaaaaee";
        let (value, _) = decode(bytes).unwrap();
        assert!(TorrentMetadata::parse(value).is_err());
    }

    #[test]
    fn rejects_bad_pieces_length() {
        let bytes = b"d8:announce4:http4:infod6:lengthi1e12:piece lengthi1e4:name1:x6:pieces3:abce";
        let (value, _) = decode(bytes).unwrap();
        assert!(matches!(
            TorrentMetadata::parse(value),
            Err(TorrentError::InvalidPiecesHashLength)
        ));
    }
}
