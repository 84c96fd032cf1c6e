//! Tracker client logic for the BitTorrent protocol.
//!
//! This module implements communication with BitTorrent trackers, including:
//! - Announce requests and responses
//! - Peer parsing (compact and non-compact)
//! - Peer ID generation and URL encoding helpers
//!
//! Used by the client to discover peers for a torrent.
use crate::torrent::TorrentMetadata;
use rand::Rng;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP request to tracker failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker announce URL is invalid: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("tracker response is not valid bencode: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("tracker returned a non-2xx status: {0}")]
    BadStatus(reqwest::StatusCode),

    #[error("tracker peer list length is not a multiple of 6")]
    InvalidPeerListLength,
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Represents a client communicating with a BitTorrent tracker.
#[derive(Debug)]
pub struct Client {
    peer_id: [u8; 20],
    port: u16,
}

/// Contains the parameters for a tracker announce request.
#[derive(Debug)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: i64,
    pub downloaded: i64,
    pub compact: bool,
    pub left: i64,
}

/// A peer address reported by the tracker: an IPv4 octet quadruple
/// plus a big-endian 16-bit port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
}

impl Peer {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Contains the parsed response from a tracker. `interval` is parsed
/// but never acted on: this client never re-announces.
#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<Peer>,
}

#[derive(Debug, Deserialize)]
struct RawTrackerResponse {
    #[serde(default)]
    interval: i64,
    #[serde(default)]
    peers: RawPeers,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPeers {
    Compact(serde_bytes::ByteBuf),
    NonCompact(Vec<RawPeerDict>),
}

impl Default for RawPeers {
    fn default() -> Self {
        RawPeers::Compact(serde_bytes::ByteBuf::new())
    }
}

#[derive(Debug, Deserialize)]
struct RawPeerDict {
    ip: String,
    port: u16,
}

impl Client {
    pub fn new(port: u16) -> Self {
        Self {
            peer_id: generate_peer_id(),
            port,
        }
    }

    /// The peer ID this client announces and hands to peers during the
    /// handshake. Kept stable for the client's lifetime so a peer or
    /// tracker never sees two different identities from the same run.
    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Sends an announce request to the tracker to get a list of peers.
    #[tracing::instrument(skip(self, metadata), level = "debug")]
    pub async fn announce(&self, metadata: &TorrentMetadata) -> TrackerResult<AnnounceResponse> {
        let request = AnnounceRequest {
            info_hash: metadata.info_hash,
            peer_id: self.peer_id,
            port: self.port,
            uploaded: 0,
            downloaded: 0,
            compact: true,
            left: metadata.length,
        };

        let base_url = url::Url::parse(&metadata.announce)?;
        // info_hash/peer_id need raw-byte percent-encoding; Url's own
        // query-pair encoder would double-encode the '%' sign, so the
        // query string is built by hand instead.
        let url = raw_query_url(&base_url, &request);

        tracing::debug!(%url, "making announce request to tracker");
        let response = reqwest::get(url).await?;
        if !response.status().is_success() {
            return Err(TrackerError::BadStatus(response.status()));
        }
        let response_bytes = response.bytes().await?;
        Self::parse_announce_response(&response_bytes)
    }

    /// Parses the bencoded body of a tracker announce response into an
    /// `AnnounceResponse`, handling both the compact peer-string form
    /// and the legacy list-of-dictionaries form.
    fn parse_announce_response(bytes: &[u8]) -> TrackerResult<AnnounceResponse> {
        let raw: RawTrackerResponse = serde_bencode::from_bytes(bytes)?;

        let peers = match raw.peers {
            RawPeers::Compact(bytes) => {
                if bytes.len() % 6 != 0 {
                    return Err(TrackerError::InvalidPeerListLength);
                }
                bytes
                    .chunks_exact(6)
                    .map(|chunk| {
                        let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                        let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                        Peer {
                            ip: IpAddr::V4(ip),
                            port,
                        }
                    })
                    .collect()
            }
            RawPeers::NonCompact(dicts) => dicts
                .into_iter()
                .filter_map(|dict| {
                    dict.ip
                        .parse::<IpAddr>()
                        .ok()
                        .map(|ip| Peer { ip, port: dict.port })
                })
                .collect(),
        };

        Ok(AnnounceResponse {
            interval: raw.interval,
            peers,
        })
    }
}

/// Builds the final announce URL with a pre-percent-encoded query
/// string, since `info_hash`/`peer_id` need raw-byte percent-encoding
/// that `url::Url`'s form-encoder (which escapes the literal `%`) would
/// otherwise mangle.
fn raw_query_url(url: &url::Url, request: &AnnounceRequest) -> String {
    let mut base = url.clone();
    base.set_query(None);
    format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact={}",
        base,
        if base.query().is_some() { "&" } else { "?" },
        url_encode(&request.info_hash),
        url_encode(&request.peer_id),
        request.port,
        request.uploaded,
        request.downloaded,
        request.left,
        if request.compact { 1 } else { 0 },
    )
}

/// Generates a unique peer ID for this client: an 8-byte client
/// signature followed by 12 random bytes.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

/// URL-encodes a byte slice according to RFC 3986: unreserved
/// characters pass through, everything else becomes `%XX`.
fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_unreserved_chars_unchanged() {
        assert_eq!(url_encode(b"abc-._~"), "abc-._~");
    }

    #[test]
    fn url_encodes_arbitrary_bytes() {
        assert_eq!(url_encode(&[0x00, 0xff, b' ']), "%00%FF%20");
    }

    #[test]
    fn parses_compact_peer_list() {
        let mut body = Vec::new();
        body.extend_from_slice(b"d8:intervali1800e5:peers12:");
        body.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
        body.extend_from_slice(&[10, 0, 0, 2, 0x1A, 0xE2]);
        body.extend_from_slice(b"e");

        let response = Client::parse_announce_response(&body).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].port, 0x1AE1);
        assert_eq!(response.peers[0].ip, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn rejects_peer_list_not_multiple_of_six() {
        let body = b"d8:intervali1800e5:peers3:abce";
        assert!(matches!(
            Client::parse_announce_response(body),
            Err(TrackerError::InvalidPeerListLength)
        ));
    }

    #[test]
    fn generated_peer_ids_are_20_bytes_with_client_prefix() {
        let id = generate_peer_id();
        assert_eq!(id.len(), 20);
        assert_eq!(&id[..8], b"-RT0001-");
    }
}
