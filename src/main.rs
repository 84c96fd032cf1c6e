//! Command-line entry point for rstc, a minimal BitTorrent client.
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rs_torrent_client::bencode::{decoder, BencodeValue};
use rs_torrent_client::peer::handshake::Handshake;
use rs_torrent_client::peer::PeerId;
use rs_torrent_client::torrent::TorrentMetadata;
use rs_torrent_client::tracker::Client as TrackerClient;
use rs_torrent_client::{download, piece};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rstc", about = "A minimal BitTorrent client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a bencoded literal and print it as JSON.
    Decode { bencode: String },
    /// Print metadata parsed from a .torrent file.
    Info { file: PathBuf },
    /// Announce to the tracker and print the peer list.
    Peers { file: PathBuf },
    /// Perform a handshake with a single peer and print its peer ID.
    Handshake { file: PathBuf, peer_addr: String },
    /// Download a single piece of a torrent to a file.
    #[command(alias = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        file: PathBuf,
        index: usize,
    },
    /// Download the whole file described by a torrent.
    Download {
        #[arg(short, long)]
        output: PathBuf,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Decode { bencode } => {
            let (value, _) = decoder::decode(bencode.as_bytes())
                .map_err(|e| anyhow!(e))
                .context("failed to decode bencode literal")?;
            println!("{}", bencode_to_json(&value));
        }

        Command::Info { file } => {
            let metadata = load_metadata(&file)?;
            println!("Tracker URL: {}", metadata.announce);
            println!("Length: {}", metadata.length);
            println!("Info Hash: {}", hex::encode(metadata.info_hash));
            println!("Piece Length: {}", metadata.piece_length);
            println!("Piece Hashes:");
            for i in 0..metadata.num_pieces() {
                println!("{}", hex::encode(metadata.piece_hash(i).unwrap()));
            }
        }

        Command::Peers { file } => {
            let metadata = load_metadata(&file)?;
            let client = TrackerClient::new(6881);
            let response = client.announce(&metadata).await.context("tracker announce failed")?;
            for peer in response.peers {
                println!("{peer}");
            }
        }

        Command::Handshake { file, peer_addr } => {
            let metadata = load_metadata(&file)?;
            let addr = peer_addr
                .parse()
                .with_context(|| format!("invalid peer address '{peer_addr}'"))?;
            let peer_id = generate_peer_id();
            let (_stream, their_handshake) = Handshake::perform(addr, metadata.info_hash, peer_id)
                .await
                .context("handshake failed")?;
            println!("Peer ID: {}", PeerId::from(their_handshake.peer_id));
        }

        Command::DownloadPiece { output, file, index } => {
            let metadata = load_metadata(&file)?;
            let client = TrackerClient::new(6881);
            let response = client.announce(&metadata).await.context("tracker announce failed")?;
            let peer = response.peers.first().ok_or_else(|| anyhow!("tracker returned no peers"))?;
            let bytes = piece::download_piece(peer.socket_addr(), &metadata, client.peer_id(), index)
                .await
                .context("failed to download piece")?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Piece {index} downloaded to {}.", output.display());
        }

        Command::Download { output, file } => {
            let metadata = load_metadata(&file)?;
            download::download_file(&metadata, &output)
                .await
                .context("failed to download torrent")?;
            println!("Downloaded {} to {}.", metadata.name, output.display());
        }
    }

    Ok(())
}

fn load_metadata(path: &PathBuf) -> Result<TorrentMetadata> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let (value, _) = decoder::decode(&bytes)
        .map_err(|e| anyhow!(e))
        .context("failed to decode torrent file as bencode")?;
    TorrentMetadata::parse(value)
        .map_err(|e| anyhow!(e))
        .context("torrent file did not match the expected schema")
}

fn generate_peer_id() -> [u8; 20] {
    use rand::Rng;
    let mut id = [0u8; 20];
    id[..8].copy_from_slice(b"-RT0001-");
    rand::rng().fill(&mut id[8..]);
    id
}

/// Converts a decoded bencode value into `serde_json::Value`. Byte
/// strings that are not valid UTF-8 fall back to a lossy conversion:
/// JSON has no byte-string type, and this output is for human
/// inspection rather than round-tripping.
fn bencode_to_json(value: &BencodeValue) -> serde_json::Value {
    match value {
        BencodeValue::String(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        },
        BencodeValue::Integer(i) => serde_json::Value::Number((*i).into()),
        BencodeValue::List(items) => serde_json::Value::Array(items.iter().map(bencode_to_json).collect()),
        BencodeValue::Dict(dict) => {
            let map = dict
                .iter()
                .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), bencode_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}
