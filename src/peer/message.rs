//! Framed peer-wire messages: `<length:u32 be><id:u8><payload>`.
//!
//! Only the subset this client needs to download a torrent is modeled
//! (bitfield, interested, unchoke, request, piece). A zero-length frame
//! is a keep-alive; it carries no id and is skipped transparently by
//! `read_message` rather than surfaced as a protocol error.
use super::{PeerError, PeerResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const ID_UNCHOKE: u8 = 1;
const ID_INTERESTED: u8 = 2;
const ID_BITFIELD: u8 = 5;
const ID_REQUEST: u8 = 6;
const ID_PIECE: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Bitfield(Vec<u8>),
    Interested,
    Unchoke,
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
}

impl Message {
    fn id(&self) -> u8 {
        match self {
            Message::Bitfield(_) => ID_BITFIELD,
            Message::Interested => ID_INTERESTED,
            Message::Unchoke => ID_UNCHOKE,
            Message::Request { .. } => ID_REQUEST,
            Message::Piece { .. } => ID_PIECE,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Message::Bitfield(bits) => bits.clone(),
            Message::Interested | Message::Unchoke => Vec::new(),
            Message::Request { index, begin, length } => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
                buf
            }
            Message::Piece { index, begin, block } => {
                let mut buf = Vec::with_capacity(8 + block.len());
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(block);
                buf
            }
        }
    }

    fn decode(id: u8, payload: Vec<u8>) -> PeerResult<Message> {
        match id {
            ID_BITFIELD => Ok(Message::Bitfield(payload)),
            ID_UNCHOKE => Ok(Message::Unchoke),
            ID_REQUEST => {
                if payload.len() != 12 {
                    return Err(PeerError::Protocol("request payload must be 12 bytes".into()));
                }
                Ok(Message::Request {
                    index: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
                    begin: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
                    length: u32::from_be_bytes(payload[8..12].try_into().unwrap()),
                })
            }
            ID_PIECE => {
                if payload.len() < 8 {
                    return Err(PeerError::Protocol("piece payload too short".into()));
                }
                Ok(Message::Piece {
                    index: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
                    begin: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
                    block: payload[8..].to_vec(),
                })
            }
            other => Err(PeerError::Protocol(format!("unexpected message id {other}"))),
        }
    }

    #[tracing::instrument(skip(stream, self), level = "trace")]
    pub async fn write(&self, stream: &mut TcpStream) -> PeerResult<()> {
        let payload = self.payload();
        let length = 1 + payload.len() as u32;
        stream.write_all(&length.to_be_bytes()).await?;
        stream.write_all(&[self.id()]).await?;
        stream.write_all(&payload).await?;
        Ok(())
    }

    /// Reads one framed message, transparently skipping any number of
    /// leading zero-length keep-alive frames.
    #[tracing::instrument(skip(stream), level = "trace")]
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Message> {
        loop {
            let mut length_buf = [0u8; 4];
            stream.read_exact(&mut length_buf).await?;
            let length = u32::from_be_bytes(length_buf);
            if length == 0 {
                continue; // keep-alive
            }

            let mut id_buf = [0u8; 1];
            stream.read_exact(&mut id_buf).await?;
            let payload_len = (length - 1) as usize;
            let mut payload = vec![0u8; payload_len];
            stream.read_exact(&mut payload).await?;

            return Message::decode(id_buf[0], payload);
        }
    }
}
