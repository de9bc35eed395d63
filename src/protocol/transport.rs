use std::io::{self, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint, Limit},
};
use thiserror::Error;

use super::{Request, Response};

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const MAGIC: [u8; 4] = *b"BRTH";
const VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_SIZE)]
    FrameTooLarge(usize),
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl TransportError {
    /// Whether the stream is still aligned on a frame boundary after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Serialize(_) | TransportError::Deserialize(_)
        )
    }
}

pub(crate) type WireConfig = Configuration<BigEndian, Fixint, Limit<MAX_FRAME_SIZE>>;

/// Decoding is capped at the frame size so a corrupt length field can
/// never trigger a huge allocation.
pub(crate) fn wire_config() -> WireConfig {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_FRAME_SIZE>()
}

#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct Hello {
    magic: [u8; 4],
    version: u16,
}

/// Length-prefixed bincode framing over any bidirectional stream.
///
/// Every frame is a big-endian `u32` payload length followed by the
/// payload. A payload that fails to decode is consumed in full, so the
/// next read starts on a frame boundary.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: WireConfig,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            config: wire_config(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Announces this end and waits for the peer's announcement.
    ///
    /// Both ends write before they read, so neither side waits on the
    /// other to go first.
    pub fn handshake(&mut self) -> Result<(), TransportError> {
        self.write_frame(&Hello {
            magic: MAGIC,
            version: VERSION,
        })?;

        let peer: Hello = self.read_frame()?;
        if peer.magic != MAGIC {
            return Err(TransportError::Handshake(format!(
                "unexpected magic {:?}",
                peer.magic
            )));
        }
        if peer.version != VERSION {
            return Err(TransportError::Handshake(format!(
                "unsupported protocol version {} (expected {VERSION})",
                peer.version
            )));
        }
        Ok(())
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        self.write_frame(req)
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        self.write_frame(resp)
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        self.read_frame()
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        self.read_frame()
    }

    fn write_frame<M: Encode>(&mut self, message: &M) -> Result<(), TransportError> {
        let payload = bincode::encode_to_vec(message, self.config)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);

        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_frame<M: Decode<()>>(&mut self) -> Result<M, TransportError> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;

        let (message, _) = bincode::decode_from_slice(&payload, self.config)?;
        Ok(message)
    }
}
