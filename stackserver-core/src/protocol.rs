//! Wire format for the single request/response exchange.
//!
//! # Request
//!
//! ```text
//!  bit 7   bits 0-6
//! ┌──────┬──────────┐┌──────────────────────┐
//! │  op  │  length  ││ payload (push only)  │
//! └──────┴──────────┘└──────────────────────┘
//! ```
//!
//! - `op = 1`: pop. The header byte alone is the whole request; length bits
//!   are ignored.
//! - `op = 0`: push. Exactly `length` (0..=127) payload bytes follow.
//!
//! Bytes beyond the declared length are discarded.
//!
//! # Response
//!
//! | Outcome | Bytes |
//! |---------|-------|
//! | push ok | `0x00` |
//! | pop ok | raw payload |
//! | admission rejected | `0xff` |
//! | anything else | none (connection closed) |

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::ProtocolError;
use crate::payload::{MAX_PAYLOAD_LEN, Payload};

/// Bit 7 of the header: set for pop, clear for push.
pub const POP_FLAG: u8 = 0x80;

/// Bits 0-6 of the header: push payload length.
pub const LENGTH_MASK: u8 = 0x7f;

/// Single-byte acknowledgment for a successful push.
pub const PUSH_ACK: u8 = 0x00;

/// Single-byte reply sent when admission is rejected.
pub const BUSY: u8 = 0xff;

/// Largest possible request: header plus a full payload.
pub const MAX_REQUEST_LEN: usize = 1 + MAX_PAYLOAD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Push,
    Pop,
}

/// A decoded request header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(u8);

impl Header {
    #[must_use]
    pub fn new(byte: u8) -> Self {
        Self(byte)
    }

    #[must_use]
    pub fn opcode(self) -> Opcode {
        if self.0 & POP_FLAG != 0 {
            Opcode::Pop
        } else {
            Opcode::Push
        }
    }

    /// Payload length this header announces. Always zero for pop.
    #[must_use]
    pub fn payload_len(self) -> usize {
        match self.opcode() {
            Opcode::Pop => 0,
            Opcode::Push => usize::from(self.0 & LENGTH_MASK),
        }
    }

    /// Total request length, header byte included.
    #[must_use]
    pub fn request_len(self) -> usize {
        1 + self.payload_len()
    }
}

/// One decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Push(Payload),
    Pop,
}

impl Request {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Push(_) => Opcode::Push,
            Self::Pop => Opcode::Pop,
        }
    }

    /// Encode the request as a client would send it.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Pop => Bytes::from_static(&[POP_FLAG]),
            Self::Push(payload) => {
                let mut buf = Vec::with_capacity(1 + payload.len());
                // Payload::new caps the length at 127, so this fits in 7 bits.
                buf.push(payload.len() as u8);
                buf.extend_from_slice(payload.as_bytes());
                Bytes::from(buf)
            }
        }
    }
}

/// Outcome of [`decode`] on a partial buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full request was found. `consumed` bytes belong to it; anything
    /// after that is surplus the caller discards.
    Complete { request: Request, consumed: usize },
    /// More bytes are needed. `expected` is the full request length.
    Incomplete { expected: usize },
}

/// Decode a request from the bytes received so far.
#[must_use]
pub fn decode(buf: &[u8]) -> Decoded {
    let Some(&first) = buf.first() else {
        return Decoded::Incomplete { expected: 1 };
    };
    let header = Header::new(first);
    let expected = header.request_len();

    if buf.len() < expected {
        return Decoded::Incomplete { expected };
    }

    let request = match header.opcode() {
        Opcode::Pop => Request::Pop,
        Opcode::Push => Request::Push(Payload::from_wire(&buf[1..expected])),
    };
    Decoded::Complete {
        request,
        consumed: expected,
    }
}

/// Read exactly one request off `reader`.
///
/// Reads into a fixed [`MAX_REQUEST_LEN`] buffer until the header's declared
/// length is satisfied. Surplus bytes that arrive in the same reads are
/// dropped.
///
/// # Errors
///
/// - [`ProtocolError::UnexpectedEof`] if the peer closes first
/// - [`ProtocolError::Io`] on socket errors
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_REQUEST_LEN];
    let mut received = 0;

    loop {
        let n = reader.read(&mut buf[received..]).await?;
        if n == 0 {
            let expected = match decode(&buf[..received]) {
                Decoded::Incomplete { expected } => expected,
                Decoded::Complete { consumed, .. } => consumed,
            };
            return Err(ProtocolError::UnexpectedEof { expected, received });
        }
        received += n;

        if let Decoded::Complete { request, consumed } = decode(&buf[..received]) {
            if received > consumed {
                debug!(
                    discarded = received - consumed,
                    "Dropping bytes past declared request length"
                );
            }
            return Ok(request);
        }
    }
}
