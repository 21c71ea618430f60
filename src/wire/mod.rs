//! The binary IPC codec: tagged-value encode/decode, message framing and
//! block compression. Everything here is pure with respect to the socket;
//! the connection layer owns I/O and maps codec failures onto its fault
//! taxonomy.

pub mod compress;
pub mod decode;
pub mod encode;
pub mod value;

pub use compress::{compress_frame, decompress_payload};
pub use decode::{decode_response, read_frame, Frame};
pub use encode::encode_frame;
pub use value::{Dict, FromValue, Table, TableError, Value};

use std::{io, str};

use bytes::{BufMut, BytesMut};
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Fixed message header size: endianness, kind, compressed flag, reserved
/// byte, u32 total length.
pub const HEADER_LEN: usize = 8;

// -----------------------------------------------------------------------------
// ----- MessageKind -----------------------------------------------------------

/// Header byte 1. Values at or above [`MessageKind::ERROR_THRESHOLD`] mark an
/// engine-side error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// One-way publish; no response follows.
    Async,
    /// Synchronous request; exactly one response follows.
    Sync,
    /// Response to a synchronous request.
    Response,
}

impl MessageKind {
    pub const ERROR_THRESHOLD: u8 = 128;

    pub fn as_byte(self) -> u8 {
        match self {
            MessageKind::Async => 0,
            MessageKind::Sync => 1,
            MessageKind::Response => 2,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ByteOrder -------------------------------------------------------------

/// Endianness declared in header byte 0. Outbound frames are always written
/// little-endian; inbound frames are decoded in whichever order they declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn from_header_byte(b: u8) -> ByteOrder {
        if b == 0 { ByteOrder::Big } else { ByteOrder::Little }
    }

    #[inline]
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TextEncoding ----------------------------------------------------------

/// Byte encoding for NUL-terminated strings and char payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Appends `s` in this encoding. Interior NULs are rejected because the
    /// wire delimits strings with NUL.
    pub fn encode_into(self, s: &str, out: &mut BytesMut) -> Result<(), WireError> {
        if s.as_bytes().contains(&0) {
            return Err(WireError::Unencodable {
                encoding: self,
                text: s.into(),
            });
        }
        match self {
            TextEncoding::Utf8 => out.extend_from_slice(s.as_bytes()),
            TextEncoding::Latin1 => {
                for ch in s.chars() {
                    let code = ch as u32;
                    if code > 0xFF {
                        return Err(WireError::Unencodable {
                            encoding: self,
                            text: s.into(),
                        });
                    }
                    out.put_u8(code as u8);
                }
            }
        }
        Ok(())
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, WireError> {
        match self {
            TextEncoding::Utf8 => str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| WireError::Corrupt("string payload is not valid UTF-8")),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o failure mid-frame: {0}")]
    Io(#[from] io::Error),

    /// Engine-side structured error payload; the embedded text is the
    /// engine's message. The one codec failure that does not poison framing.
    #[error("remote engine error: {0}")]
    Remote(String),

    #[error("unsupported wire tag {0}")]
    UnsupportedTag(i8),

    #[error("frame shorter than its declared length (needed {needed} more bytes)")]
    Truncated { needed: usize },

    #[error("corrupt frame: {0}")]
    Corrupt(&'static str),

    #[error("frame of {len} bytes exceeds the u32 length prefix")]
    Oversized { len: usize },

    #[error("text not representable in {encoding:?}: {text:?}")]
    Unencodable {
        encoding: TextEncoding,
        text: String,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}
