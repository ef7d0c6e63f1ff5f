//! Command/response engine and URC dispatch.
//!
//! One serial stream carries three interleaved traffic classes:
//!
//! 1. responses to commands the driver sent,
//! 2. unsolicited result codes (URCs) the modem emits on its own,
//! 3. raw binary socket payload announced by a `+CIPRCV` chunk header.
//!
//! [`engine::Modem::poll`] consumes the stream one byte at a time and
//! classifies it against the current engine state; everything else in the
//! crate is built on top of that single entry point.

pub mod engine;
pub mod urc;

pub use engine::{Modem, ResponseText};
pub use urc::{ChunkHeader, MAX_URC_LISTENERS, UrcListener, UrcToken, parse_chunk_header};

/// Number of socket slots (ids `0..MAX_SOCKETS`).
pub const MAX_SOCKETS: usize = 4;

/// Bound on one accumulated response/URC line. Longer lines are
/// truncated and the stream resynchronised at the next line ending.
pub const MAX_LINE_LEN: usize = 256;

/// Data-entry prompt issued by the modem after a send-with-length command.
pub const DATA_PROMPT: &[u8] = b"\r\n>";

/// Byte that terminates a raw payload transmission (Ctrl+Z).
pub const SEND_TERMINATOR: u8 = 0x1A;

// Terminal tokens closing a response, in the order they are searched.
pub(crate) const TOKEN_OK: &[u8] = b"\r\nOK\r\n";
pub(crate) const TOKEN_ERROR: &[u8] = b"\r\nERROR\r\n";
pub(crate) const TOKEN_NO_CARRIER: &[u8] = b"\r\nNO CARRIER\r\n";
pub(crate) const TOKEN_CME_ERROR: &[u8] = b"+CME ERROR";
pub(crate) const TOKEN_CMS_ERROR: &[u8] = b"+CMS ERROR";
