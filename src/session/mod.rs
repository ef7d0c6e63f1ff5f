//! Higher-level workflows built on the command engine.
//!
//! Sessions are thin, short-lived views over a borrowed [`Modem`](crate::Modem):
//! they own no state of their own beyond the borrow, so every piece of
//! truth about the link stays in one place. [`NetworkSession`] handles
//! SIM and registration, [`BearerSession`] the packet-data bearer, and
//! [`TcpSocket`] one open connection.

pub mod bearer;
pub mod network;
pub mod tcp;

pub use bearer::BearerSession;
pub use network::{NetworkSession, RegistrationStatus};
pub use tcp::TcpSocket;

use core::fmt::Write;

use log::warn;

use crate::error::{ModemError, Result};

/// Bound on one formatted command line.
pub(crate) const MAX_COMMAND_LEN: usize = 96;

pub(crate) type CommandBuf = heapless::String<MAX_COMMAND_LEN>;

/// Render a command into a bounded buffer. Overlong arguments (a
/// runaway APN or hostname) fail the call instead of sending a
/// truncated command to the modem.
pub(crate) fn format_command(args: core::fmt::Arguments<'_>) -> Result<CommandBuf> {
    let mut buf = CommandBuf::new();
    buf.write_fmt(args).map_err(|_| {
        warn!("command exceeds {MAX_COMMAND_LEN} bytes, refusing to send");
        ModemError::Protocol
    })?;
    Ok(buf)
}
