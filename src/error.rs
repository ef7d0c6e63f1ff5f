//! Unified error types for the modem driver.
//!
//! A single `Copy` error enum that every subsystem funnels into, keeping
//! session-level error handling uniform. Nothing in the core is fatal:
//! malformed input resynchronises, buffer overflow drops bytes and bumps a
//! counter, and everything else surfaces as an ordinary return value that
//! the caller decides to abort or retry on.

use core::fmt;

// ---------------------------------------------------------------------------
// Command classification
// ---------------------------------------------------------------------------

/// Terminal classification of one command/response exchange.
///
/// The modem closes every response with one token out of a fixed
/// vocabulary; `Timeout` stands in when the deadline passed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// `OK` terminal token.
    Ok,
    /// `ERROR` terminal token.
    Error,
    /// `+CME ERROR` — mobile equipment error (verbose error mode).
    CmeError,
    /// `+CMS ERROR` — message service error (verbose error mode).
    CmsError,
    /// `NO CARRIER` terminal token.
    NoCarrier,
    /// Deadline elapsed with no terminal classification.
    Timeout,
}

impl CommandStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Collapse into a `Result` for linear command sequences.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Error | Self::CmeError | Self::CmsError => Err(ModemError::Protocol),
            Self::NoCarrier => Err(ModemError::NoCarrier),
            Self::Timeout => Err(ModemError::Timeout),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Error => write!(f, "ERROR"),
            Self::CmeError => write!(f, "CME ERROR"),
            Self::CmsError => write!(f, "CMS ERROR"),
            Self::NoCarrier => write!(f, "NO CARRIER"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

// ---------------------------------------------------------------------------
// Driver error
// ---------------------------------------------------------------------------

/// Every fallible operation in the driver funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// Deadline elapsed before the operation completed.
    Timeout,
    /// The modem answered with an explicit error terminal token.
    Protocol,
    /// The modem reported loss of carrier.
    NoCarrier,
    /// The transport failed on the write path.
    Io,
    /// Socket id out of range or no live channel behind it.
    InvalidSocket,
    /// A channel already exists for this socket id.
    SocketInUse,
    /// All URC listener slots are occupied.
    UrcRegistryFull,
    /// The peer rejected the connection (`CONNECT FAIL`).
    ConnectFailed,
    /// SIM requires a PIN and none was configured.
    SimLocked,
    /// SIM absent or in an unusable state.
    SimUnavailable,
    /// Network registration was denied or never completed.
    NotRegistered,
    /// A response arrived but did not have the expected shape.
    UnexpectedResponse,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "operation timed out"),
            Self::Protocol => write!(f, "modem returned an error result"),
            Self::NoCarrier => write!(f, "no carrier"),
            Self::Io => write!(f, "transport I/O failed"),
            Self::InvalidSocket => write!(f, "no live socket with this id"),
            Self::SocketInUse => write!(f, "socket id already in use"),
            Self::UrcRegistryFull => write!(f, "URC listener registry full"),
            Self::ConnectFailed => write!(f, "connection refused by peer"),
            Self::SimLocked => write!(f, "SIM locked and no PIN configured"),
            Self::SimUnavailable => write!(f, "SIM unavailable"),
            Self::NotRegistered => write!(f, "not registered on the network"),
            Self::UnexpectedResponse => write!(f, "response had unexpected shape"),
        }
    }
}

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ModemError>;
