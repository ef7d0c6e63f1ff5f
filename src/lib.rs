//! Serial AT-command driver for cellular modems.
//!
//! One serial stream interleaves command responses, unsolicited result
//! codes and raw binary socket payload; [`modem::Modem`] demultiplexes
//! the three and the [`session`] layer builds registration, bearer and
//! TCP workflows on top of it.
//!
//! The driver is single-context and poll-driven: no threads, no
//! executor, no interior locking. All blocking-style calls are
//! spin-with-timeout loops that yield between poll iterations, and the
//! only cancellation mechanism is the timeout itself.

extern crate alloc;

pub mod clock;
pub mod config;
pub mod error;
pub mod modem;
pub mod session;
pub mod socket;
pub mod transport;

pub use clock::Monotonic;
pub use config::ModemConfig;
pub use error::{CommandStatus, ModemError, Result};
pub use modem::{Modem, UrcListener, UrcToken};
pub use transport::Transport;
