//! Driver timing configuration
//!
//! All tunable timing parameters for the modem driver. Buffer capacities
//! are compile-time constants (see [`crate::modem`]); everything that is a
//! duration lives here so hosts can persist and override it.

use serde::{Deserialize, Serialize};

/// Core driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    // --- Wire timing ---
    /// Minimum quiet time between the end of one response/URC and the
    /// first byte of the next command (milliseconds). This is a protocol
    /// timing requirement of the modem hardware, not a tunable for speed.
    pub guard_interval_ms: u32,
    /// Sleep between polls inside blocking-with-timeout loops (milliseconds).
    pub poll_interval_ms: u32,

    // --- Command deadlines ---
    /// Default deadline for an ordinary command/response exchange.
    pub command_timeout_ms: u32,
    /// Total budget for the autosense probe loop at startup.
    pub autosense_timeout_ms: u32,

    // --- Socket deadlines ---
    /// Deadline for the data-entry prompt after a send-with-length command.
    pub prompt_timeout_ms: u32,
    /// Deadline for the final confirmation after raw payload transmission.
    pub send_ack_timeout_ms: u32,
    /// Deadline for a TCP connect exchange.
    pub connect_timeout_ms: u32,

    // --- Network registration ---
    /// Pause between registration status queries while waiting for the
    /// network.
    pub registration_poll_ms: u32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            // Wire timing
            guard_interval_ms: 20,
            poll_interval_ms: 10,

            // Command deadlines
            command_timeout_ms: 1_000,
            autosense_timeout_ms: 10_000,

            // Socket deadlines
            prompt_timeout_ms: 2_000,
            send_ack_timeout_ms: 10_000,
            connect_timeout_ms: 75_000,

            // Registration
            registration_poll_ms: 250,
        }
    }
}
