//! One TCP connection over the modem's multi-socket stack.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::Cell;

use log::{debug, info};

use crate::clock::Monotonic;
use crate::error::{ModemError, Result};
use crate::modem::{DATA_PROMPT, Modem, SEND_TERMINATOR, UrcListener};
use crate::transport::Transport;

use super::format_command;

/// Connection verdict the modem reports asynchronously after the
/// connect command is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Connected,
    AlreadyConnected,
    Failed,
}

/// Watches for `<id>,CONNECT OK` and friends while the connect
/// sequence spins.
struct ConnectWatch {
    id: u8,
    verdict: Rc<Cell<Option<Verdict>>>,
}

impl UrcListener for ConnectWatch {
    fn on_urc(&mut self, line: &str) {
        let Some((id_text, rest)) = line.split_once(',') else {
            return;
        };
        if id_text.trim().parse::<u8>() != Ok(self.id) {
            return;
        }
        let verdict = match rest.trim() {
            "CONNECT OK" => Verdict::Connected,
            "ALREADY CONNECT" => Verdict::AlreadyConnected,
            "CONNECT FAIL" => Verdict::Failed,
            _ => return,
        };
        self.verdict.set(Some(verdict));
    }
}

/// One open TCP connection, borrowing the engine for its lifetime.
///
/// Dropping the handle does not close the connection on the modem;
/// call [`close`](Self::close) for an orderly shutdown.
pub struct TcpSocket<'a, T: Transport, C: Monotonic> {
    modem: &'a mut Modem<T, C>,
    id: u8,
}

impl<'a, T: Transport, C: Monotonic> TcpSocket<'a, T, C> {
    /// Open a connection on socket slot `id`.
    ///
    /// The connect command is answered twice: an immediate `OK` that
    /// only acknowledges the request, then an unsolicited verdict line
    /// once the connection attempt resolves. The receive channel is
    /// created only after the verdict confirms the connection, so
    /// payload for a failed connect is never buffered.
    pub fn connect(
        modem: &'a mut Modem<T, C>,
        id: u8,
        host: &str,
        port: u16,
    ) -> Result<Self> {
        let cmd = format_command(format_args!("AT+CIPSTART={id},\"TCP\",\"{host}\",{port}"))?;

        // The verdict line can arrive in the same read burst as the
        // immediate OK, so the watcher must be listening before any
        // byte of the exchange is polled.
        let verdict = Rc::new(Cell::new(None));
        let token = modem.add_urc_listener(Box::new(ConnectWatch {
            id,
            verdict: verdict.clone(),
        }))?;

        let outcome = await_verdict(modem, &cmd, &verdict);
        modem.remove_urc_listener(token);

        match outcome? {
            Some(Verdict::Connected) => {
                modem.open_socket(id)?;
                info!("socket {id} connected to {host}:{port}");
            }
            Some(Verdict::AlreadyConnected) => {
                // Slot is live from an earlier connect; keep its channel.
                if let Err(e @ ModemError::InvalidSocket) = modem.open_socket(id) {
                    return Err(e);
                }
                debug!("socket {id} was already connected");
            }
            Some(Verdict::Failed) => return Err(ModemError::ConnectFailed),
            None => return Err(ModemError::Timeout),
        }

        Ok(Self { modem, id })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Transmit `data` using the prompt protocol: announce the length,
    /// wait for the data-entry prompt, stream the raw payload, then the
    /// terminator byte, then await the modem's delivery confirmation.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let cmd = format_command(format_args!("AT+CIPSEND={},{}", self.id, data.len()))?;
        let prompt_timeout = self.modem.config().prompt_timeout_ms;
        let ack_timeout = self.modem.config().send_ack_timeout_ms;

        self.modem.send(&cmd)?;
        self.modem
            .wait_for_literal(DATA_PROMPT, prompt_timeout)
            .into_result()?;

        self.modem.write_bytes(data)?;
        self.modem.write_byte(SEND_TERMINATOR)?;
        self.modem.flush()?;

        // The confirmation is a fresh exchange, not part of the prompt.
        self.modem.expect_response();
        self.modem.wait_for_response(ack_timeout).into_result()
    }

    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms` for
    /// data to arrive. Returns the partial count actually read, which
    /// may be zero.
    pub fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        self.modem.socket_read(self.id, buf, timeout_ms)
    }

    /// Bytes buffered and immediately readable.
    pub fn available(&self) -> usize {
        self.modem.socket_available(self.id)
    }

    /// Whether the receive channel is still live. Goes false when the
    /// peer closes the connection.
    pub fn is_open(&self) -> bool {
        self.modem.socket_is_open(self.id)
    }

    /// Chunks that had to drop bytes since the connection opened.
    pub fn overflow_events(&self) -> u32 {
        self.modem.socket_overflow_events(self.id)
    }

    /// Orderly shutdown. If the peer already closed the connection the
    /// local channel is simply gone and no command is sent.
    pub fn close(self) -> Result<()> {
        if !self.modem.socket_is_open(self.id) {
            debug!("socket {} already closed by peer", self.id);
            return Ok(());
        }

        let cmd = format_command(format_args!("AT+CIPCLOSE={}", self.id))?;
        let timeout = self.modem.config().command_timeout_ms;
        self.modem.send(&cmd)?;
        let status = self.modem.wait_for_response(timeout);
        self.modem.close_socket(self.id);
        status.into_result()
    }
}

/// Issue the connect command and spin until the watcher records a
/// verdict or the connect deadline passes. `Ok(None)` means no verdict
/// arrived in time.
fn await_verdict<T: Transport, C: Monotonic>(
    modem: &mut Modem<T, C>,
    command: &str,
    verdict: &Cell<Option<Verdict>>,
) -> Result<Option<Verdict>> {
    let timeout = modem.config().command_timeout_ms;
    let connect_timeout = modem.config().connect_timeout_ms;
    let poll_interval = modem.config().poll_interval_ms;

    modem.send(command)?;
    modem.wait_for_response(timeout).into_result()?;

    let deadline = modem.now_ms() + u64::from(connect_timeout);
    loop {
        if let Some(v) = verdict.get() {
            return Ok(Some(v));
        }
        if modem.now_ms() >= deadline {
            return Ok(None);
        }
        modem.poll();
        modem.sleep_ms(poll_interval);
    }
}
