//! Poll-driven command/response engine.
//!
//! The engine owns the transport exclusively. All I/O happens inside
//! [`Modem::poll`], which drains whatever bytes the transport has and
//! performs one classification step per byte against the current engine
//! state. Blocking-style calls (`wait_for_response`, `socket_read`) are
//! spin-with-timeout loops around `poll` that yield between iterations;
//! there is no executor and no thread inside the driver.
//!
//! Commands respect a minimum quiet period from the timestamp of the
//! last completed response or URC before their first byte is written.
//! The modem hardware requires this spacing; skipping it corrupts the
//! following exchange.

use alloc::boxed::Box;

use heapless::Vec;
use log::{debug, warn};

use crate::clock::Monotonic;
use crate::config::ModemConfig;
use crate::error::{CommandStatus, ModemError, Result};
use crate::socket::SocketChannel;
use crate::transport::Transport;

use super::urc::{self, UrcListener, UrcRegistry, UrcToken};
use super::{
    MAX_LINE_LEN, MAX_SOCKETS, TOKEN_CME_ERROR, TOKEN_CMS_ERROR, TOKEN_ERROR, TOKEN_NO_CARRIER,
    TOKEN_OK,
};

/// Longest literal `wait_for_literal` can match against.
const MAX_LITERAL_LEN: usize = 16;

/// Pause between probes in the autosense loop.
const AUTOSENSE_PROBE_PAUSE_MS: u32 = 100;

/// Captured response text, terminal token stripped and whitespace trimmed.
pub type ResponseText = heapless::String<MAX_LINE_LEN>;

/// Classification context for the next incoming byte.
/// Exactly one variant is active at any time.
enum EngineState {
    /// No command pending; completed lines are URCs and a chunk header
    /// may start a binary segment.
    Idle,
    /// A command was written; accumulating its response. `echoed` is set
    /// once the command echo line has been consumed.
    AwaitingResponse { echoed: bool },
    /// Matching the accumulator suffix against an exact byte sequence
    /// (data-entry prompt detection).
    AwaitingLiteral {
        expected: Vec<u8, MAX_LITERAL_LEN>,
    },
    /// Forwarding raw payload to a socket. Line logic is suspended, so
    /// payloads may contain CR/LF freely. Entered from `Idle` only;
    /// when `remaining` hits zero the engine resumes the deferred state
    /// if a command was armed mid-chunk, otherwise `Idle`. `dropped`
    /// counts payload bytes the channel had no room for.
    ConsumingChunk {
        socket: u8,
        remaining: u16,
        dropped: u16,
    },
}

/// The command/response engine.
///
/// Generic over the serial [`Transport`] and a [`Monotonic`] clock so
/// both can be substituted in host tests. One instance per physical
/// modem; collaborators receive `&mut Modem` per call rather than
/// reaching for shared global state.
pub struct Modem<T: Transport, C: Monotonic> {
    transport: T,
    clock: C,
    cfg: ModemConfig,
    state: EngineState,
    /// In-progress response/URC text. Never retained across two
    /// different classifications.
    buffer: Vec<u8, MAX_LINE_LEN>,
    /// Set after accumulator truncation: discard input until the next
    /// line ending restores a clean boundary.
    resync: bool,
    /// Terminal classification produced by `poll`, consumed by the
    /// wait loops.
    outcome: Option<CommandStatus>,
    response: ResponseText,
    /// Timestamp of the last completed response or URC; anchor for the
    /// inter-command guard interval.
    last_exchange_ms: u64,
    /// State to install once an in-flight chunk completes, when a
    /// command was armed while its payload was still arriving.
    resume: Option<EngineState>,
    sockets: [Option<SocketChannel>; MAX_SOCKETS],
    listeners: UrcRegistry,
}

impl<T: Transport, C: Monotonic> Modem<T, C> {
    pub fn new(transport: T, clock: C, cfg: ModemConfig) -> Self {
        Self {
            transport,
            clock,
            cfg,
            state: EngineState::Idle,
            buffer: Vec::new(),
            resync: false,
            outcome: None,
            response: ResponseText::new(),
            last_exchange_ms: 0,
            resume: None,
            sockets: core::array::from_fn(|_| None),
            listeners: UrcRegistry::new(),
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.cfg
    }

    /// Tear down the engine and hand the transport back.
    pub fn release(self) -> T {
        self.transport
    }

    // ---------------------------------------------------------------------------
    // Command path
    // ---------------------------------------------------------------------------

    /// Write `command` followed by CRLF and start awaiting its response.
    ///
    /// Sleeps out the remainder of the guard interval first, measured
    /// from the last completed response or URC. Any partially
    /// accumulated line is discarded.
    pub fn send(&mut self, command: &str) -> Result<()> {
        let since_last = self.clock.now_ms().saturating_sub(self.last_exchange_ms);
        let guard = u64::from(self.cfg.guard_interval_ms);
        if since_last < guard {
            self.clock.delay_ms((guard - since_last) as u32);
        }

        self.buffer.clear();
        self.response.clear();
        self.outcome = None;
        self.resync = false;
        self.arm(EngineState::AwaitingResponse { echoed: false });

        debug!("command sent: {command}");
        self.write_bytes(command.as_bytes())?;
        self.write_bytes(b"\r\n")?;
        self.flush()
    }

    /// Drive `poll` until a terminal token classifies the response or
    /// `timeout_ms` elapses. On timeout the engine resets to idle with
    /// an empty accumulator so no partial match leaks into the next
    /// exchange.
    pub fn wait_for_response(&mut self, timeout_ms: u32) -> CommandStatus {
        self.wait_for_outcome(timeout_ms, None)
    }

    /// Like [`wait_for_response`](Self::wait_for_response) but also
    /// copies the response text (terminal token stripped, whitespace
    /// trimmed) into `out`.
    pub fn wait_for_response_into(
        &mut self,
        timeout_ms: u32,
        out: &mut ResponseText,
    ) -> CommandStatus {
        self.wait_for_outcome(timeout_ms, Some(out))
    }

    /// Wait until the unclassified tail of the stream ends with
    /// `expected` — used for the data-entry prompt, which has no line
    /// terminator of its own.
    pub fn wait_for_literal(&mut self, expected: &[u8], timeout_ms: u32) -> CommandStatus {
        let Ok(literal) = Vec::<u8, MAX_LITERAL_LEN>::from_slice(expected) else {
            warn!("literal longer than {MAX_LITERAL_LEN} bytes, cannot match");
            return CommandStatus::Timeout;
        };
        self.outcome = None;
        self.arm(EngineState::AwaitingLiteral { expected: literal });
        // The literal may already sit at the end of the accumulator.
        self.match_literal();
        self.wait_for_outcome(timeout_ms, None)
    }

    /// Re-arm response classification without writing a command.
    ///
    /// Used by the socket transmit path: after the raw payload and the
    /// send terminator go out, the modem issues a second, independent
    /// confirmation that must be awaited like any response.
    pub fn expect_response(&mut self) {
        self.buffer.clear();
        self.response.clear();
        self.outcome = None;
        self.resync = false;
        self.arm(EngineState::AwaitingResponse { echoed: true });
    }

    /// Enter `next`, unless a chunk payload is still arriving — then the
    /// transition is deferred until the chunk completes, so the remaining
    /// payload bytes keep flowing to their socket instead of being read
    /// as response text.
    fn arm(&mut self, next: EngineState) {
        if matches!(self.state, EngineState::ConsumingChunk { .. }) {
            warn!("command armed while a chunk payload is still arriving");
            self.resume = Some(next);
        } else {
            self.resume = None;
            self.state = next;
        }
    }

    fn wait_for_outcome(
        &mut self,
        timeout_ms: u32,
        mut capture: Option<&mut ResponseText>,
    ) -> CommandStatus {
        let deadline = self.clock.now_ms() + u64::from(timeout_ms);
        loop {
            self.poll();
            if let Some(status) = self.outcome.take() {
                if let Some(out) = capture.take() {
                    out.clear();
                    let _ = out.push_str(self.response.as_str());
                }
                self.response.clear();
                return status;
            }
            if self.clock.now_ms() >= deadline {
                break;
            }
            self.clock.delay_ms(self.cfg.poll_interval_ms);
        }

        // Deadline passed with bytes possibly half-accumulated; a stale
        // partial match must never classify the next command. A chunk
        // mid-flight keeps consuming, but nothing resumes after it.
        if !matches!(self.state, EngineState::ConsumingChunk { .. }) {
            self.state = EngineState::Idle;
        }
        self.resume = None;
        self.buffer.clear();
        self.response.clear();
        self.resync = false;
        CommandStatus::Timeout
    }

    // ---------------------------------------------------------------------------
    // Poll loop
    // ---------------------------------------------------------------------------

    /// Drain all currently available transport bytes, one classification
    /// step per byte. Non-blocking; calling with nothing available is a
    /// no-op.
    pub fn poll(&mut self) {
        while self.transport.available() {
            let byte = match self.transport.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    warn!("transport read failed: {e:?}");
                    return;
                }
            };
            self.consume(byte);
        }
    }

    /// Current monotonic time, for deadlines in callers' own wait loops.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Yield to the hardware for `ms` milliseconds.
    pub fn sleep_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }

    /// Whether no command is pending and no chunk is being consumed.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, EngineState::Idle)
    }

    /// Bytes currently held in the line accumulator.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn consume(&mut self, byte: u8) {
        if matches!(self.state, EngineState::ConsumingChunk { .. }) {
            self.consume_chunk_byte(byte);
            return;
        }

        if self.resync {
            if byte == b'\n' {
                self.resync = false;
            }
            return;
        }

        if self.buffer.push(byte).is_err() {
            warn!("line accumulator overflow, resynchronising at next line ending");
            self.buffer.clear();
            self.resync = true;
            return;
        }

        match self.state {
            EngineState::Idle => self.classify_idle(byte),
            EngineState::AwaitingResponse { .. } => self.classify_response(byte),
            EngineState::AwaitingLiteral { .. } => self.match_literal(),
            EngineState::ConsumingChunk { .. } => {}
        }
    }

    // ---------------------------------------------------------------------------
    // Idle: URC lines and chunk headers
    // ---------------------------------------------------------------------------

    fn classify_idle(&mut self, byte: u8) {
        if byte == b':' && self.buffer.starts_with(urc::CHUNK_TAG) {
            match urc::parse_chunk_header(&self.buffer) {
                Some(header) => {
                    self.buffer.clear();
                    self.begin_chunk(header.socket, header.len);
                }
                None => {
                    // Not a well-formed header after all; keep treating
                    // the bytes as an ordinary line.
                    warn!("malformed chunk header, falling back to line mode");
                }
            }
            return;
        }

        if byte == b'\n' {
            self.finish_urc_line();
        }
    }

    fn finish_urc_line(&mut self) {
        self.last_exchange_ms = self.clock.now_ms();
        // Move the line out of the accumulator before dispatching so the
        // handlers never alias the engine's own buffers.
        let mut line = Vec::<u8, MAX_LINE_LEN>::new();
        let _ = line.extend_from_slice(self.buffer.trim_ascii());
        self.buffer.clear();
        match core::str::from_utf8(&line) {
            Ok(text) => {
                debug!("URC received: {text}");
                self.apply_peer_close(text);
                self.listeners.dispatch(text);
            }
            Err(_) => warn!("URC line was not valid text, discarded"),
        }
    }

    /// Tear down a channel when the peer closes: `"<id>,CLOSED"`.
    fn apply_peer_close(&mut self, line: &str) {
        let Some(id_text) = line.strip_suffix(",CLOSED") else {
            return;
        };
        let Ok(id) = id_text.parse::<u8>() else {
            return;
        };
        if let Some(slot) = self.sockets.get_mut(id as usize) {
            if slot.take().is_some() {
                debug!("socket {id} closed by peer, buffered data discarded");
            }
        }
    }

    fn begin_chunk(&mut self, socket: u8, len: u16) {
        if len == 0 {
            return;
        }
        if self
            .sockets
            .get(socket as usize)
            .is_none_or(Option::is_none)
        {
            // Still consume the payload: losing frame alignment is worse
            // than losing one chunk's data.
            debug!("chunk for closed socket {socket}, {len} byte(s) will be discarded");
        }
        self.state = EngineState::ConsumingChunk {
            socket,
            remaining: len,
            dropped: 0,
        };
    }

    fn consume_chunk_byte(&mut self, byte: u8) {
        let EngineState::ConsumingChunk {
            socket,
            remaining,
            dropped,
        } = &mut self.state
        else {
            return;
        };

        if let Some(channel) = self
            .sockets
            .get_mut(*socket as usize)
            .and_then(Option::as_mut)
        {
            if !channel.push_byte(byte) {
                *dropped += 1;
            }
        }

        *remaining -= 1;
        if *remaining == 0 {
            let (socket, dropped) = (*socket, *dropped);
            self.state = self.resume.take().unwrap_or(EngineState::Idle);
            if dropped > 0 {
                if let Some(channel) = self
                    .sockets
                    .get_mut(socket as usize)
                    .and_then(Option::as_mut)
                {
                    channel.note_overflow(usize::from(dropped));
                }
            }
        }
    }

    // ---------------------------------------------------------------------------
    // Awaiting response: echo and terminal tokens
    // ---------------------------------------------------------------------------

    fn classify_response(&mut self, byte: u8) {
        if byte != b'\n' || !self.buffer.ends_with(b"\r\n") || self.buffer.len() <= 2 {
            return;
        }

        let echoed = matches!(self.state, EngineState::AwaitingResponse { echoed: true });
        if !echoed && self.buffer.starts_with(b"AT") && find_terminal(&self.buffer).is_none() {
            // Echo of the command we just wrote; never part of the capture.
            self.buffer.clear();
            self.state = EngineState::AwaitingResponse { echoed: true };
            return;
        }

        if let Some((status, terminal_at)) = find_terminal(&self.buffer) {
            self.finish_response(status, terminal_at);
        }
    }

    fn finish_response(&mut self, status: CommandStatus, terminal_at: usize) {
        self.last_exchange_ms = self.clock.now_ms();
        self.response.clear();
        match core::str::from_utf8(self.buffer[..terminal_at].trim_ascii()) {
            Ok(text) => {
                let _ = self.response.push_str(text);
            }
            Err(_) => warn!("response text was not valid text, capture dropped"),
        }
        debug!("response received: \"{}\", status: {status}", self.response);
        self.outcome = Some(status);
        self.state = EngineState::Idle;
        self.buffer.clear();
    }

    fn match_literal(&mut self) {
        let matched = match &self.state {
            EngineState::AwaitingLiteral { expected } => self.buffer.ends_with(expected),
            _ => false,
        };
        if matched {
            self.last_exchange_ms = self.clock.now_ms();
            debug!("expected literal received");
            self.outcome = Some(CommandStatus::Ok);
            self.state = EngineState::Idle;
            self.buffer.clear();
        }
    }

    // ---------------------------------------------------------------------------
    // Raw write path (socket transmit)
    // ---------------------------------------------------------------------------

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write(data).map_err(log_io)
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.transport.flush().map_err(log_io)
    }

    // ---------------------------------------------------------------------------
    // Socket table
    // ---------------------------------------------------------------------------

    /// Create the receive channel for `id`. Called by the connect
    /// sequence once the modem confirms the connection.
    pub fn open_socket(&mut self, id: u8) -> Result<()> {
        let slot = self
            .sockets
            .get_mut(id as usize)
            .ok_or(ModemError::InvalidSocket)?;
        if slot.is_some() {
            return Err(ModemError::SocketInUse);
        }
        *slot = Some(SocketChannel::new());
        Ok(())
    }

    /// Drop the receive channel for `id`, discarding buffered data.
    /// A missing channel (already torn down by a peer close) is fine.
    pub fn close_socket(&mut self, id: u8) {
        if let Some(slot) = self.sockets.get_mut(id as usize) {
            slot.take();
        }
    }

    pub fn socket_is_open(&self, id: u8) -> bool {
        self.sockets
            .get(id as usize)
            .is_some_and(Option::is_some)
    }

    /// Bytes buffered and immediately readable on `id`.
    pub fn socket_available(&self, id: u8) -> usize {
        self.sockets
            .get(id as usize)
            .and_then(Option::as_ref)
            .map_or(0, SocketChannel::available)
    }

    /// Overflow events recorded on `id` since it was opened.
    pub fn socket_overflow_events(&self, id: u8) -> u32 {
        self.sockets
            .get(id as usize)
            .and_then(Option::as_ref)
            .map_or(0, SocketChannel::overflow_events)
    }

    /// Total payload bytes dropped on `id` across all overflow events.
    pub fn socket_overflow_bytes(&self, id: u8) -> u32 {
        self.sockets
            .get(id as usize)
            .and_then(Option::as_ref)
            .map_or(0, SocketChannel::overflow_bytes)
    }

    /// Read up to `buf.len()` bytes from socket `id`.
    ///
    /// Pulls what is immediately buffered, then keeps polling and
    /// yielding until either the buffer fills or `timeout_ms` elapses.
    /// Returns the partial count actually read; data is never invented
    /// and the call never blocks past the deadline plus one poll
    /// iteration.
    pub fn socket_read(&mut self, id: u8, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let deadline = self.clock.now_ms() + u64::from(timeout_ms);
        let mut got = 0;
        loop {
            match self
                .sockets
                .get_mut(id as usize)
                .and_then(Option::as_mut)
            {
                Some(channel) => got += channel.read(&mut buf[got..]),
                // Channel torn down (peer close) — hand back what we have.
                None if got > 0 => return Ok(got),
                None => return Err(ModemError::InvalidSocket),
            }
            if got == buf.len() || self.clock.now_ms() >= deadline {
                return Ok(got);
            }
            self.poll();
            self.clock.delay_ms(self.cfg.poll_interval_ms);
        }
    }

    // ---------------------------------------------------------------------------
    // URC listeners
    // ---------------------------------------------------------------------------

    pub fn add_urc_listener(&mut self, listener: Box<dyn UrcListener>) -> Result<UrcToken> {
        self.listeners.add(listener)
    }

    pub fn remove_urc_listener(&mut self, token: UrcToken) -> Option<Box<dyn UrcListener>> {
        self.listeners.remove(token)
    }

    // ---------------------------------------------------------------------------
    // Modem lifecycle commands
    // ---------------------------------------------------------------------------

    /// Bring the modem to a known state: verbose result codes on,
    /// command channel alive, numeric error reporting off.
    pub fn init(&mut self) -> Result<()> {
        let timeout = self.cfg.command_timeout_ms;
        self.send("ATV1")?;
        self.wait_for_response(timeout).into_result()?;
        self.autosense(self.cfg.autosense_timeout_ms)?;
        self.send("AT+CMEE=0")?;
        self.wait_for_response(timeout).into_result()
    }

    /// Probe with `AT` until the modem answers or `timeout_ms` is spent.
    pub fn autosense(&mut self, timeout_ms: u32) -> Result<()> {
        let deadline = self.clock.now_ms() + u64::from(timeout_ms);
        loop {
            if self.noop().is_ok() {
                return Ok(());
            }
            if self.clock.now_ms() >= deadline {
                return Err(ModemError::Timeout);
            }
            self.clock.delay_ms(AUTOSENSE_PROBE_PAUSE_MS);
        }
    }

    /// Bare `AT` liveness check.
    pub fn noop(&mut self) -> Result<()> {
        let timeout = self.cfg.command_timeout_ms;
        self.send("AT")?;
        self.wait_for_response(timeout).into_result()
    }

    pub fn factory_reset(&mut self) -> Result<()> {
        let timeout = self.cfg.command_timeout_ms;
        self.send("AT&FZ&W")?;
        self.wait_for_response(timeout).into_result()
    }

    pub fn restart(&mut self) -> Result<()> {
        let timeout = self.cfg.command_timeout_ms;
        self.send("AT+RST=1")?;
        self.wait_for_response(timeout).into_result()
    }

    pub fn power_off(&mut self) -> Result<()> {
        let timeout = self.cfg.command_timeout_ms;
        self.send("AT+CPOF")?;
        self.wait_for_response(timeout).into_result()
    }
}

/// Locate the last terminal token in the accumulator, if any.
/// Tokens are searched in a fixed order, success first.
fn find_terminal(buf: &[u8]) -> Option<(CommandStatus, usize)> {
    for (token, status) in [
        (TOKEN_OK, CommandStatus::Ok),
        (TOKEN_ERROR, CommandStatus::Error),
        (TOKEN_NO_CARRIER, CommandStatus::NoCarrier),
        (TOKEN_CME_ERROR, CommandStatus::CmeError),
        (TOKEN_CMS_ERROR, CommandStatus::CmsError),
    ] {
        if let Some(at) = rfind(buf, token) {
            return Some((status, at));
        }
    }
    None
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&at| &haystack[at..at + needle.len()] == needle)
}

fn log_io<E: core::fmt::Debug>(e: E) -> ModemError {
    warn!("transport write failed: {e:?}");
    ModemError::Io
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfind_locates_last_occurrence() {
        assert_eq!(rfind(b"OK..OK", b"OK"), Some(4));
        assert_eq!(rfind(b"abc", b"z"), None);
        assert_eq!(rfind(b"ab", b"abc"), None);
    }

    #[test]
    fn terminal_search_order() {
        // A buffer containing both tokens classifies as success.
        let buf = b"\r\nERROR\r\n\r\nOK\r\n";
        let (status, _) = find_terminal(buf).unwrap();
        assert_eq!(status, CommandStatus::Ok);

        let (status, at) = find_terminal(b"x\r\nERROR\r\n").unwrap();
        assert_eq!(status, CommandStatus::Error);
        assert_eq!(at, 1);
    }

    #[test]
    fn cme_token_matches_mid_line() {
        let buf = b"\r\n+CME ERROR: SIM not inserted\r\n";
        let (status, at) = find_terminal(buf).unwrap();
        assert_eq!(status, CommandStatus::CmeError);
        assert_eq!(at, 2);
    }
}
