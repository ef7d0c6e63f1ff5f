//! Receive channel for one live socket.

use log::warn;

use super::ring::RingBuffer;

/// Per-socket receive capacity in bytes.
pub const SOCKET_BUFFER_CAP: usize = 4096;

/// Buffered receive side of one socket.
///
/// Created when a connect sequence reports success and dropped on
/// close/teardown, which discards anything still buffered. The chunk
/// demultiplexer is the only writer.
pub struct SocketChannel {
    ring: RingBuffer<SOCKET_BUFFER_CAP>,
    overflow_events: u32,
    overflow_bytes: u32,
}

impl SocketChannel {
    pub fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            overflow_events: 0,
            overflow_bytes: 0,
        }
    }

    /// Append payload bytes, dropping whatever exceeds free space.
    /// An overflow is recorded at most once per call.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let accepted = self.ring.push(data);
        if accepted < data.len() {
            self.note_overflow(data.len() - accepted);
        }
        accepted
    }

    /// Append one byte; `false` means it was dropped.
    /// The caller aggregates per-chunk overflow accounting.
    pub fn push_byte(&mut self, byte: u8) -> bool {
        self.ring.push_byte(byte)
    }

    /// Record one overflow event covering `dropped` rejected bytes.
    pub fn note_overflow(&mut self, dropped: usize) {
        self.overflow_events = self.overflow_events.saturating_add(1);
        self.overflow_bytes = self
            .overflow_bytes
            .saturating_add(u32::try_from(dropped).unwrap_or(u32::MAX));
        warn!("socket buffer overflow, {dropped} byte(s) dropped");
    }

    /// Pull immediately available bytes; never blocks.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.ring.pop(out)
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.ring.len()
    }

    /// Number of pushes that had to drop bytes since the channel opened.
    pub fn overflow_events(&self) -> u32 {
        self.overflow_events
    }

    /// Total bytes dropped across all overflow events.
    pub fn overflow_bytes(&self) -> u32 {
        self.overflow_bytes
    }
}

impl Default for SocketChannel {
    fn default() -> Self {
        Self::new()
    }
}
