//! Fixed-capacity byte ring.
//!
//! Capacity is a power of two so index wrapping is a mask. Overflow
//! policy is drop-incoming: a push accepts at most the free space and
//! rejects the rest, so bytes already buffered are never overwritten
//! and stream order is preserved up to the point of loss.

/// Fixed-capacity FIFO byte queue. `N` must be a power of two.
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    /// Next write position.
    write: usize,
    /// Bytes currently buffered.
    used: usize,
}

impl<const N: usize> RingBuffer<N> {
    const CAPACITY_IS_POWER_OF_TWO: () = assert!(N.is_power_of_two());

    pub fn new() -> Self {
        // Forces the compile-time capacity check for each instantiation.
        let () = Self::CAPACITY_IS_POWER_OF_TWO;
        Self {
            buf: [0; N],
            write: 0,
            used: 0,
        }
    }

    /// Append up to the free space; returns the number of bytes accepted.
    /// Bytes beyond free space are dropped (drop-incoming policy).
    pub fn push(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(N - self.used);
        for &byte in &data[..accepted] {
            self.buf[self.write] = byte;
            self.write = (self.write + 1) & (N - 1);
        }
        self.used += accepted;
        accepted
    }

    /// Append a single byte. Returns `false` when the ring is full and
    /// the byte was dropped.
    pub fn push_byte(&mut self, byte: u8) -> bool {
        if self.used == N {
            return false;
        }
        self.buf[self.write] = byte;
        self.write = (self.write + 1) & (N - 1);
        self.used += 1;
        true
    }

    /// Pop up to `out.len()` bytes in FIFO order; returns the count moved.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.used);
        let mut read = (self.write + N - self.used) & (N - 1);
        for slot in &mut out[..count] {
            *slot = self.buf[read];
            read = (read + 1) & (N - 1);
        }
        self.used -= count;
        count
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn free(&self) -> usize {
        N - self.used
    }

    pub fn clear(&mut self) {
        self.write = 0;
        self.used = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
