//! Per-socket receive buffering.
//!
//! Each live socket owns one bounded [`RingBuffer`] wrapped in a
//! [`SocketChannel`]. The engine's chunk demultiplexer is the only
//! producer; `Modem::socket_read` is the consumer.

pub mod channel;
pub mod ring;

pub use channel::{SOCKET_BUFFER_CAP, SocketChannel};
pub use ring::RingBuffer;
