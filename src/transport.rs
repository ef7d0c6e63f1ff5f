//! Transport abstraction — the byte-oriented serial link to the modem.
//!
//! The engine is generic over `Transport` and owns its instance
//! exclusively; no other component touches the wire. No framing is
//! assumed: the engine classifies the raw byte stream itself.

/// Byte-oriented serial channel to the modem.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Whether at least one byte is ready to read (non-blocking).
    fn available(&self) -> bool;

    /// Read one byte. Only called after `available()` reported data.
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Write all of `data` to the transport.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered output onto the wire.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// A transport that discards all writes and never has data.
/// Useful as a placeholder before the real link is up.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn available(&self) -> bool {
        false
    }

    fn read_byte(&mut self) -> Result<u8, ()> {
        Err(())
    }

    fn write(&mut self, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ESP-IDF UART adapter (target-only)
// ---------------------------------------------------------------------------

#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub mod uart {
    //! UART-backed transport for ESP-IDF targets.

    use esp_idf_hal::delay::{BLOCK, NON_BLOCK};
    use esp_idf_hal::uart::UartDriver;
    use esp_idf_sys::EspError;

    use super::Transport;

    /// Transport over a configured [`UartDriver`].
    pub struct UartTransport<'d> {
        driver: UartDriver<'d>,
    }

    impl<'d> UartTransport<'d> {
        pub fn new(driver: UartDriver<'d>) -> Self {
            Self { driver }
        }

        pub fn release(self) -> UartDriver<'d> {
            self.driver
        }
    }

    impl Transport for UartTransport<'_> {
        type Error = EspError;

        fn available(&self) -> bool {
            self.driver.count().map_or(false, |n| n > 0)
        }

        fn read_byte(&mut self) -> Result<u8, EspError> {
            let mut byte = [0u8; 1];
            self.driver.read(&mut byte, NON_BLOCK)?;
            Ok(byte[0])
        }

        fn write(&mut self, data: &[u8]) -> Result<(), EspError> {
            let mut remaining = data;
            while !remaining.is_empty() {
                let written = self.driver.write(remaining)?;
                remaining = &remaining[written..];
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), EspError> {
            self.driver.wait_tx_done(BLOCK)
        }
    }
}
