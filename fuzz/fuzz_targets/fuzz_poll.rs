//! Fuzz target: `Modem::poll`
//!
//! Drives arbitrary byte streams through the engine's demultiplexer and
//! asserts that it never panics and never buffers more than a socket's
//! capacity, whatever mix of lines, chunk headers and garbage arrives.
//!
//! cargo fuzz run fuzz_poll

#![no_main]

use embedded_hal::delay::DelayNs;
use gsmlink::clock::Monotonic;
use gsmlink::socket::SOCKET_BUFFER_CAP;
use gsmlink::{Modem, ModemConfig, Transport};
use libfuzzer_sys::fuzz_target;

struct SliceTransport {
    data: Vec<u8>,
    pos: usize,
}

impl Transport for SliceTransport {
    type Error = ();

    fn available(&self) -> bool {
        self.pos < self.data.len()
    }

    fn read_byte(&mut self) -> Result<u8, ()> {
        let byte = *self.data.get(self.pos).ok_or(())?;
        self.pos += 1;
        Ok(byte)
    }

    fn write(&mut self, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

struct TickClock(u64);

impl DelayNs for TickClock {
    fn delay_ns(&mut self, ns: u32) {
        self.0 += u64::from(ns.div_ceil(1_000_000));
    }
}

impl Monotonic for TickClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

fuzz_target!(|data: &[u8]| {
    let transport = SliceTransport {
        data: data.to_vec(),
        pos: 0,
    };
    let mut modem = Modem::new(transport, TickClock(0), ModemConfig::default());
    for id in 0..2 {
        modem.open_socket(id).unwrap();
    }

    modem.poll();

    for id in 0..2 {
        assert!(modem.socket_available(id) <= SOCKET_BUFFER_CAP);
        let mut out = [0u8; 256];
        let _ = modem.socket_read(id, &mut out, 0);
    }

    // The engine must still take a command after arbitrary input.
    let _ = modem.send("AT");
    let _ = modem.wait_for_response(50);
});
