//! Shared test doubles: a scripted serial transport and a manual clock.

// Each integration binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use gsmlink::clock::Monotonic;
use gsmlink::{Modem, ModemConfig, Transport};

/// Manual clock. Time advances only when the code under test yields,
/// so timeout arithmetic is exact and tests never sleep for real.
#[derive(Clone)]
pub struct TestClock {
    now: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }
}

impl DelayNs for TestClock {
    fn delay_ns(&mut self, ns: u32) {
        let ms = u64::from(ns.div_ceil(1_000_000));
        self.now.set(self.now.get() + ms);
    }
}

impl Monotonic for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Serial double driven by the test script.
///
/// Bytes fed with [`feed`](Self::feed) become immediately readable.
/// Replies queued with [`reply`](Self::reply) are injected one per
/// `flush` call, mirroring a modem that answers each command after it
/// is fully written. Every `write` is logged with the clock reading at
/// the time of the call.
#[derive(Clone)]
pub struct ScriptTransport {
    rx: Rc<RefCell<VecDeque<u8>>>,
    replies: Rc<RefCell<VecDeque<Vec<u8>>>>,
    writes: Rc<RefCell<Vec<(u64, Vec<u8>)>>>,
    fail_writes: Rc<Cell<bool>>,
    clock: TestClock,
}

impl ScriptTransport {
    pub fn new(clock: TestClock) -> Self {
        Self {
            rx: Rc::new(RefCell::new(VecDeque::new())),
            replies: Rc::new(RefCell::new(VecDeque::new())),
            writes: Rc::new(RefCell::new(Vec::new())),
            fail_writes: Rc::new(Cell::new(false)),
            clock,
        }
    }

    /// Make `bytes` readable right away (URCs, chunks, peer events).
    pub fn feed(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    /// Queue a scripted reply; the next `flush` makes it readable.
    pub fn reply(&self, bytes: &[u8]) {
        self.replies.borrow_mut().push_back(bytes.to_vec());
    }

    /// All writes so far, each with the clock reading when it happened.
    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.writes.borrow().clone()
    }

    /// Everything written so far as one flat byte string.
    pub fn written(&self) -> Vec<u8> {
        self.writes
            .borrow()
            .iter()
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn unread(&self) -> usize {
        self.rx.borrow().len()
    }
}

impl Transport for ScriptTransport {
    type Error = &'static str;

    fn available(&self) -> bool {
        !self.rx.borrow().is_empty()
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        self.rx.borrow_mut().pop_front().ok_or("rx empty")
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes.get() {
            return Err("write failed");
        }
        self.writes
            .borrow_mut()
            .push((self.clock.now(), data.to_vec()));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.fail_writes.get() {
            return Err("flush failed");
        }
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            self.rx.borrow_mut().extend(reply);
        }
        Ok(())
    }
}

/// A fresh engine plus handles to its transport and clock.
pub fn harness() -> (Modem<ScriptTransport, TestClock>, ScriptTransport, TestClock) {
    let clock = TestClock::new();
    let transport = ScriptTransport::new(clock.clone());
    let modem = Modem::new(transport.clone(), clock.clone(), ModemConfig::default());
    (modem, transport, clock)
}

/// The command lines written so far, echo formatting stripped.
pub fn commands_sent(transport: &ScriptTransport) -> Vec<String> {
    String::from_utf8(transport.written())
        .unwrap()
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
