//! URC listener registry and chunk-header tokenizer.

use alloc::boxed::Box;

use crate::error::{ModemError, Result};

/// Maximum number of simultaneously registered URC listeners.
pub const MAX_URC_LISTENERS: usize = 4;

/// Observer notified with the full text of every completed non-response
/// line. Listeners must not assume any particular line shape; the text
/// may even be empty, since some firmwares pad URCs with bare CRLF pairs.
pub trait UrcListener {
    fn on_urc(&mut self, line: &str);
}

/// Stable handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrcToken(u8);

/// Bounded slot table of listeners.
///
/// Slots keep their index for the lifetime of a registration, so removing
/// one listener never disturbs the position of the others.
pub(crate) struct UrcRegistry {
    slots: [Option<Box<dyn UrcListener>>; MAX_URC_LISTENERS],
}

impl UrcRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    pub(crate) fn add(&mut self, listener: Box<dyn UrcListener>) -> Result<UrcToken> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(listener);
                return Ok(UrcToken(index as u8));
            }
        }
        Err(ModemError::UrcRegistryFull)
    }

    pub(crate) fn remove(&mut self, token: UrcToken) -> Option<Box<dyn UrcListener>> {
        self.slots
            .get_mut(token.0 as usize)
            .and_then(Option::take)
    }

    pub(crate) fn dispatch(&mut self, line: &str) {
        for slot in &mut self.slots {
            if let Some(listener) = slot {
                listener.on_urc(line);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk header tokenizer
// ---------------------------------------------------------------------------

/// Tag announcing inline socket payload.
pub(crate) const CHUNK_TAG: &[u8] = b"+CIPRCV";

/// Parsed `+CIPRCV,<socket>,<len>:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub socket: u8,
    pub len: u16,
}

/// Tokenize a chunk header of the form `+CIPRCV,<socket>,<len>:`.
///
/// Fields may have any digit count; `None` means the bytes are not a
/// well-formed header and must be handled as an ordinary line. Lengths
/// above `u16::MAX` are rejected rather than silently truncated.
pub fn parse_chunk_header(buf: &[u8]) -> Option<ChunkHeader> {
    let rest = buf.strip_prefix(CHUNK_TAG)?;
    let rest = rest.strip_prefix(b",")?;
    let (socket, rest) = take_number::<u8>(rest)?;
    let rest = rest.strip_prefix(b",")?;
    let (len, rest) = take_number::<u16>(rest)?;
    if rest != b":" {
        return None;
    }
    Some(ChunkHeader { socket, len })
}

/// Consume a non-empty run of ASCII digits, rejecting overflow.
fn take_number<N: Digits>(buf: &[u8]) -> Option<(N, &[u8])> {
    let end = buf
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(buf.len());
    if end == 0 {
        return None;
    }
    let mut value = N::ZERO;
    for &digit in &buf[..end] {
        value = value.push_digit(digit - b'0')?;
    }
    Some((value, &buf[end..]))
}

trait Digits: Sized + Copy {
    const ZERO: Self;
    fn push_digit(self, digit: u8) -> Option<Self>;
}

impl Digits for u8 {
    const ZERO: Self = 0;
    fn push_digit(self, digit: u8) -> Option<Self> {
        self.checked_mul(10)?.checked_add(digit)
    }
}

impl Digits for u16 {
    const ZERO: Self = 0;
    fn push_digit(self, digit: u8) -> Option<Self> {
        self.checked_mul(10)?.checked_add(u16::from(digit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn parses_single_digit_fields() {
        let h = parse_chunk_header(b"+CIPRCV,2,5:").unwrap();
        assert_eq!(h.socket, 2);
        assert_eq!(h.len, 5);
    }

    #[test]
    fn parses_multi_digit_fields() {
        let h = parse_chunk_header(b"+CIPRCV,10,12345:").unwrap();
        assert_eq!(h.socket, 10);
        assert_eq!(h.len, 12345);
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(parse_chunk_header(b"+CIPRCV,2:").is_none(), "missing len");
        assert!(parse_chunk_header(b"+CIPRCV,,5:").is_none(), "empty id");
        assert!(parse_chunk_header(b"+CIPRCV,a,5:").is_none(), "non-digit");
        assert!(parse_chunk_header(b"+CIPRCV,2,5").is_none(), "no colon");
        assert!(
            parse_chunk_header(b"+CIPRCV,2,5:x").is_none(),
            "trailing junk"
        );
        assert!(parse_chunk_header(b"+CIPXXX,2,5:").is_none(), "wrong tag");
    }

    #[test]
    fn rejects_overflowing_fields() {
        assert!(parse_chunk_header(b"+CIPRCV,256,5:").is_none());
        assert!(parse_chunk_header(b"+CIPRCV,2,65536:").is_none());
        assert!(parse_chunk_header(b"+CIPRCV,2,65535:").is_some());
    }

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl UrcListener for Recorder {
        fn on_urc(&mut self, line: &str) {
            self.0.borrow_mut().push(line.to_owned());
        }
    }

    #[test]
    fn registry_dispatches_to_all_slots() {
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));

        let mut registry = UrcRegistry::new();
        let _a = registry.add(Box::new(Recorder(seen_a.clone()))).unwrap();
        let _b = registry.add(Box::new(Recorder(seen_b.clone()))).unwrap();

        registry.dispatch("+CREG: 1");
        assert_eq!(seen_a.borrow().as_slice(), ["+CREG: 1"]);
        assert_eq!(seen_b.borrow().as_slice(), ["+CREG: 1"]);
    }

    #[test]
    fn removal_keeps_other_slots_intact() {
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));

        let mut registry = UrcRegistry::new();
        let a = registry.add(Box::new(Recorder(seen_a.clone()))).unwrap();
        let _b = registry.add(Box::new(Recorder(seen_b.clone()))).unwrap();

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none(), "double remove is a no-op");

        registry.dispatch("RING");
        assert!(seen_a.borrow().is_empty());
        assert_eq!(seen_b.borrow().as_slice(), ["RING"]);
    }

    #[test]
    fn registry_is_bounded() {
        let mut registry = UrcRegistry::new();
        for _ in 0..MAX_URC_LISTENERS {
            let seen = Rc::new(RefCell::new(Vec::new()));
            registry.add(Box::new(Recorder(seen))).unwrap();
        }
        let seen = Rc::new(RefCell::new(Vec::new()));
        assert_eq!(
            registry.add(Box::new(Recorder(seen))).err(),
            Some(ModemError::UrcRegistryFull)
        );
    }
}
