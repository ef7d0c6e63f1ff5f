//! Fuzz target: `parse_chunk_header`
//!
//! Arbitrary byte sequences must either parse into in-range fields or
//! be rejected; the tokenizer must never panic or truncate silently.
//!
//! cargo fuzz run fuzz_chunk_header

#![no_main]

use gsmlink::modem::parse_chunk_header;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(header) = parse_chunk_header(data) {
        // A parse is only valid for exactly `+CIPRCV,<id>,<len>:`.
        assert!(data.starts_with(b"+CIPRCV,"));
        assert_eq!(data.last(), Some(&b':'));
        let text = core::str::from_utf8(&data[8..data.len() - 1]).unwrap();
        let (id, len) = text.split_once(',').unwrap();
        assert_eq!(id.parse::<u8>().unwrap(), header.socket);
        assert_eq!(len.parse::<u16>().unwrap(), header.len);
    }
});
