//! Engine-level scenarios over a scripted transport.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::harness;
use gsmlink::modem::{DATA_PROMPT, MAX_URC_LISTENERS};
use gsmlink::socket::SOCKET_BUFFER_CAP;
use gsmlink::{CommandStatus, ModemError, UrcListener};

/// Records every dispatched URC line.
struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (Self(seen.clone()), seen)
    }
}

impl UrcListener for Recorder {
    fn on_urc(&mut self, line: &str) {
        self.0.borrow_mut().push(line.to_owned());
    }
}

fn non_empty(seen: &Rc<RefCell<Vec<String>>>) -> Vec<String> {
    seen.borrow()
        .iter()
        .filter(|l| !l.is_empty())
        .cloned()
        .collect()
}

#[test]
fn simple_command_reports_ok_with_empty_capture() {
    let (mut modem, transport, _clock) = harness();
    transport.reply(b"AT+CGATT=1\r\n\r\nOK\r\n");

    modem.send("AT+CGATT=1").unwrap();
    let mut text = gsmlink::modem::ResponseText::new();
    let status = modem.wait_for_response_into(1000, &mut text);

    assert_eq!(status, CommandStatus::Ok);
    assert_eq!(text.as_str(), "", "echo and terminal are not captured");
    assert!(modem.is_idle());
}

#[test]
fn capture_strips_echo_and_terminal() {
    let (mut modem, transport, _clock) = harness();
    transport.reply(b"AT+CSQ\r\n\r\n+CSQ: 17,0\r\n\r\nOK\r\n");

    modem.send("AT+CSQ").unwrap();
    let mut text = gsmlink::modem::ResponseText::new();
    let status = modem.wait_for_response_into(1000, &mut text);

    assert_eq!(status, CommandStatus::Ok);
    assert_eq!(text.as_str(), "+CSQ: 17,0");
}

#[test]
fn failure_tokens_map_to_statuses() {
    let (mut modem, transport, _clock) = harness();

    transport.reply(b"AT+FOO\r\n\r\nERROR\r\n");
    modem.send("AT+FOO").unwrap();
    assert_eq!(modem.wait_for_response(1000), CommandStatus::Error);

    transport.reply(b"AT+BAR\r\n+CME ERROR: 10\r\n");
    modem.send("AT+BAR").unwrap();
    let status = modem.wait_for_response(1000);
    assert_eq!(status, CommandStatus::CmeError);
    assert_eq!(status.into_result(), Err(ModemError::Protocol));

    transport.reply(b"ATD123;\r\n\r\nNO CARRIER\r\n");
    modem.send("ATD123;").unwrap();
    let status = modem.wait_for_response(1000);
    assert_eq!(status, CommandStatus::NoCarrier);
    assert_eq!(status.into_result(), Err(ModemError::NoCarrier));
}

#[test]
fn chunk_routes_payload_to_socket() {
    let (mut modem, transport, _clock) = harness();
    modem.open_socket(2).unwrap();

    transport.feed(b"\r\n+CIPRCV,2,5:HELLO");
    modem.poll();

    assert_eq!(modem.socket_available(2), 5);
    let mut buf = [0u8; 5];
    assert_eq!(modem.socket_read(2, &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"HELLO");
    assert!(modem.is_idle());
}

#[test]
fn chunk_payload_may_contain_line_endings() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();
    modem.open_socket(1).unwrap();

    transport.feed(b"\r\n+CIPRCV,1,6:AB\r\nOK");
    modem.poll();

    let mut buf = [0u8; 6];
    assert_eq!(modem.socket_read(1, &mut buf, 0).unwrap(), 6);
    assert_eq!(&buf, b"AB\r\nOK");
    assert!(
        non_empty(&seen).is_empty(),
        "payload bytes never reach URC dispatch"
    );
}

#[test]
fn chunk_for_closed_socket_is_discarded() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();

    transport.feed(b"\r\n+CIPRCV,3,5:HELLO\r\nRING\r\n");
    modem.poll();

    assert_eq!(modem.socket_available(3), 0);
    // Frame alignment survived the discard.
    assert_eq!(non_empty(&seen), ["RING"]);
}

#[test]
fn zero_length_chunk_keeps_engine_idle() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();
    modem.open_socket(1).unwrap();

    transport.feed(b"\r\n+CIPRCV,1,0:\r\nRING\r\n");
    modem.poll();

    assert!(modem.is_idle());
    assert_eq!(modem.socket_available(1), 0);
    assert_eq!(non_empty(&seen), ["RING"]);
}

#[test]
fn malformed_chunk_header_is_dispatched_as_line() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();

    transport.feed(b"\r\n+CIPRCV,2,x:\r\n");
    modem.poll();

    assert_eq!(non_empty(&seen), ["+CIPRCV,2,x:"]);
    assert!(modem.is_idle());
}

#[test]
fn timeout_is_bounded_and_engine_is_reusable() {
    let (mut modem, transport, clock) = harness();

    // No reply scripted at all.
    modem.send("AT+CGATT=1").unwrap();
    let started = clock.now();
    assert_eq!(modem.wait_for_response(1000), CommandStatus::Timeout);
    assert_eq!(clock.now() - started, 1000, "spin loop honors the deadline");
    assert!(modem.is_idle());
    assert_eq!(modem.pending_bytes(), 0);

    // The next exchange is unaffected by the stale one.
    transport.reply(b"AT\r\n\r\nOK\r\n");
    modem.send("AT").unwrap();
    assert_eq!(modem.wait_for_response(1000), CommandStatus::Ok);
}

#[test]
fn guard_interval_spaces_consecutive_commands() {
    let (mut modem, transport, _clock) = harness();
    transport.reply(b"AT\r\n\r\nOK\r\n");
    transport.reply(b"AT+CSQ\r\n\r\nOK\r\n");

    modem.send("AT").unwrap();
    modem.wait_for_response(1000).into_result().unwrap();
    modem.send("AT+CSQ").unwrap();
    modem.wait_for_response(1000).into_result().unwrap();

    let writes = transport.writes();
    let first_cmd = writes[0].0;
    let second_cmd = writes
        .iter()
        .find(|(_, bytes)| bytes.starts_with(b"AT+CSQ"))
        .unwrap()
        .0;
    assert!(
        second_cmd - first_cmd >= 20,
        "commands must be at least one guard interval apart, got {}",
        second_cmd - first_cmd
    );
}

#[test]
fn literal_wait_matches_data_prompt() {
    let (mut modem, transport, _clock) = harness();
    transport.reply(b"AT+CIPSEND=1,5\r\n\r\n>");

    modem.send("AT+CIPSEND=1,5").unwrap();
    let status = modem.wait_for_literal(DATA_PROMPT, 2000);
    assert_eq!(status, CommandStatus::Ok);
    assert!(modem.is_idle());
}

#[test]
fn overlong_line_truncates_and_resynchronises() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();

    let mut stream = vec![b'A'; 300];
    stream.extend_from_slice(b"\nRING\r\n");
    transport.feed(&stream);
    modem.poll();

    // The truncated line is dropped whole; the next one is clean.
    assert_eq!(non_empty(&seen), ["RING"]);
    assert!(modem.is_idle());
}

#[test]
fn peer_close_tears_down_the_channel() {
    let (mut modem, transport, _clock) = harness();
    modem.open_socket(1).unwrap();
    transport.feed(b"\r\n+CIPRCV,1,2:HI");
    modem.poll();
    assert_eq!(modem.socket_available(1), 2);

    transport.feed(b"\r\n1,CLOSED\r\n");
    modem.poll();

    assert!(!modem.socket_is_open(1));
    assert_eq!(modem.socket_available(1), 0, "buffered data is discarded");
    let mut buf = [0u8; 2];
    assert_eq!(
        modem.socket_read(1, &mut buf, 0),
        Err(ModemError::InvalidSocket)
    );
}

#[test]
fn listeners_see_lines_until_removed() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    let token = modem.add_urc_listener(Box::new(recorder)).unwrap();

    transport.feed(b"\r\n+CREG: 1\r\n");
    modem.poll();
    assert_eq!(non_empty(&seen), ["+CREG: 1"]);

    assert!(modem.remove_urc_listener(token).is_some());
    transport.feed(b"\r\nRING\r\n");
    modem.poll();
    assert_eq!(non_empty(&seen), ["+CREG: 1"], "removed listener is silent");
}

#[test]
fn listener_registry_is_bounded() {
    let (mut modem, _transport, _clock) = harness();
    for _ in 0..MAX_URC_LISTENERS {
        let (recorder, _) = Recorder::new();
        modem.add_urc_listener(Box::new(recorder)).unwrap();
    }
    let (recorder, _) = Recorder::new();
    assert_eq!(
        modem.add_urc_listener(Box::new(recorder)).err(),
        Some(ModemError::UrcRegistryFull)
    );
}

#[test]
fn socket_table_validates_ids() {
    let (mut modem, _transport, _clock) = harness();
    assert_eq!(modem.open_socket(9), Err(ModemError::InvalidSocket));

    modem.open_socket(0).unwrap();
    assert_eq!(modem.open_socket(0), Err(ModemError::SocketInUse));

    modem.close_socket(0);
    modem.close_socket(0); // idempotent
    modem.open_socket(0).unwrap();
}

#[test]
fn poll_without_data_is_a_no_op() {
    let (mut modem, transport, _clock) = harness();
    modem.poll();
    modem.poll();
    assert!(modem.is_idle());
    assert_eq!(modem.pending_bytes(), 0);

    // A half-accumulated line survives idle polls untouched.
    transport.feed(b"+CRE");
    modem.poll();
    let pending = modem.pending_bytes();
    modem.poll();
    assert_eq!(modem.pending_bytes(), pending);
}

#[test]
fn write_failures_surface_as_io_errors() {
    let (mut modem, transport, _clock) = harness();
    transport.set_fail_writes(true);
    assert_eq!(modem.send("AT"), Err(ModemError::Io));
}

#[test]
fn oversized_chunk_fills_the_buffer_and_records_one_overflow() {
    let (mut modem, transport, _clock) = harness();
    modem.open_socket(0).unwrap();

    // 5000 announced bytes against a 4096-byte channel.
    let mut stream = b"\r\n+CIPRCV,0,5000:".to_vec();
    stream.extend(std::iter::repeat(b'A').take(SOCKET_BUFFER_CAP));
    stream.extend(std::iter::repeat(b'B').take(5000 - SOCKET_BUFFER_CAP));
    transport.feed(&stream);
    modem.poll();

    assert!(modem.is_idle(), "the whole chunk is consumed");
    assert_eq!(modem.socket_available(0), SOCKET_BUFFER_CAP);
    assert_eq!(modem.socket_overflow_events(0), 1, "one event per chunk");
    assert_eq!(
        modem.socket_overflow_bytes(0) as usize,
        5000 - SOCKET_BUFFER_CAP
    );

    // The earliest bytes are the ones kept.
    let mut buf = vec![0u8; SOCKET_BUFFER_CAP];
    assert_eq!(modem.socket_read(0, &mut buf, 0).unwrap(), SOCKET_BUFFER_CAP);
    assert!(buf.iter().all(|&b| b == b'A'));
}

#[test]
fn command_during_chunk_defers_until_the_payload_completes() {
    let (mut modem, transport, _clock) = harness();
    let (recorder, seen) = Recorder::new();
    modem.add_urc_listener(Box::new(recorder)).unwrap();
    modem.open_socket(1).unwrap();

    // Only part of the announced payload has arrived.
    transport.feed(b"\r\n+CIPRCV,1,5:HE");
    modem.poll();
    assert!(!modem.is_idle());

    // The rest of the payload lands ahead of the command's reply.
    transport.feed(b"LLO");
    transport.reply(b"AT\r\n\r\nOK\r\n");
    modem.send("AT").unwrap();
    assert_eq!(modem.wait_for_response(1000), CommandStatus::Ok);

    let mut buf = [0u8; 5];
    assert_eq!(modem.socket_read(1, &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"HELLO", "trailing payload bytes stay on the socket");
    assert!(
        non_empty(&seen).is_empty(),
        "payload bytes never reach URC dispatch"
    );
}

#[test]
fn socket_read_returns_partial_data_at_deadline() {
    let (mut modem, transport, clock) = harness();
    modem.open_socket(1).unwrap();

    // Only three of the five announced bytes ever arrive.
    transport.feed(b"\r\n+CIPRCV,1,5:HEL");
    modem.poll();

    let started = clock.now();
    let mut buf = [0u8; 5];
    let got = modem.socket_read(1, &mut buf, 50).unwrap();
    assert_eq!(got, 3);
    assert_eq!(&buf[..got], b"HEL");
    assert!(clock.now() >= started + 50);
}
