//! Text protocol for the HelloWorld service.
//!
//! Line based, CRLF terminated, verbs are case-insensitive:
//!
//! ```text
//! Request:  HELLO alice\r\n
//! Response: REPLY Hello, alice!\r\n
//!
//! Request:  HELLO\r\n
//! Response: REPLY Hello, World!\r\n
//!
//! Request:  QUIT\r\n
//! Response: OK\r\n
//! ```
//!
//! A single space after `HELLO` starts the name, so `HELLO \r\n` carries an
//! empty name while `HELLO\r\n` carries none.

use std::fmt;

use crate::message::Message;

/// Longest line accepted, terminator excluded. Longer lines drop the
/// connection.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Invoke `Hello`, with or without a name.
    Hello(Option<String>),
    /// Quit command.
    Quit,
}

/// Reasons a complete line could not be turned into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    UnknownCommand,
    InvalidUtf8,
    LineTooLong,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownCommand => f.write_str("unknown command"),
            ProtocolError::InvalidUtf8 => f.write_str("invalid utf-8"),
            ProtocolError::LineTooLong => f.write_str("line too long"),
        }
    }
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed command with bytes consumed.
    Complete(Command, usize),
    /// Need more data.
    Incomplete,
    /// Bad line; the line (with its terminator) spans the given byte count.
    Error(ProtocolError, usize),
}

/// Parse one command from the front of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    let line_end = match find_crlf(input) {
        Some(pos) => pos,
        // A maximal line may still be waiting for the \n after its \r
        None if input.len() > MAX_LINE_LENGTH + 1 => {
            return ParseResult::Error(ProtocolError::LineTooLong, input.len())
        }
        None => return ParseResult::Incomplete,
    };

    if line_end > MAX_LINE_LENGTH {
        return ParseResult::Error(ProtocolError::LineTooLong, line_end + 2);
    }

    let line = &input[..line_end];
    let consumed = line_end + 2;

    if line.eq_ignore_ascii_case(b"HELLO") {
        ParseResult::Complete(Command::Hello(None), consumed)
    } else if line.eq_ignore_ascii_case(b"QUIT") {
        ParseResult::Complete(Command::Quit, consumed)
    } else if line.len() >= 6 && line[..6].eq_ignore_ascii_case(b"HELLO ") {
        match std::str::from_utf8(&line[6..]) {
            Ok(name) => ParseResult::Complete(Command::Hello(Some(name.to_string())), consumed),
            Err(_) => ParseResult::Error(ProtocolError::InvalidUtf8, consumed),
        }
    } else {
        ParseResult::Error(ProtocolError::UnknownCommand, consumed)
    }
}

/// Encode a reply message as a wire line.
pub fn encode_reply(reply: &Message) -> Vec<u8> {
    format!("{reply}\r\n").into_bytes()
}

/// Acknowledgement sent before closing on `QUIT`.
pub fn response_ok() -> &'static [u8] {
    b"OK\r\n"
}

/// Format an error response.
pub fn response_error(msg: &str) -> Vec<u8> {
    format!("ERROR {msg}\r\n").into_bytes()
}

/// Find \r\n in buffer, returning the position of \r.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(1)).find(|&i| buffer[i] == b'\r' && buffer[i + 1] == b'\n')
}
