//! Dual-framing stdio transport: `Content-Length:` headers (LSP-style)
//! or one JSON object per line. The first line read decides which one
//! the rest of the connection uses; the server never switches back.

use std::io::{BufRead, Write};

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Auto,
    LengthPrefixed,
    Newline,
}

#[derive(Debug)]
pub enum ReadError {
    Eof,
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "end of stream"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

/// Reads one message, auto-detecting framing from the first line if
/// `framing` is still `Auto`. Returns `Err(ReadError::Eof)` on a clean
/// end of stream.
pub fn read_message(
    reader: &mut impl BufRead,
    framing: &mut Framing,
) -> Result<Value, ReadError> {
    let mut first_line = String::new();
    let read = reader.read_line(&mut first_line).map_err(ReadError::Io)?;
    if read == 0 {
        return Err(ReadError::Eof);
    }
    let trimmed = first_line.trim_end();

    if let Some(rest) = trimmed.strip_prefix("Content-Length:") {
        if *framing == Framing::Auto {
            *framing = Framing::LengthPrefixed;
        }
        let length: usize = rest
            .trim()
            .parse()
            .map_err(|e| ReadError::Parse(format!("invalid Content-Length header: {e}")))?;

        loop {
            let mut header_line = String::new();
            let read = reader.read_line(&mut header_line).map_err(ReadError::Io)?;
            if read == 0 {
                return Err(ReadError::Parse("unexpected EOF while reading headers".into()));
            }
            if header_line == "\r\n" || header_line == "\n" {
                break;
            }
        }

        let mut buf = vec![0u8; length];
        std::io::Read::read_exact(reader, &mut buf).map_err(ReadError::Io)?;
        return serde_json::from_slice(&buf)
            .map_err(|e| ReadError::Parse(format!("invalid JSON payload: {e}")));
    }

    if *framing == Framing::Auto {
        *framing = Framing::Newline;
    }
    serde_json::from_str(trimmed).map_err(|e| ReadError::Parse(format!("invalid JSON line: {e}")))
}

pub fn write_message(
    writer: &mut impl Write,
    framing: Framing,
    value: &Value,
) -> std::io::Result<()> {
    let encoded = serde_json::to_vec(value).expect("response always serializes");
    match framing {
        Framing::Newline => {
            writer.write_all(&encoded)?;
            writer.write_all(b"\n")?;
        }
        _ => {
            write!(writer, "Content-Length: {}\r\n\r\n", encoded.len())?;
            writer.write_all(&encoded)?;
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_newline_framing_from_first_line() {
        let mut reader = Cursor::new(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n".to_vec());
        let mut framing = Framing::Auto;
        let value = read_message(&mut reader, &mut framing).unwrap();
        assert_eq!(framing, Framing::Newline);
        assert_eq!(value["method"], "ping");
    }

    #[test]
    fn detects_length_prefixed_framing() {
        let body = br#"{"jsonrpc":"2.0","method":"ping","id":1}"#;
        let mut input = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        input.extend_from_slice(body);
        let mut reader = Cursor::new(input);
        let mut framing = Framing::Auto;
        let value = read_message(&mut reader, &mut framing).unwrap();
        assert_eq!(framing, Framing::LengthPrefixed);
        assert_eq!(value["method"], "ping");
    }

    #[test]
    fn write_message_newline_appends_single_newline() {
        let mut out = Vec::new();
        write_message(&mut out, Framing::Newline, &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(out, b"{\"a\":1}\n");
    }

    #[test]
    fn write_message_length_prefixed_has_header() {
        let mut out = Vec::new();
        write_message(&mut out, Framing::LengthPrefixed, &serde_json::json!({"a": 1})).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Content-Length: 8\r\n\r\n"));
    }
}
