//! Wire Protocol Module
//!
//! Length-prefixed request/reply framing (RESP). Commands go out as arrays
//! of bulk strings; replies are decoded by recursive descent over any
//! [`BufRead`].

use std::io::BufRead;

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Line terminator used by every frame
pub const CRLF: &[u8] = b"\r\n";

/// Upper bound on a single read while consuming a bulk payload
pub const MAX_CHUNK: usize = 8192;

// == Reply ==
/// A decoded server reply, before JSON post-processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK`
    Ok,
    /// Any other `+` status line
    Status(String),
    /// `:` integer
    Integer(i64),
    /// `$` bulk payload
    Bulk(Vec<u8>),
    /// `$-1` or `*-1`
    Null,
    /// `*` array, elements in server order
    Array(Vec<Reply>),
}

impl Reply {
    // == Into Value ==
    /// Converts the reply into a JSON value.
    ///
    /// Textual replies that parse as JSON become the parsed value; other
    /// text is kept as a string. `+OK` becomes `true`.
    pub fn into_value(self) -> Value {
        match self {
            Reply::Ok => Value::Bool(true),
            Reply::Status(text) => decode_text(text),
            Reply::Integer(n) => Value::from(n),
            Reply::Bulk(bytes) => decode_text(String::from_utf8_lossy(&bytes).into_owned()),
            Reply::Null => Value::Null,
            Reply::Array(items) => Value::Array(items.into_iter().map(Reply::into_value).collect()),
        }
    }
}

fn decode_text(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

// == Encoding ==
/// Returns the payload sent for one argument.
///
/// Strings are sent verbatim; every other value is sent as JSON text.
pub fn encode_arg(arg: &Value) -> Result<Vec<u8>> {
    match arg {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}

/// Serializes a command as an array of bulk strings.
///
/// The command name is uppercased.
pub fn encode_command(name: &str, args: &[Value]) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    frame.extend_from_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    push_bulk(&mut frame, name.to_uppercase().as_bytes());
    for arg in args {
        push_bulk(&mut frame, &encode_arg(arg)?);
    }
    Ok(frame)
}

fn push_bulk(frame: &mut Vec<u8>, payload: &[u8]) {
    frame.extend_from_slice(format!("${}\r\n", payload.len()).as_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(CRLF);
}

// == Decoding ==
/// Reads one complete reply from `reader`.
///
/// Error replies surface as [`CacheError::Server`]; unknown markers as
/// [`CacheError::Protocol`].
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let line = read_line(reader)?;
    let mut chars = line.chars();
    let marker = chars.next();
    let body = chars.as_str().trim();

    match marker {
        Some('-') => Err(CacheError::Server(body.to_string())),
        Some('+') if body == "OK" => Ok(Reply::Ok),
        Some('+') => Ok(Reply::Status(body.to_string())),
        Some(':') => Ok(Reply::Integer(parse_int(body)?)),
        Some('$') => read_bulk(reader, parse_int(body)?),
        Some('*') => {
            let count = parse_int(body)?;
            if count < 0 {
                return Ok(Reply::Null);
            }
            // Consume every element before reporting an error element
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            let mut first_error = None;
            for _ in 0..count {
                match read_reply(reader) {
                    Ok(item) => items.push(item),
                    Err(e @ CacheError::Server(_)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(Reply::Array(items)),
            }
        }
        _ => Err(CacheError::Protocol(format!("Unexpected response: {line:?}"))),
    }
}

/// Reads `size` payload bytes in bounded chunks, then the terminator.
fn read_bulk<R: BufRead>(reader: &mut R, size: i64) -> Result<Reply> {
    if size < 0 {
        return Ok(Reply::Null);
    }

    let size = size as usize;
    let mut data = Vec::with_capacity(size.min(MAX_CHUNK * 16));
    let mut chunk = [0u8; MAX_CHUNK];
    while data.len() < size {
        let want = (size - data.len()).min(MAX_CHUNK);
        reader.read_exact(&mut chunk[..want]).map_err(truncated)?;
        data.extend_from_slice(&chunk[..want]);
    }

    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator).map_err(truncated)?;
    Ok(Reply::Bulk(data))
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Err(CacheError::Protocol("connection closed by server".to_string()));
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_int(text: &str) -> Result<i64> {
    text.parse()
        .map_err(|_| CacheError::Protocol(format!("invalid length or integer: {text:?}")))
}

fn truncated(e: std::io::Error) -> CacheError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        CacheError::Protocol("truncated bulk reply".to_string())
    } else {
        CacheError::Io(e)
    }
}
