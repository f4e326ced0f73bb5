//! RESP-1 wire framing: simple strings, errors, integers, bulk strings, and
//! arrays — the subset needed for PING/AUTH/GET/SET/SETEX/DEL/FLUSHDB.
//!
//! Hand-rolled rather than pulled from a crate: the surrounding connection
//! handling still leans on `tokio`, only the byte-level framing is custom,
//! matching how HTTP/1.1 requests and responses are hand-framed elsewhere
//! in this workspace's data plane.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::KvError;

/// A decoded RESP-1 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is a RESP nil bulk string (`$-1\r\n`).
    Bulk(Option<Vec<u8>>),
    /// `None` is a RESP nil array (`*-1\r\n`).
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn into_bulk(self) -> Option<Vec<u8>> {
        match self {
            RespValue::Bulk(v) => v,
            _ => None,
        }
    }

    pub fn is_ok_simple(&self) -> bool {
        matches!(self, RespValue::Simple(s) if s == "OK" || s == "PONG")
    }
}

/// Encode a command as a RESP-1 array of bulk strings — the canonical
/// request framing regardless of command shape.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

pub async fn write_command<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    args: &[&[u8]],
) -> Result<(), KvError> {
    writer.write_all(&encode_command(args)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and parse one RESP-1 value from a buffered reader.
pub async fn read_value<R: AsyncBufReadExt + AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<RespValue, KvError> {
    let line = read_line(reader).await?;
    let Some((prefix, rest)) = split_first_byte(&line) else {
        return Err(KvError::Protocol("empty line".to_string()));
    };

    match prefix {
        b'+' => Ok(RespValue::Simple(rest.to_string())),
        b'-' => Ok(RespValue::Error(rest.to_string())),
        b':' => {
            let n: i64 = rest
                .parse()
                .map_err(|_| KvError::Protocol(format!("invalid integer: {rest}")))?;
            Ok(RespValue::Integer(n))
        }
        b'$' => {
            let len: i64 = rest
                .parse()
                .map_err(|_| KvError::Protocol(format!("invalid bulk length: {rest}")))?;
            if len < 0 {
                return Ok(RespValue::Bulk(None));
            }
            let len = len as usize;
            let mut buf = vec![0u8; len + 2]; // +2 for trailing \r\n
            reader.read_exact(&mut buf).await?;
            buf.truncate(len);
            Ok(RespValue::Bulk(Some(buf)))
        }
        b'*' => {
            let len: i64 = rest
                .parse()
                .map_err(|_| KvError::Protocol(format!("invalid array length: {rest}")))?;
            if len < 0 {
                return Ok(RespValue::Array(None));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(Box::pin(read_value(reader)).await?);
            }
            Ok(RespValue::Array(Some(items)))
        }
        other => Err(KvError::Protocol(format!(
            "unknown RESP type byte: {}",
            other as char
        ))),
    }
}

/// Read one `\r\n`-terminated line, returning it without the terminator.
async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<String, KvError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(KvError::ConnectionClosed);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn split_first_byte(s: &str) -> Option<(u8, &str)> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    let rest = &s[first.len_utf8()..];
    Some((first as u8, rest))
}

pub type BufStream<S> = BufReader<S>;
