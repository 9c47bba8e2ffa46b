//! STOMP 1.2 frames and the codec that reads and writes them

use crate::error::{BrokerError, BrokerResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use tokio_util::codec::{Decoder, Encoder};

/// Frames above this size are treated as a protocol violation
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// What comes off the wire: a frame or a bare end-of-line heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    Heartbeat,
    Frame(Frame),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = BrokerError;

    fn decode(&mut self, src: &mut BytesMut) -> BrokerResult<Option<StompItem>> {
        match src.first() {
            None => return Ok(None),
            Some(b'\n') => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(b'\r') => {
                return match src.get(1) {
                    None => Ok(None),
                    Some(b'\n') => {
                        src.advance(2);
                        Ok(Some(StompItem::Heartbeat))
                    }
                    Some(_) => Err(BrokerError::protocol("stray carriage return")),
                };
            }
            Some(_) => {}
        }

        let Some((head_end, body_start)) = find_header_end(src) else {
            return check_len(src.len()).map(|_| None);
        };

        let head = std::str::from_utf8(&src[..head_end])
            .map_err(|_| BrokerError::protocol("frame headers are not UTF-8"))?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)
            .ok_or_else(|| BrokerError::protocol(format!("unknown command '{command_line}'")))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| BrokerError::protocol(format!("malformed header '{line}'")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| BrokerError::protocol(format!("bad content-length '{v}'")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                check_len(len)?;
                let end = body_start
                    .checked_add(len)
                    .ok_or_else(|| BrokerError::protocol(format!("content-length {len} out of range")))?;
                if src.len() <= end {
                    return check_len(end + 1).map(|_| None);
                }
                if src[end] != 0 {
                    return Err(BrokerError::protocol("frame body not NUL terminated"));
                }
                end
            }
            None => match src[body_start..].iter().position(|&b| b == 0) {
                Some(offset) => body_start + offset,
                None => return check_len(src.len()).map(|_| None),
            },
        };

        let raw = src.split_to(body_end + 1).freeze();
        let body = raw.slice(body_start..body_end);

        Ok(Some(StompItem::Frame(Frame { command, headers, body })))
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = BrokerError;

    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> BrokerResult<()> {
        match item {
            StompItem::Heartbeat => dst.put_u8(b'\n'),
            StompItem::Frame(frame) => encode_frame(&frame, dst),
        }
        Ok(())
    }
}

fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(frame.body.len() + 128);
    dst.put_slice(frame.command.as_str().as_bytes());
    dst.put_u8(b'\n');

    for (name, value) in &frame.headers {
        if frame.command.escapes_headers() {
            dst.put_slice(escape(name).as_bytes());
            dst.put_u8(b':');
            dst.put_slice(escape(value).as_bytes());
        } else {
            dst.put_slice(name.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(value.as_bytes());
        }
        dst.put_u8(b'\n');
    }

    if !frame.body.is_empty() && frame.get_header("content-length").is_none() {
        dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
    }

    dst.put_u8(b'\n');
    dst.put_slice(&frame.body);
    dst.put_u8(0);
}

/// Offsets of the end of the header block and the start of the body
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, i + 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn check_len(len: usize) -> BrokerResult<()> {
    if len > MAX_FRAME_LEN {
        return Err(BrokerError::protocol(format!("frame exceeds {MAX_FRAME_LEN} bytes")));
    }
    Ok(())
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\n', '\r', ':']) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(value: &str) -> BrokerResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(BrokerError::protocol(format!("invalid header escape '\\{}'", other.unwrap_or(' '))))
            }
        }
    }

    Ok(out)
}
