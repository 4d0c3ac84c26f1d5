//! Incremental RESP3 decoder.
//!
//! The decoder is designed for:
//! - Streaming input: `feed` accepts arbitrary byte chunks, `poll` yields
//!   values as soon as they complete, and a value split across any number
//!   of chunks resumes exactly where it paused.
//! - Security: bounded blob sizes and aggregate lengths, no recursion.
//!
//! Consumption is atomic per value: nothing is consumed for a scalar or
//! blob until the whole value (terminator included) is buffered, so a
//! "need more" answer never loses position. Aggregate headers are consumed
//! when their line completes and leave a frame on the stack; the frame
//! stack survives across `feed` calls.
//!
//! On any decode error the decoder abandons its buffer, clears the frame
//! stack and any pending attributes, and keeps running — the next `feed`
//! starts fresh. Recovery above the codec is the session's business.

use super::markers;
use super::value::{Pairs, Value};
use crate::error::{DecodeError, ProtocolError};
use crate::{MAX_AGGREGATE_LEN, MAX_BLOB_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;

/// One completed top-level value, classified for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A reply that consumes a pending request.
    Reply(Value),
    /// A server-initiated push frame; never consumes a pending request.
    Push(Value),
}

impl Output {
    /// Unwrap the value, dropping the classification.
    #[inline]
    pub fn into_value(self) -> Value {
        match self {
            Output::Reply(v) | Output::Push(v) => v,
        }
    }

    /// True for push frames.
    #[inline]
    pub fn is_push(&self) -> bool {
        matches!(self, Output::Push(_))
    }
}

/// Aggregate kinds that park a frame on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggKind {
    Array,
    Map,
    Set,
    Push,
    Attributes,
}

/// An in-progress aggregate, parked while its children stream in.
#[derive(Debug)]
struct AggFrame {
    kind: AggKind,
    /// Children still to collect (pairs count double for map/attributes).
    remaining: usize,
    items: Vec<Value>,
    /// Attributes that were pending immediately before this aggregate's
    /// header; they decorate the whole aggregate once it completes.
    attrs: Option<Pairs>,
}

/// What one dispatch step produced.
enum Step {
    /// A complete value (scalar, blob, or empty/null aggregate).
    Value(Value),
    /// An aggregate header was consumed and a frame pushed; keep going.
    Descend,
    /// The buffer ends inside the current value.
    NeedMore,
}

/// Streaming RESP3 decoder.
///
/// # Usage
///
/// ```
/// use nuntius::{Decoder, Output, Value};
///
/// let mut decoder = Decoder::new();
/// decoder.feed(b"+OK\r\n");
/// match decoder.poll().unwrap() {
///     Some(Output::Reply(v)) => assert_eq!(v, Value::simple("OK")),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
    stack: Vec<AggFrame>,
    pending_attrs: Option<Pairs>,
    /// Total bytes consumed since creation (or since the last reset).
    consumed: u64,
}

impl Decoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            stack: Vec::new(),
            pending_attrs: None,
            consumed: 0,
        }
    }

    /// Append a chunk of bytes from the wire.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// True when no bytes are buffered and no value is in progress.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.buf.is_empty() && self.stack.is_empty() && self.pending_attrs.is_none()
    }

    /// Total bytes consumed so far (error offsets count from here).
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Try to produce the next complete top-level value.
    ///
    /// Returns `Ok(None)` when more input is needed. Callers drain in a
    /// loop after each `feed`. On `Err` the decoder has already reset.
    pub fn poll(&mut self) -> Result<Option<Output>, DecodeError> {
        loop {
            let step = match self.parse_step() {
                Ok(step) => step,
                Err(kind) => {
                    let err = DecodeError {
                        offset: self.consumed,
                        kind,
                    };
                    self.reset();
                    return Err(err);
                }
            };
            match step {
                Step::NeedMore => return Ok(None),
                Step::Descend => continue,
                Step::Value(value) => {
                    if let Some(output) = self.absorb(value) {
                        return Ok(Some(output));
                    }
                }
            }
        }
    }

    /// Drop all buffered input and in-progress state.
    fn reset(&mut self) {
        self.buf.clear();
        self.stack.clear();
        self.pending_attrs = None;
        self.consumed = 0;
    }

    /// Dispatch on the next type prefix.
    fn parse_step(&mut self) -> Result<Step, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(Step::NeedMore);
        }
        let marker = self.buf[0];
        match marker {
            markers::SIMPLE_STRING
            | markers::ERROR
            | markers::INTEGER
            | markers::DOUBLE
            | markers::BIG_NUMBER
            | markers::BOOLEAN
            | markers::NULL => self.parse_scalar(marker),
            markers::BLOB_STRING | markers::BLOB_ERROR | markers::VERBATIM_STRING => {
                self.parse_blob(marker)
            }
            markers::ARRAY
            | markers::MAP
            | markers::SET
            | markers::PUSH
            | markers::ATTRIBUTES => self.parse_aggregate(marker),
            other => Err(ProtocolError::UnexpectedPrefix(other as char)),
        }
    }

    /// Parse a single-line value. Consumes nothing until the line is whole.
    fn parse_scalar(&mut self, marker: u8) -> Result<Step, ProtocolError> {
        let line = match self.take_line() {
            Some(line) => line,
            None => return Ok(Step::NeedMore),
        };
        let value = match marker {
            markers::SIMPLE_STRING => Value::Simple(line),
            markers::ERROR => Value::Error(line),
            markers::INTEGER => Value::Integer(parse_i64(&line)?),
            markers::DOUBLE => Value::Double(parse_f64(&line)?),
            // Big numbers are preserved as the literal digit string; inputs
            // that a bignum parser would reject (leading '+') pass through.
            markers::BIG_NUMBER => Value::BigNumber(line),
            markers::BOOLEAN => match line.as_ref() {
                b"t" => Value::Boolean(true),
                b"f" => Value::Boolean(false),
                _ => return Err(ProtocolError::InvalidBoolean),
            },
            _ => {
                if !line.is_empty() {
                    return Err(ProtocolError::InvalidNull);
                }
                Value::Null
            }
        };
        Ok(Step::Value(self.decorate(value)))
    }

    /// Parse a length-prefixed payload (`$`, `!`, `=`). Consumes nothing
    /// until header, payload, and terminator are all buffered.
    fn parse_blob(&mut self, marker: u8) -> Result<Step, ProtocolError> {
        let (len, header_len) = match self.peek_length()? {
            Some(parsed) => parsed,
            None => return Ok(Step::NeedMore),
        };

        if len == -1 {
            // Only the blob string has a null form; `!-1` and `=-1` are
            // contradictory on the wire.
            if marker != markers::BLOB_STRING {
                return Err(ProtocolError::InvalidLength(-1));
            }
            self.advance(header_len);
            return Ok(Step::Value(self.decorate(Value::Blob(None))));
        }
        if len < -1 || len as usize > MAX_BLOB_SIZE {
            return Err(ProtocolError::InvalidLength(len));
        }

        let n = len as usize;
        let total = header_len + n + 2;
        if self.buf.len() < total {
            return Ok(Step::NeedMore);
        }
        if &self.buf[header_len + n..total] != b"\r\n" {
            return Err(ProtocolError::BlobUnterminated);
        }

        self.buf.advance(header_len);
        let data = self.buf.split_to(n).freeze();
        self.buf.advance(2);
        self.consumed += total as u64;

        let value = match marker {
            markers::BLOB_STRING => Value::Blob(Some(data)),
            markers::BLOB_ERROR => Value::BlobError(data),
            _ => split_verbatim(data),
        };
        Ok(Step::Value(self.decorate(value)))
    }

    /// Parse an aggregate header (`*`, `%`, `~`, `>`, `|`).
    fn parse_aggregate(&mut self, marker: u8) -> Result<Step, ProtocolError> {
        let (len, header_len) = match self.peek_length()? {
            Some(parsed) => parsed,
            None => return Ok(Step::NeedMore),
        };
        let kind = match marker {
            markers::ARRAY => AggKind::Array,
            markers::MAP => AggKind::Map,
            markers::SET => AggKind::Set,
            markers::PUSH => AggKind::Push,
            _ => AggKind::Attributes,
        };

        if len == -1 {
            let value = match kind {
                AggKind::Array => Value::Array(None),
                AggKind::Map => Value::Map(None),
                AggKind::Set => Value::Set(None),
                // A `-1`-length push decodes as an empty push.
                AggKind::Push => Value::Push(Vec::new()),
                AggKind::Attributes => return Err(ProtocolError::InvalidLength(-1)),
            };
            self.advance(header_len);
            return Ok(Step::Value(self.decorate_aggregate(kind, value)));
        }
        if len < -1 || len as usize > MAX_AGGREGATE_LEN {
            return Err(ProtocolError::InvalidLength(len));
        }

        let n = len as usize;
        self.advance(header_len);

        if n == 0 {
            // Zero-length aggregates resolve immediately.
            return match kind {
                AggKind::Attributes => {
                    self.pending_attrs = Some(Vec::new());
                    Ok(Step::Descend)
                }
                AggKind::Array => Ok(Step::Value(
                    self.decorate_aggregate(kind, Value::Array(Some(Vec::new()))),
                )),
                AggKind::Map => Ok(Step::Value(
                    self.decorate_aggregate(kind, Value::Map(Some(Vec::new()))),
                )),
                AggKind::Set => Ok(Step::Value(
                    self.decorate_aggregate(kind, Value::Set(Some(Vec::new()))),
                )),
                AggKind::Push => Ok(Step::Value(Value::Push(Vec::new()))),
            };
        }

        let remaining = match kind {
            // Maps and attributes stream keys and values as alternating
            // children.
            AggKind::Map | AggKind::Attributes => n
                .checked_mul(2)
                .ok_or(ProtocolError::InvalidLength(len))?,
            _ => n,
        };
        let attrs = match kind {
            // Attributes never decorate themselves, and pushes never carry
            // attributes; the pending cell stays for the next value.
            AggKind::Attributes | AggKind::Push => None,
            _ => self.pending_attrs.take(),
        };
        self.stack.push(AggFrame {
            kind,
            remaining,
            items: Vec::with_capacity(remaining.min(1024)),
            attrs,
        });
        Ok(Step::Descend)
    }

    /// Route a completed value into the innermost open aggregate, cascading
    /// as frames fill up. Returns the top-level output when one completes.
    fn absorb(&mut self, value: Value) -> Option<Output> {
        let mut value = value;
        loop {
            match self.stack.last_mut() {
                None => {
                    return Some(match value {
                        Value::Push(_) => Output::Push(value),
                        other => Output::Reply(other),
                    });
                }
                Some(frame) => {
                    frame.items.push(value);
                    frame.remaining -= 1;
                    if frame.remaining > 0 {
                        return None;
                    }
                }
            }
            // The frame we just filled is finalized off the stack.
            let frame = match self.stack.pop() {
                Some(frame) => frame,
                None => return None,
            };
            let AggFrame {
                kind, items, attrs, ..
            } = frame;
            match kind {
                AggKind::Attributes => {
                    // An attributes map is never surfaced as a value; it
                    // becomes the pending cell for the next value produced.
                    self.pending_attrs = Some(pair_up(items));
                    return None;
                }
                AggKind::Array => value = apply_attrs(Value::Array(Some(items)), attrs),
                AggKind::Map => value = apply_attrs(Value::Map(Some(pair_up(items))), attrs),
                AggKind::Set => value = apply_attrs(Value::Set(Some(items)), attrs),
                AggKind::Push => value = Value::Push(items),
            }
        }
    }

    /// Attach the pending attributes cell to a just-produced value.
    fn decorate(&mut self, value: Value) -> Value {
        match self.pending_attrs.take() {
            Some(attrs) => value.with_attributes(attrs),
            None => value,
        }
    }

    /// Attribute attachment for header-resolved aggregates: pushes pass the
    /// pending cell through untouched.
    fn decorate_aggregate(&mut self, kind: AggKind, value: Value) -> Value {
        match kind {
            AggKind::Push => value,
            _ => self.decorate(value),
        }
    }

    /// Take one whole line after a marker byte: marker, line, and CRLF are
    /// consumed together or not at all.
    fn take_line(&mut self) -> Option<Bytes> {
        let pos = find_crlf(&self.buf[1..])?;
        let total = 1 + pos + 2;
        let mut chunk = self.buf.split_to(total);
        self.consumed += total as u64;
        chunk.advance(1);
        chunk.truncate(pos);
        Some(chunk.freeze())
    }

    /// Peek a length header without consuming it. Returns the parsed length
    /// and the full header length (marker + digits + CRLF).
    fn peek_length(&self) -> Result<Option<(i64, usize)>, ProtocolError> {
        let pos = match find_crlf(&self.buf[1..]) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let len = parse_i64(&self.buf[1..1 + pos])?;
        Ok(Some((len, 1 + pos + 2)))
    }

    /// Consume `n` already-validated bytes.
    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.consumed += n as u64;
    }
}

/// One-shot decode of a single complete value (tests and simple callers).
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    let mut decoder = Decoder::new();
    decoder.feed(data);
    match decoder.poll()? {
        Some(output) => Ok(output.into_value()),
        None => Err(DecodeError {
            offset: decoder.consumed(),
            kind: ProtocolError::Incomplete,
        }),
    }
}

/// Find the first CRLF by forward scan.
///
/// SIMD-accelerated search for `\r`, then verify `\n` follows; a lone `\r`
/// is skipped, a trailing `\r` means the terminator is not buffered yet.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while offset < buf.len().saturating_sub(1) {
        match memchr(b'\r', &buf[offset..]) {
            Some(pos) => {
                let abs = offset + pos;
                if abs + 1 < buf.len() && buf[abs + 1] == b'\n' {
                    return Some(abs);
                }
                offset = abs + 1;
            }
            None => return None,
        }
    }
    None
}

fn parse_i64(line: &[u8]) -> Result<i64, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidNumeric(String::from_utf8_lossy(line).into_owned()))?;
    text.parse::<i64>()
        .map_err(|_| ProtocolError::InvalidNumeric(text.to_string()))
}

fn parse_f64(line: &[u8]) -> Result<f64, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidNumeric(String::from_utf8_lossy(line).into_owned()))?;
    // `f64::from_str` already accepts `inf`, `-inf`, and `nan` in any case.
    text.parse::<f64>()
        .map_err(|_| ProtocolError::InvalidNumeric(text.to_string()))
}

/// Split a verbatim payload into its format tag and data. Lenient: without
/// a colon at offset 3 the whole payload is `txt` data.
fn split_verbatim(data: Bytes) -> Value {
    if data.len() >= 4 && data[3] == b':' {
        let format = [data[0], data[1], data[2]];
        Value::Verbatim {
            format,
            data: data.slice(4..),
        }
    } else {
        Value::Verbatim {
            format: *b"txt",
            data,
        }
    }
}

fn pair_up(items: Vec<Value>) -> Pairs {
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((key, value));
    }
    pairs
}

fn apply_attrs(value: Value, attrs: Option<Pairs>) -> Value {
    match attrs {
        Some(attrs) => value.with_attributes(attrs),
        None => value,
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The decoder must never panic, whatever the input.
        #[test]
        fn decoder_never_panics(data: Vec<u8>) {
            let mut decoder = Decoder::new();
            decoder.feed(&data);
            loop {
                match decoder.poll() {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
        }

        /// Chunk boundaries must not change what a valid stream decodes to.
        #[test]
        fn chunking_is_invisible(split in 0usize..60) {
            let stream: &[u8] =
                b"*3\r\n$5\r\nhello\r\n|1\r\n+k\r\n:1\r\n+tag\r\n:42\r\n>1\r\n+evt\r\n";
            let mut whole = Decoder::new();
            whole.feed(stream);
            let mut expected = Vec::new();
            while let Some(out) = whole.poll().unwrap() {
                expected.push(out);
            }

            let cut = split.min(stream.len());
            let mut chunked = Decoder::new();
            let mut actual = Vec::new();
            chunked.feed(&stream[..cut]);
            while let Some(out) = chunked.poll().unwrap() {
                actual.push(out);
            }
            chunked.feed(&stream[cut..]);
            while let Some(out) = chunked.poll().unwrap() {
                actual.push(out);
            }
            prop_assert_eq!(actual, expected);
        }

        /// Integers survive the wire in both directions.
        #[test]
        fn integer_decode_roundtrip(n: i64) {
            let encoded = format!(":{n}\r\n");
            prop_assert_eq!(decode(encoded.as_bytes()).unwrap(), Value::Integer(n));
        }

        /// Arbitrary binary blobs survive length-prefixed framing.
        #[test]
        fn blob_decode_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut encoded = format!("${}\r\n", data.len()).into_bytes();
            encoded.extend_from_slice(&data);
            encoded.extend_from_slice(b"\r\n");
            prop_assert_eq!(
                decode(&encoded).unwrap(),
                Value::Blob(Some(Bytes::from(data)))
            );
        }
    }
}
