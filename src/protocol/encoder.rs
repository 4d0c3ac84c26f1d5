//! RESP3 encoder.
//!
//! Serializes [`Value`]s with the inverse of the decoder's rules, and
//! command frames as the array-of-blob-strings form servers consume.

use super::markers;
use super::value::Value;
use super::CRLF;
use bytes::{BufMut, Bytes, BytesMut};

/// One command argument: the heterogeneous scalar set accepted by the
/// generic send surface.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    /// UTF-8 text, sent as its bytes.
    Text(String),
    /// Signed integer, sent as ASCII decimal.
    Integer(i64),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Boolean, sent as the single byte `t` or `f`.
    Boolean(bool),
}

impl CommandArg {
    fn write_blob(&self, buf: &mut BytesMut) {
        match self {
            CommandArg::Text(s) => write_blob_bytes(buf, s.as_bytes()),
            CommandArg::Integer(n) => write_blob_bytes(buf, n.to_string().as_bytes()),
            CommandArg::Bytes(b) => write_blob_bytes(buf, b),
            CommandArg::Boolean(b) => write_blob_bytes(buf, if *b { b"t" } else { b"f" }),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(s: &str) -> Self {
        CommandArg::Text(s.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(s: String) -> Self {
        CommandArg::Text(s)
    }
}

impl From<i64> for CommandArg {
    fn from(n: i64) -> Self {
        CommandArg::Integer(n)
    }
}

impl From<u32> for CommandArg {
    fn from(n: u32) -> Self {
        CommandArg::Integer(i64::from(n))
    }
}

impl From<bool> for CommandArg {
    fn from(b: bool) -> Self {
        CommandArg::Boolean(b)
    }
}

impl From<Bytes> for CommandArg {
    fn from(b: Bytes) -> Self {
        CommandArg::Bytes(b)
    }
}

impl From<Vec<u8>> for CommandArg {
    fn from(v: Vec<u8>) -> Self {
        CommandArg::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for CommandArg {
    fn from(v: &[u8]) -> Self {
        CommandArg::Bytes(Bytes::copy_from_slice(v))
    }
}

/// RESP3 encoder with a reusable output buffer.
///
/// Every `encode*` call serializes into the internal buffer and returns the
/// frozen bytes; the buffer's capacity is reused across calls.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Serialize one value.
    pub fn encode(&mut self, value: &Value) -> Bytes {
        write_value(&mut self.buf, value);
        self.buf.split().freeze()
    }

    /// Serialize a sequence of values back-to-back.
    pub fn encode_sequence(&mut self, values: &[Value]) -> Bytes {
        for value in values {
            write_value(&mut self.buf, value);
        }
        self.buf.split().freeze()
    }

    /// Serialize a command as an array of blob strings: the verb followed by
    /// each coerced argument.
    pub fn encode_command(&mut self, verb: &str, args: &[CommandArg]) -> Bytes {
        write_header(&mut self.buf, markers::ARRAY, args.len() + 1);
        write_blob_bytes(&mut self.buf, verb.as_bytes());
        for arg in args {
            arg.write_blob(&mut self.buf);
        }
        self.buf.split().freeze()
    }
}

/// Serialize one value into `buf`. Every representable value encodes, so
/// this cannot fail.
pub fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Simple(s) => write_line(buf, markers::SIMPLE_STRING, s),
        Value::Error(e) => write_line(buf, markers::ERROR, e),
        Value::Integer(n) => write_line(buf, markers::INTEGER, n.to_string().as_bytes()),
        Value::Double(d) => write_line(buf, markers::DOUBLE, format_double(*d).as_bytes()),
        Value::BigNumber(n) => write_line(buf, markers::BIG_NUMBER, n),
        Value::Boolean(b) => write_line(buf, markers::BOOLEAN, if *b { b"t" } else { b"f" }),
        Value::Null => write_line(buf, markers::NULL, b""),
        Value::Blob(Some(data)) => {
            write_header(buf, markers::BLOB_STRING, data.len());
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Value::Blob(None) => write_null_header(buf, markers::BLOB_STRING),
        Value::BlobError(data) => {
            write_header(buf, markers::BLOB_ERROR, data.len());
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Value::Verbatim { format, data } => {
            write_header(buf, markers::VERBATIM_STRING, format.len() + 1 + data.len());
            buf.put_slice(format);
            buf.put_u8(b':');
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
        Value::Array(Some(values)) => {
            write_header(buf, markers::ARRAY, values.len());
            for child in values {
                write_value(buf, child);
            }
        }
        Value::Array(None) => write_null_header(buf, markers::ARRAY),
        Value::Map(Some(pairs)) => {
            write_header(buf, markers::MAP, pairs.len());
            for (key, val) in pairs {
                write_value(buf, key);
                write_value(buf, val);
            }
        }
        Value::Map(None) => write_null_header(buf, markers::MAP),
        Value::Set(Some(values)) => {
            write_header(buf, markers::SET, values.len());
            for child in values {
                write_value(buf, child);
            }
        }
        Value::Set(None) => write_null_header(buf, markers::SET),
        Value::Push(values) => {
            write_header(buf, markers::PUSH, values.len());
            for child in values {
                write_value(buf, child);
            }
        }
        Value::Attributed { attrs, value } => {
            // The attributes aggregate precedes the value it decorates.
            write_header(buf, markers::ATTRIBUTES, attrs.len());
            for (key, val) in attrs {
                write_value(buf, key);
                write_value(buf, val);
            }
            write_value(buf, value);
        }
    }
}

#[inline]
fn write_line(buf: &mut BytesMut, marker: u8, payload: &[u8]) {
    buf.put_u8(marker);
    buf.put_slice(payload);
    buf.put_slice(CRLF);
}

#[inline]
fn write_header(buf: &mut BytesMut, marker: u8, len: usize) {
    buf.put_u8(marker);
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(CRLF);
}

#[inline]
fn write_null_header(buf: &mut BytesMut, marker: u8) {
    buf.put_u8(marker);
    buf.put_slice(b"-1");
    buf.put_slice(CRLF);
}

#[inline]
fn write_blob_bytes(buf: &mut BytesMut, data: &[u8]) {
    write_header(buf, markers::BLOB_STRING, data.len());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

/// The wire spelling of a double: `inf` / `-inf` / `nan` for the non-finite
/// cases, shortest round-trip decimal otherwise.
fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".to_string()
    } else if d.is_infinite() {
        if d.is_sign_positive() {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.encode(value).to_vec()
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::simple("OK")), b"+OK\r\n");
        assert_eq!(encode(&Value::error("ERR bad")), b"-ERR bad\r\n");
        assert_eq!(encode(&Value::Integer(-42)), b":-42\r\n");
        assert_eq!(encode(&Value::Boolean(true)), b"#t\r\n");
        assert_eq!(encode(&Value::Boolean(false)), b"#f\r\n");
        assert_eq!(encode(&Value::Null), b"_\r\n");
        assert_eq!(
            encode(&Value::BigNumber(Bytes::from_static(b"12345678901234567890"))),
            b"(12345678901234567890\r\n"
        );
    }

    #[test]
    fn test_encode_doubles() {
        assert_eq!(encode(&Value::Double(3.25)), b",3.25\r\n");
        assert_eq!(encode(&Value::Double(10.0)), b",10\r\n");
        assert_eq!(encode(&Value::Double(f64::INFINITY)), b",inf\r\n");
        assert_eq!(encode(&Value::Double(f64::NEG_INFINITY)), b",-inf\r\n");
        assert_eq!(encode(&Value::Double(f64::NAN)), b",nan\r\n");
    }

    #[test]
    fn test_encode_blobs() {
        assert_eq!(encode(&Value::blob("hello")), b"$5\r\nhello\r\n");
        assert_eq!(encode(&Value::blob("")), b"$0\r\n\r\n");
        assert_eq!(encode(&Value::null_blob()), b"$-1\r\n");
        assert_eq!(
            encode(&Value::BlobError(Bytes::from_static(b"SYNTAX oops"))),
            b"!11\r\nSYNTAX oops\r\n"
        );
        assert_eq!(
            encode(&Value::verbatim("txt", "msg")),
            b"=7\r\ntxt:msg\r\n"
        );
    }

    #[test]
    fn test_encode_aggregates() {
        assert_eq!(
            encode(&Value::array(vec![Value::simple("a"), Value::Integer(1)])),
            b"*2\r\n+a\r\n:1\r\n"
        );
        assert_eq!(encode(&Value::null_array()), b"*-1\r\n");
        assert_eq!(
            encode(&Value::map(vec![(Value::simple("k"), Value::Integer(1))])),
            b"%1\r\n+k\r\n:1\r\n"
        );
        assert_eq!(encode(&Value::Map(None)), b"%-1\r\n");
        assert_eq!(
            encode(&Value::set(vec![Value::simple("x")])),
            b"~1\r\n+x\r\n"
        );
        assert_eq!(
            encode(&Value::push(vec![Value::simple("evt")])),
            b">1\r\n+evt\r\n"
        );
    }

    #[test]
    fn test_encode_attributed_value() {
        let value = Value::simple("OK")
            .with_attributes(vec![(Value::simple("ttl"), Value::Integer(3600))]);
        assert_eq!(encode(&value), b"|1\r\n+ttl\r\n:3600\r\n+OK\r\n");
    }

    #[test]
    fn test_encode_command_is_array_of_blobs() {
        let mut encoder = Encoder::new();
        let bytes = encoder.encode_command(
            "SET",
            &[CommandArg::from("key"), CommandArg::from("value")],
        );
        assert_eq!(&bytes[..], b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
    }

    #[test]
    fn test_encode_command_coercions() {
        let mut encoder = Encoder::new();
        let bytes = encoder.encode_command(
            "X",
            &[
                CommandArg::from(7i64),
                CommandArg::from(true),
                CommandArg::from(vec![0u8, 1, 2]),
            ],
        );
        assert_eq!(
            &bytes[..],
            b"*4\r\n$1\r\nX\r\n$1\r\n7\r\n$1\r\nt\r\n$3\r\n\x00\x01\x02\r\n"
        );
    }

    #[test]
    fn test_hello_handshake_bytes() {
        let mut encoder = Encoder::new();
        let bytes = encoder.encode_command("HELLO", &[CommandArg::from("3")]);
        assert_eq!(&bytes[..], b"*2\r\n$5\r\nHELLO\r\n$1\r\n3\r\n");
    }

    #[test]
    fn test_encode_sequence() {
        let mut encoder = Encoder::new();
        let bytes = encoder.encode_sequence(&[Value::simple("a"), Value::Integer(1)]);
        assert_eq!(&bytes[..], b"+a\r\n:1\r\n");
    }

    #[test]
    fn test_buffer_reuse_across_calls() {
        let mut encoder = Encoder::new();
        let first = encoder.encode(&Value::simple("one"));
        let second = encoder.encode(&Value::simple("two"));
        assert_eq!(&first[..], b"+one\r\n");
        assert_eq!(&second[..], b"+two\r\n");
    }
}
