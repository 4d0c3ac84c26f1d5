//! RESP3 value model.
//!
//! A [`Value`] is one complete protocol value as decoded from (or encoded to)
//! the wire. Null-ness of blobs and aggregates is carried in the variant
//! payload, so `$-1` stays distinct from `$0`, and attribute decorations are
//! an explicit wrapper around the value they decorate.

use bytes::Bytes;
use std::fmt;

/// Ordered key/value pairs, as maps and attributes arrive on the wire.
///
/// Insertion order is preserved and duplicate keys are allowed structurally;
/// folding duplicates is a consumer decision.
pub type Pairs = Vec<(Value, Value)>;

/// A complete RESP3 value.
///
/// # Design
///
/// Values are cheap to clone (binary payloads are [`Bytes`]) and compare
/// structurally: maps are ordered pair sequences, attributes are part of the
/// value they decorate, and the typed null forms (`Blob(None)`, `Array(None)`,
/// …) are distinct from the distinguished [`Value::Null`].
#[derive(Clone, PartialEq)]
pub enum Value {
    /// Simple string (`+`): short text without CR/LF.
    Simple(Bytes),

    /// Error (`-`): short error text.
    Error(Bytes),

    /// Integer (`:`): signed 64-bit.
    Integer(i64),

    /// Double (`,`): IEEE-754, including `inf`, `-inf`, and `nan`.
    Double(f64),

    /// Big number (`(`): the literal digit string, preserved verbatim.
    BigNumber(Bytes),

    /// Boolean (`#`).
    Boolean(bool),

    /// Distinguished null (`_`).
    Null,

    /// Blob string (`$`): binary-safe bytes, or the `$-1` null blob.
    Blob(Option<Bytes>),

    /// Blob error (`!`): binary-safe error text.
    BlobError(Bytes),

    /// Verbatim string (`=`): a three-byte format tag plus binary data.
    Verbatim {
        /// Format tag (`txt`, `mkd`, …); defaults to `txt` on lenient decode.
        format: [u8; 3],
        /// Payload after the colon.
        data: Bytes,
    },

    /// Array (`*`): ordered values, or the `*-1` null array.
    Array(Option<Vec<Value>>),

    /// Map (`%`): ordered key/value pairs, or the `%-1` null map.
    Map(Option<Pairs>),

    /// Set (`~`): collection of values, or the `~-1` null set.
    ///
    /// Wire order is preserved; the decoder does not deduplicate.
    Set(Option<Vec<Value>>),

    /// Push frame (`>`): server-initiated, outside the command/reply pairing.
    /// Never null; `>-1` decodes as an empty push.
    Push(Vec<Value>),

    /// A value decorated with attributes (`|` immediately before it).
    Attributed {
        /// The attribute pairs; may be empty (`|0`).
        attrs: Pairs,
        /// The decorated value.
        value: Box<Value>,
    },
}

impl Value {
    /// Create a simple string value.
    #[inline]
    pub fn simple(s: impl Into<Bytes>) -> Self {
        Self::Simple(s.into())
    }

    /// Create an error value.
    #[inline]
    pub fn error(s: impl Into<Bytes>) -> Self {
        Self::Error(s.into())
    }

    /// Create an integer value.
    #[inline]
    pub const fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// Create a blob string value.
    #[inline]
    pub fn blob(data: impl Into<Bytes>) -> Self {
        Self::Blob(Some(data.into()))
    }

    /// Create the null blob (`$-1`).
    #[inline]
    pub const fn null_blob() -> Self {
        Self::Blob(None)
    }

    /// Create an array value.
    #[inline]
    pub fn array(values: Vec<Value>) -> Self {
        Self::Array(Some(values))
    }

    /// Create the null array (`*-1`).
    #[inline]
    pub const fn null_array() -> Self {
        Self::Array(None)
    }

    /// Create a map value from ordered pairs.
    #[inline]
    pub fn map(pairs: Pairs) -> Self {
        Self::Map(Some(pairs))
    }

    /// Create a set value.
    #[inline]
    pub fn set(values: Vec<Value>) -> Self {
        Self::Set(Some(values))
    }

    /// Create a push frame.
    #[inline]
    pub fn push(values: Vec<Value>) -> Self {
        Self::Push(values)
    }

    /// Create a verbatim string; `format` is space-padded/truncated to the
    /// three-byte wire tag.
    pub fn verbatim(format: &str, data: impl Into<Bytes>) -> Self {
        let mut tag = [b' '; 3];
        for (slot, byte) in tag.iter_mut().zip(format.bytes()) {
            *slot = byte;
        }
        Self::Verbatim {
            format: tag,
            data: data.into(),
        }
    }

    /// Decorate this value with attribute pairs.
    #[inline]
    pub fn with_attributes(self, attrs: Pairs) -> Self {
        Self::Attributed {
            attrs,
            value: Box::new(self),
        }
    }

    /// The attribute pairs decorating this value, if any.
    #[inline]
    pub fn attributes(&self) -> Option<&Pairs> {
        match self {
            Self::Attributed { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// The value itself, looking through an attribute decoration.
    #[inline]
    pub fn without_attributes(&self) -> &Value {
        match self {
            Self::Attributed { value, .. } => value,
            other => other,
        }
    }

    /// True for the distinguished null and every typed null form.
    pub fn is_null(&self) -> bool {
        matches!(
            self.without_attributes(),
            Self::Null | Self::Blob(None) | Self::Array(None) | Self::Map(None) | Self::Set(None)
        )
    }

    /// True for error and blob-error values.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(
            self.without_attributes(),
            Self::Error(_) | Self::BlobError(_)
        )
    }

    /// True for push frames.
    #[inline]
    pub fn is_push(&self) -> bool {
        matches!(self.without_attributes(), Self::Push(_))
    }

    /// Try to view the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self.without_attributes() {
            Self::Simple(b) | Self::Error(b) | Self::BlobError(b) | Self::BigNumber(b) => {
                std::str::from_utf8(b).ok()
            }
            Self::Blob(Some(b)) | Self::Verbatim { data: b, .. } => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to view the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.without_attributes() {
            Self::Simple(b) | Self::BigNumber(b) => Some(b),
            Self::Blob(Some(b)) | Self::Verbatim { data: b, .. } => Some(b),
            _ => None,
        }
    }

    /// Try to read the value as an `i64`.
    ///
    /// Integers convert directly; big numbers and textual payloads convert
    /// only when they fit — precision loss surfaces as `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self.without_attributes() {
            Self::Integer(n) => Some(*n),
            Self::BigNumber(b) | Self::Simple(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            Self::Blob(Some(b)) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Try to read the value as an `f64`.
    pub fn as_double(&self) -> Option<f64> {
        match self.without_attributes() {
            Self::Double(d) => Some(*d),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Try to read the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self.without_attributes() {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to view the value as a sequence (array or push).
    pub fn as_array(&self) -> Option<&[Value]> {
        match self.without_attributes() {
            Self::Array(Some(values)) | Self::Push(values) => Some(values),
            _ => None,
        }
    }

    /// Try to view the value as ordered map pairs.
    pub fn as_map(&self) -> Option<&Pairs> {
        match self.without_attributes() {
            Self::Map(Some(pairs)) => Some(pairs),
            _ => None,
        }
    }

    /// For error and blob-error values: the `(code, message)` split.
    ///
    /// The first space-separated token is surfaced as the code when it is an
    /// uppercase word (`ERR`, `WRONGTYPE`, …); otherwise the whole text is
    /// the message.
    pub fn error_parts(&self) -> Option<(Option<String>, String)> {
        let raw = match self.without_attributes() {
            Self::Error(b) | Self::BlobError(b) => b,
            _ => return None,
        };
        let text = String::from_utf8_lossy(raw);
        Some(split_error_text(&text))
    }
}

/// Split error text into an optional uppercase code and the message.
pub(crate) fn split_error_text(text: &str) -> (Option<String>, String) {
    let (first, rest) = match text.split_once(' ') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };
    let is_code = !first.is_empty()
        && first.starts_with(|c: char| c.is_ascii_uppercase())
        && first
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if is_code {
        (Some(first.to_string()), rest.to_string())
    } else {
        (None, text.to_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bytes_repr(b: &Bytes) -> String {
            match std::str::from_utf8(b) {
                Ok(s) => format!("{s:?}"),
                Err(_) => format!("{b:?}"),
            }
        }

        match self {
            Self::Simple(b) => write!(f, "Simple({})", bytes_repr(b)),
            Self::Error(b) => write!(f, "Error({})", bytes_repr(b)),
            Self::Integer(n) => write!(f, "Integer({n})"),
            Self::Double(d) => write!(f, "Double({d})"),
            Self::BigNumber(b) => write!(f, "BigNumber({})", bytes_repr(b)),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Null => write!(f, "Null"),
            Self::Blob(Some(b)) => write!(f, "Blob({})", bytes_repr(b)),
            Self::Blob(None) => write!(f, "Blob(null)"),
            Self::BlobError(b) => write!(f, "BlobError({})", bytes_repr(b)),
            Self::Verbatim { format, data } => write!(
                f,
                "Verbatim({}:{})",
                String::from_utf8_lossy(format),
                bytes_repr(data)
            ),
            Self::Array(Some(values)) => f.debug_list().entries(values).finish(),
            Self::Array(None) => write!(f, "Array(null)"),
            Self::Map(Some(pairs)) => f.debug_map().entries(pairs.iter().map(|(k, v)| (k, v))).finish(),
            Self::Map(None) => write!(f, "Map(null)"),
            Self::Set(Some(values)) => {
                write!(f, "Set")?;
                f.debug_list().entries(values).finish()
            }
            Self::Set(None) => write!(f, "Set(null)"),
            Self::Push(values) => {
                write!(f, "Push")?;
                f.debug_list().entries(values).finish()
            }
            Self::Attributed { attrs, value } => f
                .debug_struct("Attributed")
                .field("attrs", attrs)
                .field("value", value)
                .finish(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Blob(Some(Bytes::copy_from_slice(s.as_bytes())))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Blob(Some(Bytes::from(s)))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Blob(Some(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(Some(Bytes::from(v)))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(Some(values))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_forms_are_distinct() {
        assert_ne!(Value::null_blob(), Value::Null);
        assert_ne!(Value::null_blob(), Value::blob(""));
        assert_ne!(Value::null_array(), Value::array(vec![]));
        assert!(Value::null_blob().is_null());
        assert!(Value::Null.is_null());
        assert!(!Value::blob("").is_null());
    }

    #[test]
    fn test_attributes_wrap_and_look_through() {
        let v = Value::simple("OK").with_attributes(vec![(
            Value::simple("ttl"),
            Value::integer(3600),
        )]);
        assert_eq!(v.as_str(), Some("OK"));
        assert_eq!(v.attributes().map(Vec::len), Some(1));
        assert_eq!(v.without_attributes(), &Value::simple("OK"));

        let bare = Value::simple("OK");
        assert!(bare.attributes().is_none());
    }

    #[test]
    fn test_error_parts() {
        let err = Value::error("ERR unknown command");
        assert_eq!(
            err.error_parts(),
            Some((Some("ERR".to_string()), "unknown command".to_string()))
        );

        let no_code = Value::error("something went wrong");
        assert_eq!(
            no_code.error_parts(),
            Some((None, "something went wrong".to_string()))
        );

        let lone = Value::error("NOAUTH");
        assert_eq!(lone.error_parts(), Some((Some("NOAUTH".to_string()), String::new())));

        assert_eq!(Value::integer(1).error_parts(), None);
    }

    #[test]
    fn test_as_integer_folds_fitting_big_numbers() {
        let small = Value::BigNumber(Bytes::from_static(b"12345"));
        assert_eq!(small.as_integer(), Some(12345));

        let huge = Value::BigNumber(Bytes::from_static(b"340282366920938463463374607431768211456"));
        assert_eq!(huge.as_integer(), None);
        assert_eq!(
            huge.as_str(),
            Some("340282366920938463463374607431768211456")
        );
    }

    #[test]
    fn test_verbatim_format_padding() {
        let v = Value::verbatim("md", "hello");
        match v {
            Value::Verbatim { format, .. } => assert_eq!(&format, b"md "),
            _ => panic!("expected verbatim"),
        }
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from("hi"), Value::blob("hi"));
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
