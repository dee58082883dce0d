//! Versioned JSON envelope around every payload on the wire.
//!
//! # Wire Format
//!
//! ```text
//! {"identity":"server","version":["0.0.1","0"],"data":<payload>}
//! ```
//!
//! Encoding is compact JSON with a fixed field order (identity, version,
//! data). Frames are delimited by a terminator with no length prefix, so the
//! encoder makes sure the terminator never appears in its output: each
//! occurrence inside a string has its first character written as a `\u`
//! escape, and control characters are escaped with uppercase hex so an escape
//! followed by plain text cannot complete the terminator either. Any JSON
//! parser reads the result back unchanged.
//!
//! Decoding yields the generic structured form only. Turning `data` back into
//! a typed message is up to the caller.

use std::borrow::Cow;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::{CharEscape, Formatter};
use serde_json::Value;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::message::{CoreMessage, MessageError};

/// Envelope decoding errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Bytes are not a JSON object with `identity`, `version` and `data`.
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// The `{identity, version, data}` wrapper.
///
/// Borrows its contents while encoding; [`decode`] returns an owned
/// `Envelope<'static>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<'a> {
    /// Server name
    pub identity: Cow<'a, str>,
    /// `[protocol version, schema version]`
    pub version: [Cow<'a, str>; 2],
    /// Reduced payload
    pub data: Cow<'a, Value>,
}

impl<'a> Envelope<'a> {
    /// Wrap `data` with the identity and versions from `config`.
    pub fn new(config: &'a ServerConfig, data: &'a Value) -> Self {
        Self {
            identity: Cow::Borrowed(config.identity.as_str()),
            version: [
                Cow::Borrowed(config.protocol_version.as_str()),
                Cow::Owned(config.schema_version_string()),
            ],
            data: Cow::Borrowed(data),
        }
    }

    pub fn protocol_version(&self) -> &str {
        &self.version[0]
    }

    pub fn schema_version(&self) -> &str {
        &self.version[1]
    }

    /// Serialize to compact JSON in which `terminator` never occurs.
    pub fn to_bytes(&self, terminator: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, TerminatorEscape { terminator });
        self.serialize(&mut serializer)
            .expect("string-keyed JSON serializes into memory without error");
        out
    }

    pub fn into_owned(self) -> Envelope<'static> {
        Envelope {
            identity: Cow::Owned(self.identity.into_owned()),
            version: self.version.map(|v| Cow::Owned(v.into_owned())),
            data: Cow::Owned(self.data.into_owned()),
        }
    }
}

/// Reduce `payload` and encode it as an envelope.
///
/// Fails only when the message itself is invalid; nothing is produced then.
pub fn encode(payload: &CoreMessage, config: &ServerConfig) -> Result<Vec<u8>, MessageError> {
    let data = payload.reduce()?;
    Ok(encode_value(&data, config))
}

/// Encode an already reduced value as an envelope.
pub fn encode_value(data: &Value, config: &ServerConfig) -> Vec<u8> {
    Envelope::new(config, data).to_bytes(&config.terminator)
}

/// Parse envelope bytes back into their structured form.
pub fn decode(bytes: &[u8]) -> Result<Envelope<'static>, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)
}

/// Compact formatter that keeps the frame terminator out of the output.
struct TerminatorEscape<'t> {
    terminator: &'t [u8],
}

impl Formatter for TerminatorEscape<'_> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        let mut from = 0;
        while let Some(pos) = find(&bytes[from..], self.terminator) {
            let at = from + pos;
            writer.write_all(&bytes[start..at])?;
            write_unicode_escape(writer, bytes[at])?;
            start = at + 1;
            from = at + 1;
        }
        writer.write_all(&bytes[start..])
    }

    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let byte = match char_escape {
            CharEscape::Quote => return writer.write_all(b"\\\""),
            CharEscape::ReverseSolidus => return writer.write_all(b"\\\\"),
            CharEscape::Solidus => return writer.write_all(b"\\/"),
            CharEscape::Backspace => 0x08,
            CharEscape::FormFeed => 0x0C,
            CharEscape::LineFeed => b'\n',
            CharEscape::CarriageReturn => b'\r',
            CharEscape::Tab => b'\t',
            CharEscape::AsciiControl(byte) => byte,
        };
        write_unicode_escape(writer, byte)
    }
}

fn write_unicode_escape<W>(writer: &mut W, byte: u8) -> io::Result<()>
where
    W: ?Sized + io::Write,
{
    write!(writer, "\\u{:04X}", byte)
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ErrorValue, FunctionResult};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        find(haystack, needle).is_some()
    }

    #[test]
    fn test_encode_remark_exact_bytes() {
        let config = ServerConfig::default();
        let bytes = encode(&CoreMessage::remark("hello"), &config).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"identity":"server","version":["0.0.1","0"],"data":"hello"}"#
        );

        let envelope = decode(&bytes).unwrap();
        assert_eq!(envelope.identity, "server");
        assert_eq!(envelope.protocol_version(), "0.0.1");
        assert_eq!(envelope.schema_version(), "0");
        assert_eq!(*envelope.data, json!("hello"));
    }

    #[test]
    fn test_roundtrip_nested_message() {
        let config = ServerConfig::default();
        let message = CoreMessage::from(
            FunctionResult::new("fetch_gallery")
                .unwrap()
                .with_data(CoreMessage::remark("ok")),
        )
        .with_error(ErrorValue::new(404, "gallery not found"));

        let bytes = encode(&message, &config).unwrap();
        let envelope = decode(&bytes).unwrap();
        assert_eq!(envelope.data.into_owned(), message.reduce().unwrap());
    }

    #[test]
    fn test_encode_contract_violation_produces_nothing() {
        let config = ServerConfig::default();
        let message = CoreMessage::from(FunctionResult::new("scan_gallery").unwrap());
        assert!(matches!(
            encode(&message, &config),
            Err(MessageError::IncompleteValue { .. })
        ));
    }

    #[test]
    fn test_terminator_never_in_output() {
        let config = ServerConfig::default();
        let data = json!({
            "end": "the end",
            "weekend": ["endend", "\u{1e}nd", "\\end", "line\nend"],
        });

        let bytes = encode_value(&data, &config);
        assert!(
            !contains(&bytes, b"end"),
            "terminator leaked: {}",
            String::from_utf8_lossy(&bytes)
        );
        assert_eq!(*decode(&bytes).unwrap().data, data);
    }

    #[test]
    fn test_control_escapes_are_uppercase() {
        let config = ServerConfig::default();
        let bytes = encode_value(&json!("\u{1e}nd"), &config);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""data":"\u001End""#), "got {}", text);
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        for raw in [
            r#"{"version":["0.0.1","0"],"data":1}"#,
            r#"{"identity":"server","data":1}"#,
            r#"{"identity":"server","version":["0.0.1","0"]}"#,
        ] {
            assert!(
                matches!(decode(raw.as_bytes()), Err(EnvelopeError::Malformed(_))),
                "accepted {}",
                raw
            );
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let inputs: [&[u8]; 5] = [
            b"not json",
            b"[1,2,3]",
            b"",
            b"{\"identity\":\"s\"",
            b"\xff\xfe",
        ];
        for raw in inputs {
            assert!(decode(raw).is_err());
        }
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let raw = br#"{"identity":"s","version":["1","2"],"data":null,"extra":true}"#;
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.identity, "s");
        assert_eq!(*envelope.data, Value::Null);
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"abcend", b"end"), Some(3));
        assert_eq!(find(b"en", b"end"), None);
        assert_eq!(find(b"abc", b""), None);
    }
}
