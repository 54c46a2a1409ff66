//! Length-prefixed UTF-8 strings and the types layered on them.

use super::varnum::{decode_var_int, encode_var_int};
use super::{ensure, Context, Identifier, Type, Value};
use crate::error::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// Default maximum character count of a string.
pub const DEFAULT_MAX_CHARS: usize = 32767;

/// A VarInt byte length followed by UTF-8 text of at most `max_chars` characters.
#[derive(Debug, Clone, Copy)]
pub struct Str {
    max_chars: usize,
}

impl Str {
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    // UTF-8 needs at most four bytes per character.
    fn max_bytes(&self) -> usize {
        self.max_chars.saturating_mul(4)
    }

    pub(crate) fn decode_str(&self, buf: &mut Bytes) -> Result<String, CodecError> {
        let len = decode_var_int(buf)?;
        let len = usize::try_from(len).map_err(|_| CodecError::NegativeLength(len.into()))?;
        if len > self.max_bytes() {
            return Err(CodecError::StringTooLong {
                len,
                max: self.max_bytes(),
            });
        }
        ensure(buf, len)?;

        let raw = buf.split_to(len);
        let text = std::str::from_utf8(&raw).map_err(|_| CodecError::InvalidUtf8)?;
        let chars = text.chars().count();
        if chars > self.max_chars {
            return Err(CodecError::TooManyChars {
                chars,
                max: self.max_chars,
            });
        }
        Ok(text.to_owned())
    }

    pub(crate) fn encode_str(&self, text: &str, dst: &mut BytesMut) -> Result<(), CodecError> {
        if text.len() > self.max_bytes() {
            return Err(CodecError::StringTooLong {
                len: text.len(),
                max: self.max_bytes(),
            });
        }
        let chars = text.chars().count();
        if chars > self.max_chars {
            return Err(CodecError::TooManyChars {
                chars,
                max: self.max_chars,
            });
        }
        let len = i32::try_from(text.len()).map_err(|_| CodecError::StringTooLong {
            len: text.len(),
            max: i32::MAX as usize,
        })?;
        encode_var_int(len, dst);
        dst.put_slice(text.as_bytes());
        Ok(())
    }
}

impl Default for Str {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl Type for Str {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::String(String::new()))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        self.decode_str(buf).map(Value::String)
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        let text = value.as_str().ok_or_else(|| value.mismatch("string"))?;
        self.encode_str(text, dst)
    }
}

/// JSON text carried in a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json {
    inner: Str,
}

impl Json {
    pub const fn new(max_chars: usize) -> Self {
        Self {
            inner: Str::new(max_chars),
        }
    }
}

impl Type for Json {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Json(serde_json::Value::Null))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        let text = self.inner.decode_str(buf)?;
        Ok(Value::Json(serde_json::from_str(&text)?))
    }

    /// Accepts structured JSON, or a string that is already serialized JSON.
    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        match value {
            Value::Json(json) => self.inner.encode_str(&serde_json::to_string(json)?, dst),
            Value::String(text) => self.inner.encode_str(text, dst),
            other => Err(other.mismatch("json")),
        }
    }
}

/// Rich-text chat component. Rendering is left to the caller; on the wire it is JSON.
pub type Chat = Json;

/// A `namespace:name` string.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierType {
    inner: Str,
}

impl Type for IdentifierType {
    fn default_value(&self, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        Ok(Value::Identifier(Identifier::new(
            Identifier::DEFAULT_NAMESPACE,
            "",
        )))
    }

    fn decode(&self, buf: &mut Bytes, _ctx: &Context<'_>) -> Result<Value, CodecError> {
        let text = self.inner.decode_str(buf)?;
        Ok(Value::Identifier(text.parse()?))
    }

    fn encode(
        &self,
        value: &Value,
        dst: &mut BytesMut,
        _ctx: &Context<'_>,
    ) -> Result<(), CodecError> {
        match value {
            Value::Identifier(id) => self.inner.encode_str(&id.to_string(), dst),
            Value::String(text) => {
                let id: Identifier = text.parse()?;
                self.inner.encode_str(&id.to_string(), dst)
            }
            other => Err(other.mismatch("identifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use proptest::prelude::*;

    fn ctx_version() -> Version {
        Version::V1_12_2
    }

    #[test]
    fn test_string_encoding() {
        let version = ctx_version();
        let ctx = Context::new(&version);
        let encoded = Str::default().pack(&Value::from("Test"), &ctx).unwrap();
        assert_eq!(&encoded[..], b"\x04Test");
    }

    #[test]
    fn test_string_char_boundary() {
        let version = ctx_version();
        let ctx = Context::new(&version);
        let ty = Str::new(4);

        assert!(ty.pack(&Value::from("four"), &ctx).is_ok());
        assert!(matches!(
            ty.pack(&Value::from("fives"), &ctx),
            Err(CodecError::TooManyChars { chars: 5, max: 4 })
        ));
        assert!(matches!(
            ty.unpack(b"\x05fives", &ctx),
            Err(CodecError::TooManyChars { chars: 5, max: 4 })
        ));
    }

    #[test]
    fn test_string_multibyte_within_limit() {
        let version = ctx_version();
        let ctx = Context::new(&version);
        let ty = Str::new(2);

        // Two characters, eight bytes: allowed by the 4x byte bound.
        let value = Value::from("\u{1F600}\u{1F600}");
        let encoded = ty.pack(&value, &ctx).unwrap();
        assert_eq!(encoded[0], 8);
        assert_eq!(ty.unpack(&encoded, &ctx).unwrap(), value);
    }

    #[test]
    fn test_string_byte_length_rejected_before_read() {
        let version = ctx_version();
        let ctx = Context::new(&version);

        // Claims 9 bytes for a 2-character string; the body is never read.
        let result = Str::new(2).unpack(b"\x09", &ctx);
        assert!(matches!(
            result,
            Err(CodecError::StringTooLong { len: 9, max: 8 })
        ));
    }

    #[test]
    fn test_string_underrun_and_utf8() {
        let version = ctx_version();
        let ctx = Context::new(&version);

        assert!(matches!(
            Str::default().unpack(b"\x04Te", &ctx),
            Err(CodecError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            Str::default().unpack(b"\x02\xff\xfe", &ctx),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_json() {
        let version = ctx_version();
        let ctx = Context::new(&version);
        let value = Value::Json(serde_json::json!({"text": "bye"}));

        let encoded = Json::default().pack(&value, &ctx).unwrap();
        assert_eq!(&encoded[1..], br#"{"text":"bye"}"#);
        assert_eq!(Json::default().unpack(&encoded, &ctx).unwrap(), value);
        assert!(matches!(
            Json::default().unpack(b"\x01{", &ctx),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_identifier() {
        let version = ctx_version();
        let ctx = Context::new(&version);
        let ty = IdentifierType::default();

        let encoded = ty.pack(&Value::from("stone"), &ctx).unwrap();
        assert_eq!(&encoded[1..], b"minecraft:stone");
        assert_eq!(
            ty.unpack(b"\x03a:b", &ctx).unwrap(),
            Value::Identifier(Identifier::new("a", "b"))
        );
        assert!(matches!(
            ty.unpack(b"\x05a:b:c", &ctx),
            Err(CodecError::InvalidIdentifier(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_string_roundtrip(s in "\\PC{0,64}") {
            let version = ctx_version();
            let ctx = Context::new(&version);
            let ty = Str::new(64);
            let value = Value::String(s);
            let encoded = ty.pack(&value, &ctx).unwrap();
            prop_assert_eq!(ty.unpack(&encoded, &ctx).unwrap(), value);
        }
    }
}
