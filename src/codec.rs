//! Wire codecs.
//!
//! Encoding is driven by the declared type, not only the value's own type:
//! a `dynamic` slot wraps its value together with the value's concrete type so
//! the far end can decode it. Decoding always needs the target type.
//! Marks never reach the wire.
pub mod json;
pub mod msgpack;
pub mod type_json;

use std::borrow::Cow;

use unicode_normalization::{UnicodeNormalization, is_nfc};

use crate::error::{DeserializationError, SerializationError};
use crate::types::Type;
use crate::validate::Engine;
use crate::value::Value;

pub fn encode_json(value: &Value) -> Result<Vec<u8>, SerializationError> {
    json::encode(value, value.ty())
}

/// Encode `value` into a slot declared as `ty`.
pub fn encode_json_as(value: &Value, ty: &Type) -> Result<Vec<u8>, SerializationError> {
    json::encode(value, ty)
}

pub fn decode_json(bytes: &[u8], ty: &Type) -> Result<Value, DeserializationError> {
    Engine::default().decode_json(bytes, ty)
}

pub fn encode_msgpack(value: &Value) -> Result<Vec<u8>, SerializationError> {
    msgpack::encode(value)
}

/// Encode `value` into a slot declared as `ty`.
pub fn encode_msgpack_as(value: &Value, ty: &Type) -> Result<Vec<u8>, SerializationError> {
    msgpack::encode_as(value, ty)
}

pub fn decode_msgpack(bytes: &[u8], ty: &Type) -> Result<Value, DeserializationError> {
    Engine::default().decode_msgpack(bytes, ty)
}

impl Engine {
    pub fn decode_json(&self, bytes: &[u8], ty: &Type) -> Result<Value, DeserializationError> {
        json::decode(bytes, ty, self.config())
    }

    pub fn decode_msgpack(&self, bytes: &[u8], ty: &Type) -> Result<Value, DeserializationError> {
        msgpack::decode(bytes, ty, self.config())
    }
}

/// Map and object keys compare in NFC on every wire.
pub(crate) fn normalize_key(key: &str) -> String {
    key.nfc().collect()
}

/// `key` in NFC, borrowing when it already is.
pub(crate) fn nfc_key(key: &str) -> Cow<'_, str> {
    if is_nfc(key) { Cow::Borrowed(key) } else { Cow::Owned(normalize_key(key)) }
}
