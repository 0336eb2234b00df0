//! Body codecs.
//!
//! A [`Codec`] converts between wire bytes and `serde_json::Value`. Typed
//! values go through [`to_value`] / [`from_value`] on top of it, so one
//! codec serves every document type.

use adb_domain::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Wire format for request and response bodies.
pub trait Codec: Send + Sync + std::fmt::Debug {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Encode several values as one body (a JSON array for [`JsonCodec`]).
    fn encode_many(&self, values: &[Value]) -> Result<Vec<u8>>;

    /// Decode a body. An empty body decodes to `Value::Null`.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    fn decode_many(&self, bytes: &[u8]) -> Result<Vec<Value>>;
}

/// The default codec: UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn encode_many(&self, values: &[Value]) -> Result<Vec<u8>> {
        serde_json::to_vec(values).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| {
            Error::Deserialization(format!(
                "{e}: {}",
                String::from_utf8_lossy(&bytes[..bytes.len().min(200)])
            ))
        })
    }

    fn decode_many(&self, bytes: &[u8]) -> Result<Vec<Value>> {
        match self.decode(bytes)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::Deserialization(format!(
                "expected a JSON array, got {}",
                type_name(&other)
            ))),
        }
    }
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
