// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-kind payload codecs.
//!
//! The engine client never interprets payload bytes itself; it looks up the
//! codec registered for the identifier's payload kind and delegates. The
//! registry covers a closed, explicitly enumerated set of kinds, replacing
//! compile-time type-list dispatch with a runtime table.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::datapack::{PayloadKind, PayloadValue};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no codec registered for payload kind {0}")]
    Unregistered(PayloadKind),

    #[error("cannot decode {kind} payload: {reason}")]
    Malformed { kind: PayloadKind, reason: String },

    #[error("codec for {expected} was handed a {found} value")]
    KindMismatch {
        expected: PayloadKind,
        found: PayloadKind,
    },
}

/// Serialize/deserialize one payload kind against raw bytes.
pub trait PayloadCodec: Send + Sync {
    fn kind(&self) -> PayloadKind;

    fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<PayloadValue, CodecError>;
}

/// JSON payloads, serialized with serde_json.
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Json
    }

    fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PayloadValue::Json(json) => serde_json::to_vec(json).map_err(|e| {
                CodecError::Malformed {
                    kind: PayloadKind::Json,
                    reason: e.to_string(),
                }
            }),
            other => Err(CodecError::KindMismatch {
                expected: PayloadKind::Json,
                found: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<PayloadValue, CodecError> {
        let json = serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
            kind: PayloadKind::Json,
            reason: e.to_string(),
        })?;
        Ok(PayloadValue::Json(json))
    }
}

/// UTF-8 text payloads.
pub struct TextCodec;

impl PayloadCodec for TextCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Text
    }

    fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PayloadValue::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(CodecError::KindMismatch {
                expected: PayloadKind::Text,
                found: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<PayloadValue, CodecError> {
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Malformed {
            kind: PayloadKind::Text,
            reason: e.to_string(),
        })?;
        Ok(PayloadValue::Text(text))
    }
}

/// Opaque byte payloads, passed through untouched.
pub struct RawCodec;

impl PayloadCodec for RawCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Raw
    }

    fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PayloadValue::Raw(bytes) => Ok(bytes.clone()),
            other => Err(CodecError::KindMismatch {
                expected: PayloadKind::Raw,
                found: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<PayloadValue, CodecError> {
        Ok(PayloadValue::Raw(bytes.to_vec()))
    }
}

/// Scalar payloads as little-endian f64.
pub struct ScalarCodec;

impl PayloadCodec for ScalarCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Scalar
    }

    fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError> {
        match value {
            PayloadValue::Scalar(scalar) => Ok(scalar.to_le_bytes().to_vec()),
            other => Err(CodecError::KindMismatch {
                expected: PayloadKind::Scalar,
                found: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<PayloadValue, CodecError> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| CodecError::Malformed {
            kind: PayloadKind::Scalar,
            reason: format!("expected 8 bytes, got {}", bytes.len()),
        })?;
        Ok(PayloadValue::Scalar(f64::from_le_bytes(array)))
    }
}

/// Runtime table mapping payload kinds to their codecs.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<PayloadKind, Arc<dyn PayloadCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registry covering every wire-capable kind. `List` stays unregistered:
    /// it is graph-internal and must never cross the RPC boundary.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(TextCodec));
        registry.register(Arc::new(RawCodec));
        registry.register(Arc::new(ScalarCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn PayloadCodec>) {
        self.codecs.insert(codec.kind(), codec);
    }

    pub fn encode(&self, value: &PayloadValue) -> Result<Vec<u8>, CodecError> {
        self.codecs
            .get(&value.kind())
            .ok_or(CodecError::Unregistered(value.kind()))?
            .encode(value)
    }

    pub fn decode(&self, kind: PayloadKind, bytes: &[u8]) -> Result<PayloadValue, CodecError> {
        self.codecs
            .get(&kind)
            .ok_or(CodecError::Unregistered(kind))?
            .decode(bytes)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("kinds", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_round_trips_json() {
        let registry = CodecRegistry::with_defaults();
        let value = PayloadValue::Json(serde_json::json!({"position": [0.0, 1.0, 2.0]}));
        let bytes = registry.encode(&value).unwrap();
        assert_eq!(registry.decode(PayloadKind::Json, &bytes).unwrap(), value);
    }

    #[test]
    fn scalar_codec_rejects_short_input() {
        let registry = CodecRegistry::with_defaults();
        let err = registry.decode(PayloadKind::Scalar, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn list_kind_has_no_wire_codec() {
        let registry = CodecRegistry::with_defaults();
        let value = PayloadValue::List(vec![PayloadValue::Scalar(1.0)]);
        assert!(matches!(
            registry.encode(&value),
            Err(CodecError::Unregistered(PayloadKind::List))
        ));
    }

    #[test]
    fn codec_rejects_value_of_wrong_kind() {
        let err = JsonCodec.encode(&PayloadValue::Text("hi".into())).unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { .. }));
    }
}
