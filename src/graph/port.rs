// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Port addressing and the wire-to-callback converter registry.
//!
//! An input port may declare a different kind for its owner's callback
//! than it receives on the wire. The transform between the two is a
//! registered converter function; subscribing a port pair with no
//! registered converter fails at configuration time, never at runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::datapack::{PayloadKind, PayloadValue};

/// Addresses one port on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: String,
    pub port: String,
}

impl PortRef {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// A conversion between two payload kinds.
pub type ConverterFn = Arc<dyn Fn(&PayloadValue) -> Result<PayloadValue, String> + Send + Sync>;

/// Registry of converter functions keyed by `(wire kind, delivered kind)`.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<(PayloadKind, PayloadKind), ConverterFn>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with the built-in conversions between text, JSON and
    /// scalar payloads.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PayloadKind::Text, PayloadKind::Json, |value| match value {
            PayloadValue::Text(text) => serde_json::from_str(text)
                .map(PayloadValue::Json)
                .map_err(|e| e.to_string()),
            other => Err(format!("expected text, got {}", other.kind())),
        });
        registry.register(PayloadKind::Json, PayloadKind::Text, |value| match value {
            PayloadValue::Json(json) => Ok(PayloadValue::Text(json.to_string())),
            other => Err(format!("expected json, got {}", other.kind())),
        });
        registry.register(PayloadKind::Scalar, PayloadKind::Json, |value| match value {
            PayloadValue::Scalar(scalar) => Ok(PayloadValue::Json(serde_json::json!(scalar))),
            other => Err(format!("expected scalar, got {}", other.kind())),
        });
        registry.register(PayloadKind::Json, PayloadKind::Scalar, |value| match value {
            PayloadValue::Json(json) => json
                .as_f64()
                .map(PayloadValue::Scalar)
                .ok_or_else(|| format!("{} is not a number", json)),
            other => Err(format!("expected json, got {}", other.kind())),
        });
        registry
    }

    pub fn register<F>(&mut self, from: PayloadKind, to: PayloadKind, converter: F)
    where
        F: Fn(&PayloadValue) -> Result<PayloadValue, String> + Send + Sync + 'static,
    {
        self.converters.insert((from, to), Arc::new(converter));
    }

    /// Identity pairs are always convertible; anything else needs a
    /// registered function.
    pub fn contains(&self, from: PayloadKind, to: PayloadKind) -> bool {
        from == to || self.converters.contains_key(&(from, to))
    }

    pub fn convert(
        &self,
        from: PayloadKind,
        to: PayloadKind,
        value: &PayloadValue,
    ) -> Result<PayloadValue, String> {
        if from == to {
            return Ok(value.clone());
        }
        let converter = self
            .converters
            .get(&(from, to))
            .ok_or_else(|| format!("no converter from {} to {}", from, to))?;
        converter(value)
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("pairs", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pairs_need_no_registration() {
        let registry = ConverterRegistry::new();
        assert!(registry.contains(PayloadKind::Json, PayloadKind::Json));
        assert!(!registry.contains(PayloadKind::Text, PayloadKind::Json));
    }

    #[test]
    fn default_conversions_round_trip_scalars() {
        let registry = ConverterRegistry::with_defaults();
        let json = registry
            .convert(
                PayloadKind::Scalar,
                PayloadKind::Json,
                &PayloadValue::Scalar(2.5),
            )
            .unwrap();
        assert_eq!(json, PayloadValue::Json(serde_json::json!(2.5)));

        let scalar = registry
            .convert(PayloadKind::Json, PayloadKind::Scalar, &json)
            .unwrap();
        assert_eq!(scalar, PayloadValue::Scalar(2.5));
    }

    #[test]
    fn converting_non_numeric_json_to_scalar_fails() {
        let registry = ConverterRegistry::with_defaults();
        let err = registry
            .convert(
                PayloadKind::Json,
                PayloadKind::Scalar,
                &PayloadValue::Json(serde_json::json!("not a number")),
            )
            .unwrap_err();
        assert!(err.contains("not a number"));
    }
}
