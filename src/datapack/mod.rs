// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed, named units of exchange between the coordinator and an engine.
//!
//! A [`DataPack`] pairs a [`DataPackIdentifier`] with an optional payload.
//! A pack without a payload is the *empty marker*: the engine has nothing
//! new under that identifier. Empty packs never overwrite previously cached
//! values (see [`cache::DataPackCache`]).

mod identifier;

pub mod cache;

pub use identifier::{DataPackIdentifier, PayloadKind, SimulationTime};

/// A payload drawn from the closed set of supported kinds.
///
/// This tagged representation replaces compile-time type dispatch: the
/// coordinator routes values by tag and leaves interpretation to codecs and
/// user functions.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Json(serde_json::Value),
    Text(String),
    Raw(Vec<u8>),
    Scalar(f64),
    List(Vec<PayloadValue>),
}

impl PayloadValue {
    pub fn kind(&self) -> PayloadKind {
        match self {
            PayloadValue::Json(_) => PayloadKind::Json,
            PayloadValue::Text(_) => PayloadKind::Text,
            PayloadValue::Raw(_) => PayloadKind::Raw,
            PayloadValue::Scalar(_) => PayloadKind::Scalar,
            PayloadValue::List(_) => PayloadKind::List,
        }
    }
}

/// Identifier plus optional payload. `payload == None` is the empty marker.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPack {
    id: DataPackIdentifier,
    payload: Option<PayloadValue>,
}

impl DataPack {
    /// Build a non-empty datapack; the identifier's kind is derived from the
    /// value, so a pack can never disagree with its own payload.
    pub fn with_value(
        name: impl Into<String>,
        engine_name: impl Into<String>,
        value: PayloadValue,
    ) -> Self {
        let id = DataPackIdentifier::new(name, engine_name, value.kind());
        Self {
            id,
            payload: Some(value),
        }
    }

    /// Build the empty marker for an identifier.
    pub fn empty(id: DataPackIdentifier) -> Self {
        Self { id, payload: None }
    }

    /// Reassemble a pack from wire parts. `None` payload is the empty marker.
    pub fn from_parts(id: DataPackIdentifier, payload: Option<PayloadValue>) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> &DataPackIdentifier {
        &self.id
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    pub fn payload(&self) -> Option<&PayloadValue> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<PayloadValue> {
        self.payload
    }
}
