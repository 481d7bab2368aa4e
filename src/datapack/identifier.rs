// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The closed set of payload types a datapack or graph message may carry.
///
/// Serialization of each kind is delegated to the codec registered for it;
/// the synchronization core itself only ever inspects the tag. `List` is a
/// graph-internal kind produced by input nodes publishing their full queue;
/// it has no wire codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Json,
    Text,
    Raw,
    Scalar,
    List,
}

impl PayloadKind {
    /// Canonical tag used on the wire and in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Json => "json",
            PayloadKind::Text => "text",
            PayloadKind::Raw => "raw",
            PayloadKind::Scalar => "scalar",
            PayloadKind::List => "list",
        }
    }

    /// Parse a wire tag back into a kind.
    pub fn from_tag(tag: &str) -> Option<PayloadKind> {
        match tag {
            "json" => Some(PayloadKind::Json),
            "text" => Some(PayloadKind::Text),
            "raw" => Some(PayloadKind::Raw),
            "scalar" => Some(PayloadKind::Scalar),
            "list" => Some(PayloadKind::List),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniquely identifies one exchangeable value: the datapack name, the engine
/// it lives on, and its payload kind. Immutable once created; equality and
/// ordering consider all three fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataPackIdentifier {
    pub name: String,
    pub engine_name: String,
    pub kind: PayloadKind,
}

impl DataPackIdentifier {
    pub fn new(
        name: impl Into<String>,
        engine_name: impl Into<String>,
        kind: PayloadKind,
    ) -> Self {
        Self {
            name: name.into(),
            engine_name: engine_name.into(),
            kind,
        }
    }
}

impl fmt::Display for DataPackIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.engine_name, self.kind)
    }
}

/// Simulated time as a signed nanosecond count.
///
/// Engines report their time through `RunLoopStep`; the client enforces that
/// reported values are non-negative and monotonically non-decreasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimulationTime(i64);

impl SimulationTime {
    pub const ZERO: SimulationTime = SimulationTime(0);

    pub fn from_nanos(nanos: i64) -> Self {
        SimulationTime(nanos)
    }

    pub fn from_millis(millis: i64) -> Self {
        SimulationTime(millis * 1_000_000)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0 / 1_000_000
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for SimulationTime {
    type Output = SimulationTime;

    fn add(self, rhs: SimulationTime) -> SimulationTime {
        SimulationTime(self.0 + rhs.0)
    }
}

impl From<Duration> for SimulationTime {
    fn from(duration: Duration) -> Self {
        SimulationTime(duration.as_nanos() as i64)
    }
}

impl fmt::Display for SimulationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_equality_considers_all_fields() {
        let a = DataPackIdentifier::new("pose", "physics", PayloadKind::Json);
        let b = DataPackIdentifier::new("pose", "physics", PayloadKind::Json);
        assert_eq!(a, b);

        assert_ne!(a, DataPackIdentifier::new("twist", "physics", PayloadKind::Json));
        assert_ne!(a, DataPackIdentifier::new("pose", "brain", PayloadKind::Json));
        assert_ne!(a, DataPackIdentifier::new("pose", "physics", PayloadKind::Raw));
    }

    #[test]
    fn identifier_ordering_is_total() {
        let mut ids = vec![
            DataPackIdentifier::new("b", "y", PayloadKind::Json),
            DataPackIdentifier::new("a", "z", PayloadKind::Json),
            DataPackIdentifier::new("a", "y", PayloadKind::Text),
            DataPackIdentifier::new("a", "y", PayloadKind::Json),
        ];
        ids.sort();
        assert_eq!(ids[0].name, "a");
        assert_eq!(ids[0].engine_name, "y");
        assert_eq!(ids[0].kind, PayloadKind::Json);
        assert_eq!(ids[3].name, "b");
    }

    #[test]
    fn simulation_time_conversions() {
        assert_eq!(SimulationTime::from_millis(100).as_nanos(), 100_000_000);
        assert_eq!(SimulationTime::from_nanos(2_500_000).as_millis(), 2);
        assert!(SimulationTime::from_nanos(-1).is_negative());
        assert_eq!(
            SimulationTime::from(Duration::from_millis(10)),
            SimulationTime::from_millis(10)
        );
    }

    #[test]
    fn payload_kind_tags_round_trip() {
        for kind in [
            PayloadKind::Json,
            PayloadKind::Text,
            PayloadKind::Raw,
            PayloadKind::Scalar,
            PayloadKind::List,
        ] {
            assert_eq!(PayloadKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(PayloadKind::from_tag("protobuf"), None);
    }
}
