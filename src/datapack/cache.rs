// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-engine datapack cache.
//!
//! The cache bridges synchronous RPC results into the dataflow model: every
//! `GetDataPacks` reply and every preprocessing-function output lands here,
//! and transceiver functions read from here. Reconciliation is
//! last-writer-wins except that an empty incoming pack never replaces a
//! cached non-empty value.

use std::collections::BTreeMap;

use super::{DataPack, DataPackIdentifier};

/// Last known datapack per identifier, for a single engine.
///
/// The cache only ever holds packs whose identifier names the owning
/// engine; packs for other engines are rejected. An empty pack for a
/// previously unseen identifier is stored as a marker so callers can tell
/// "never retrieved" apart from "engine has no data yet".
#[derive(Debug, Clone, Default)]
pub struct DataPackCache {
    engine_name: String,
    packs: BTreeMap<DataPackIdentifier, DataPack>,
}

impl DataPackCache {
    pub fn new(engine_name: impl Into<String>) -> Self {
        Self {
            engine_name: engine_name.into(),
            packs: BTreeMap::new(),
        }
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Reconcile one incoming pack with the cached state.
    ///
    /// Returns `false` when the pack belongs to a different engine and was
    /// rejected. An empty pack for an already-cached identifier is a no-op;
    /// anything else replaces (or creates) the entry.
    pub fn merge(&mut self, incoming: DataPack) -> bool {
        if incoming.id().engine_name != self.engine_name {
            return false;
        }
        if incoming.is_empty() && self.packs.contains_key(incoming.id()) {
            return true;
        }
        self.packs.insert(incoming.id().clone(), incoming);
        true
    }

    /// Merge a batch, skipping packs that belong to other engines.
    pub fn merge_all(&mut self, incoming: impl IntoIterator<Item = DataPack>) {
        for pack in incoming {
            self.merge(pack);
        }
    }

    pub fn get(&self, id: &DataPackIdentifier) -> Option<&DataPack> {
        self.packs.get(id)
    }

    pub fn contains(&self, id: &DataPackIdentifier) -> bool {
        self.packs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataPackIdentifier, &DataPack)> {
        self.packs.iter()
    }

    /// Drop all cached packs, e.g. after an engine reset.
    pub fn clear(&mut self) {
        self.packs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapack::{PayloadKind, PayloadValue};

    fn id(name: &str) -> DataPackIdentifier {
        DataPackIdentifier::new(name, "physics", PayloadKind::Scalar)
    }

    fn pack(name: &str, value: f64) -> DataPack {
        DataPack::with_value(name, "physics", PayloadValue::Scalar(value))
    }

    #[test]
    fn empty_incoming_never_overwrites_cached_value() {
        let mut cache = DataPackCache::new("physics");
        assert!(cache.merge(pack("angle", 1.0)));

        assert!(cache.merge(DataPack::empty(id("angle"))));
        let cached = cache.get(&id("angle")).unwrap();
        assert_eq!(cached.payload(), Some(&PayloadValue::Scalar(1.0)));
    }

    #[test]
    fn non_empty_incoming_replaces_cached_value() {
        let mut cache = DataPackCache::new("physics");
        cache.merge(pack("angle", 1.0));
        cache.merge(pack("angle", 2.0));
        assert_eq!(
            cache.get(&id("angle")).unwrap().payload(),
            Some(&PayloadValue::Scalar(2.0))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_incoming_for_unseen_identifier_stores_marker() {
        let mut cache = DataPackCache::new("physics");
        assert!(!cache.contains(&id("angle")));

        cache.merge(DataPack::empty(id("angle")));

        // "never retrieved" and "engine has no data" are now distinguishable
        let cached = cache.get(&id("angle")).unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn packs_for_other_engines_are_rejected() {
        let mut cache = DataPackCache::new("physics");
        let foreign = DataPack::with_value("angle", "brain", PayloadValue::Scalar(1.0));
        assert!(!cache.merge(foreign));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = DataPackCache::new("physics");
        cache.merge(pack("angle", 1.0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
