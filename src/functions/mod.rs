// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! User-supplied transceiver and preprocessing functions.
//!
//! Functions are opaque callables bound to one engine. Each declares the
//! datapack identifiers it reads; the orchestrator refreshes those from the
//! engines before invoking it. Preprocessing functions run before stepping
//! and refresh their engine's cache from non-engine sources; transceiver
//! functions read the refreshed caches and produce datapacks addressed to
//! target engines.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::datapack::cache::DataPackCache;
use crate::datapack::{DataPack, DataPackIdentifier};

/// When in the iteration a function runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Preprocessing,
    Transceiver,
}

/// Read-only view over every engine's datapack cache, handed to functions.
pub struct DataPackView<'a> {
    caches: HashMap<&'a str, &'a DataPackCache>,
}

impl<'a> DataPackView<'a> {
    pub fn new() -> Self {
        Self {
            caches: HashMap::new(),
        }
    }

    pub fn insert(&mut self, engine_name: &'a str, cache: &'a DataPackCache) {
        self.caches.insert(engine_name, cache);
    }

    /// Last known datapack under `id`, if its engine has been polled.
    pub fn get(&self, id: &DataPackIdentifier) -> Option<&DataPack> {
        self.caches
            .get(id.engine_name.as_str())
            .and_then(|cache| cache.get(id))
    }

    pub fn engine(&self, engine_name: &str) -> Option<&DataPackCache> {
        self.caches.get(engine_name).copied()
    }
}

impl<'a> Default for DataPackView<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// The callable shape of a synchronization function. Returned datapacks may
/// be stack-scoped inside the function; the orchestrator copies them into
/// heap-owned cache entries or outbound batches.
pub type FunctionCallable =
    Box<dyn FnMut(&DataPackView<'_>) -> Result<Vec<DataPack>, String> + Send>;

/// One registered function with its declared reads and engine linkage.
pub struct SyncFunction {
    pub name: String,
    pub kind: FunctionKind,
    pub linked_engine: String,
    pub requested: Vec<DataPackIdentifier>,
    pub callable: FunctionCallable,
}

impl fmt::Debug for SyncFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncFunction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("linked_engine", &self.linked_engine)
            .field("requested", &self.requested.len())
            .finish()
    }
}

/// Errors raised while loading functions into the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionRegistryError {
    /// A function with this name is already loaded
    DuplicateName { name: String },
    /// A function declared an empty name
    EmptyName,
}

impl fmt::Display for FunctionRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRegistryError::DuplicateName { name } => {
                write!(f, "a function named \"{}\" is already loaded", name)
            }
            FunctionRegistryError::EmptyName => write!(f, "function names must not be empty"),
        }
    }
}

impl std::error::Error for FunctionRegistryError {}

/// Registry of all loaded synchronization functions.
#[derive(Default)]
pub struct FunctionManager {
    functions: Vec<SyncFunction>,
    names: HashSet<String>,
}

impl FunctionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a function. Names are unique across both kinds.
    pub fn load(&mut self, function: SyncFunction) -> Result<(), FunctionRegistryError> {
        if function.name.is_empty() {
            return Err(FunctionRegistryError::EmptyName);
        }
        if !self.names.insert(function.name.clone()) {
            return Err(FunctionRegistryError::DuplicateName {
                name: function.name,
            });
        }
        tracing::debug!(
            function = %function.name,
            engine = %function.linked_engine,
            kind = ?function.kind,
            "function loaded"
        );
        self.functions.push(function);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Union of the identifiers requested by every function linked to
    /// `engine_name`, of either kind.
    pub fn requested_identifiers(&self, engine_name: &str) -> BTreeSet<DataPackIdentifier> {
        self.functions
            .iter()
            .filter(|function| function.linked_engine == engine_name)
            .flat_map(|function| function.requested.iter().cloned())
            .collect()
    }

    /// Execute every function of `kind` linked to `engine_name`, in load
    /// order, concatenating their produced datapacks. The first failing
    /// function aborts the batch.
    pub fn execute_linked(
        &mut self,
        kind: FunctionKind,
        engine_name: &str,
        view: &DataPackView<'_>,
    ) -> Result<Vec<DataPack>, (String, String)> {
        let mut produced = Vec::new();
        for function in self
            .functions
            .iter_mut()
            .filter(|function| function.kind == kind && function.linked_engine == engine_name)
        {
            let outputs = (function.callable)(view)
                .map_err(|message| (function.name.clone(), message))?;
            produced.extend(outputs);
        }
        Ok(produced)
    }
}

impl fmt::Debug for FunctionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionManager")
            .field("function_count", &self.functions.len())
            .field("names", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapack::{PayloadKind, PayloadValue};

    fn noop(name: &str, kind: FunctionKind, engine: &str) -> SyncFunction {
        SyncFunction {
            name: name.to_string(),
            kind,
            linked_engine: engine.to_string(),
            requested: Vec::new(),
            callable: Box::new(|_| Ok(Vec::new())),
        }
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut manager = FunctionManager::new();
        manager
            .load(noop("tf_1", FunctionKind::Transceiver, "physics"))
            .unwrap();
        let err = manager
            .load(noop("tf_1", FunctionKind::Preprocessing, "brain"))
            .unwrap_err();
        assert_eq!(
            err,
            FunctionRegistryError::DuplicateName {
                name: "tf_1".to_string()
            }
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn requested_identifiers_union_covers_both_kinds() {
        let pose = DataPackIdentifier::new("pose", "physics", PayloadKind::Json);
        let twist = DataPackIdentifier::new("twist", "physics", PayloadKind::Json);

        let mut manager = FunctionManager::new();
        let mut tf = noop("tf", FunctionKind::Transceiver, "physics");
        tf.requested = vec![pose.clone(), twist.clone()];
        manager.load(tf).unwrap();

        let mut pf = noop("pf", FunctionKind::Preprocessing, "physics");
        pf.requested = vec![pose.clone()];
        manager.load(pf).unwrap();

        let mut other = noop("other", FunctionKind::Transceiver, "brain");
        other.requested = vec![DataPackIdentifier::new("spikes", "brain", PayloadKind::Raw)];
        manager.load(other).unwrap();

        let union = manager.requested_identifiers("physics");
        assert_eq!(union.len(), 2);
        assert!(union.contains(&pose));
        assert!(union.contains(&twist));
    }

    #[test]
    fn execute_linked_runs_only_matching_functions() {
        let mut manager = FunctionManager::new();
        let mut tf = noop("tf", FunctionKind::Transceiver, "physics");
        tf.callable = Box::new(|_| {
            Ok(vec![DataPack::with_value(
                "command",
                "brain",
                PayloadValue::Scalar(1.0),
            )])
        });
        manager.load(tf).unwrap();
        manager
            .load(noop("pf", FunctionKind::Preprocessing, "physics"))
            .unwrap();

        let view = DataPackView::new();
        let produced = manager
            .execute_linked(FunctionKind::Transceiver, "physics", &view)
            .unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].id().engine_name, "brain");

        let produced = manager
            .execute_linked(FunctionKind::Transceiver, "brain", &view)
            .unwrap();
        assert!(produced.is_empty());
    }

    #[test]
    fn failing_function_reports_its_name() {
        let mut manager = FunctionManager::new();
        let mut tf = noop("broken", FunctionKind::Transceiver, "physics");
        tf.callable = Box::new(|_| Err("no such datapack".to_string()));
        manager.load(tf).unwrap();

        let view = DataPackView::new();
        let (name, message) = manager
            .execute_linked(FunctionKind::Transceiver, "physics", &view)
            .unwrap_err();
        assert_eq!(name, "broken");
        assert_eq!(message, "no such datapack");
    }
}
