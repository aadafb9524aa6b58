//! Per-run result store.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::types::{NodeAddress, ProbeOutcome, SpiderError, SpiderResult};

/// Frozen, address-ordered results of one or more runs.
pub type ResultMap = BTreeMap<NodeAddress, ProbeOutcome>;

/// Concurrent node to outcome map; each key is written at most once.
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: DashMap<NodeAddress, ProbeOutcome>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `node`. A second write for the same node is
    /// rejected and the first outcome stays.
    pub fn record(&self, node: NodeAddress, outcome: ProbeOutcome) -> SpiderResult<()> {
        match self.entries.entry(node) {
            Entry::Occupied(_) => Err(SpiderError::Internal(format!(
                "outcome for {node} already recorded"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(outcome);
                Ok(())
            }
        }
    }

    pub fn contains(&self, node: &NodeAddress) -> bool {
        self.entries.contains_key(node)
    }

    pub fn get(&self, node: &NodeAddress) -> Option<ProbeOutcome> {
        self.entries.get(node).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze into an ordered map.
    pub fn into_results(self) -> ResultMap {
        self.entries.into_iter().collect()
    }
}

impl From<ResultMap> for ResultStore {
    fn from(results: ResultMap) -> Self {
        Self {
            entries: results.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;

    fn node(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_second_write_is_rejected() {
        let store = ResultStore::new();
        store
            .record(node("193.238.157.5"), ProbeOutcome::failure(FailureKind::Timeout, "t1"))
            .unwrap();
        let err = store.record(
            node("193.238.157.5"),
            ProbeOutcome::failure(FailureKind::TransportError, "t2"),
        );
        assert!(err.is_err());
        assert_eq!(
            store.get(&node("193.238.157.5")).unwrap().failure_kind(),
            Some(FailureKind::Timeout)
        );
    }

    #[test]
    fn test_results_are_address_ordered() {
        let store = ResultStore::new();
        for s in ["10.0.0.10", "10.0.0.2", "9.9.9.9"] {
            store
                .record(node(s), ProbeOutcome::failure(FailureKind::TransportError, "x"))
                .unwrap();
        }
        let keys: Vec<String> = store.into_results().keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["9.9.9.9", "10.0.0.2", "10.0.0.10"]);
    }

    #[test]
    fn test_resume_from_previous_results() {
        let mut previous = ResultMap::new();
        previous.insert(node("10.0.0.1"), ProbeOutcome::failure(FailureKind::Timeout, "t"));
        let store = ResultStore::from(previous);
        assert!(store.contains(&node("10.0.0.1")));
        assert_eq!(store.len(), 1);
    }
}
