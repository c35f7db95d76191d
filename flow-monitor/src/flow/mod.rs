pub mod key;
pub mod record;

use crate::flow::key::{FlowId, FlowKey};
use crate::flow::record::FlowRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A flow's raw counters, together with the data-quality problems found while ingesting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    pub id: FlowId,
    pub key: FlowKey,
    pub record: FlowRecord,
    /// Receive events rejected because they arrived before they were sent
    pub invalid_timestamps: u64,
    /// Events rejected because they would have overflowed one of the flow's counters
    pub overflowed_events: u64,
}

/// Events that referenced a flow for which no packet was ever sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanFlow {
    #[serde(flatten)]
    pub key: FlowKey,
    pub receives: u64,
    pub received_bytes: u64,
    pub losses: u64,
    pub invalid_timestamps: u64,
}

impl OrphanFlow {
    fn new(key: FlowKey) -> Self {
        Self {
            key,
            receives: 0,
            received_bytes: 0,
            losses: 0,
            invalid_timestamps: 0,
        }
    }
}

/// All flows seen during a run, in the order their keys were first seen
#[derive(Debug, Default, Clone)]
pub struct FlowTable {
    index: HashMap<FlowKey, usize>,
    entries: Vec<FlowEntry>,
    orphan_index: HashMap<FlowKey, usize>,
    orphans: Vec<OrphanFlow>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub(crate) fn get_mut(&mut self, key: &FlowKey) -> Option<&mut FlowEntry> {
        self.index.get(key).map(|&i| &mut self.entries[i])
    }

    /// Returns the entry for `key`, creating it if this is the first time the key is seen
    ///
    /// The boolean is true when the entry was just created.
    pub(crate) fn get_or_insert(&mut self, key: &FlowKey) -> (&mut FlowEntry, bool) {
        if let Some(&i) = self.index.get(key) {
            return (&mut self.entries[i], false);
        }

        let i = self.entries.len();
        self.entries.push(FlowEntry {
            id: FlowId(i as u32 + 1),
            key: key.clone(),
            record: FlowRecord::new(),
            invalid_timestamps: 0,
            overflowed_events: 0,
        });
        self.index.insert(key.clone(), i);
        (&mut self.entries[i], true)
    }

    pub(crate) fn orphan_mut(&mut self, key: &FlowKey) -> &mut OrphanFlow {
        let i = match self.orphan_index.get(key) {
            Some(&i) => i,
            None => {
                let i = self.orphans.len();
                self.orphans.push(OrphanFlow::new(key.clone()));
                self.orphan_index.insert(key.clone(), i);
                i
            }
        };

        &mut self.orphans[i]
    }

    /// Flows ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &FlowEntry> {
        self.entries.iter()
    }

    /// Orphan flows in the order they were first referenced
    pub fn orphans(&self) -> &[OrphanFlow] {
        &self.orphans
    }
}
