use std::collections::BTreeMap;

use serde::Serialize;

use crate::normalize::{KnownTypes, Resolution};

/// Counts for one known type. `total` is kept apart from the per-topic map so
/// a topic that happens to be named `all` cannot collide with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub total: u64,
    pub by_topic: BTreeMap<String, u64>,
}

impl TypeCounts {
    pub fn for_topic(&self, topic: &str) -> u64 {
        self.by_topic.get(topic).copied().unwrap_or(0)
    }

    pub fn topic_sum(&self) -> u64 {
        self.by_topic.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    known: KnownTypes,
    counts: BTreeMap<String, TypeCounts>,
}

impl Tally {
    pub fn new(known: KnownTypes) -> Self {
        let counts = known
            .iter()
            .map(|type_name| (type_name.to_string(), TypeCounts::default()))
            .collect();
        Self { known, counts }
    }

    /// Counts one accepted declaration. Discarded declarations are ignored;
    /// returns whether anything was counted.
    pub fn record(&mut self, topic: &str, resolution: &Resolution) -> bool {
        let Resolution::Known(type_name) = resolution else {
            return false;
        };
        let Some(counts) = self.counts.get_mut(type_name) else {
            return false;
        };
        counts.total += 1;
        *counts.by_topic.entry(topic.to_string()).or_insert(0) += 1;
        true
    }

    pub fn known_types(&self) -> &KnownTypes {
        &self.known
    }

    pub fn counts(&self, type_name: &str) -> Option<&TypeCounts> {
        self.counts.get(type_name)
    }

    #[cfg(test)]
    pub(crate) fn counts_mut(&mut self, type_name: &str) -> Option<&mut TypeCounts> {
        self.counts.get_mut(type_name)
    }

    /// Rows in vocabulary order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &TypeCounts)> {
        self.known
            .iter()
            .filter_map(move |type_name| self.counts.get(type_name).map(|counts| (type_name, counts)))
    }

    pub fn grand_total(&self) -> u64 {
        self.counts.values().map(|counts| counts.total).sum()
    }
}
