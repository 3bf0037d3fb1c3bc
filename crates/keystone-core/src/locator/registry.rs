//! Immutable registry snapshots.
//!
//! A commit builds a whole new [`Registry`] and swaps it in, so readers
//! always see either all of a commit or none of it. Every list in a snapshot
//! is kept in registry order (see [`descriptor_order`]).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::foundation::filter::Filter;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

/// Registry order: ranking descending, then newer locator first, then lower
/// service id first.
pub fn descriptor_order(a: &SystemDescriptor, b: &SystemDescriptor) -> Ordering {
    ranked_order((a, a.ranking()), (b, b.ranking()))
}

fn ranked_order((a, a_rank): (&SystemDescriptor, i32), (b, b_rank): (&SystemDescriptor, i32)) -> Ordering {
    b_rank
        .cmp(&a_rank)
        .then_with(|| b.locator_id().cmp(&a.locator_id()))
        .then_with(|| a.service_id().cmp(&b.service_id()))
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    all: Vec<Arc<SystemDescriptor>>,
    by_contract: HashMap<String, Vec<Arc<SystemDescriptor>>>,
    by_name: HashMap<String, Vec<Arc<SystemDescriptor>>>,
    by_key: HashMap<DescriptorKey, Arc<SystemDescriptor>>,
}

impl Registry {
    pub(crate) fn build(all: Vec<Arc<SystemDescriptor>>) -> Self {
        Self::build_ranked(all, SystemDescriptor::ranking)
    }

    fn build_ranked(mut all: Vec<Arc<SystemDescriptor>>, ranking: impl Fn(&SystemDescriptor) -> i32) -> Self {
        all.sort_by(|a, b| ranked_order((a, ranking(a)), (b, ranking(b))));

        let mut by_contract: HashMap<String, Vec<_>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<_>> = HashMap::new();
        let mut by_key = HashMap::with_capacity(all.len());
        for descriptor in &all {
            for contract in &descriptor.descriptor().advertised_contracts {
                by_contract.entry(contract.clone()).or_default().push(descriptor.clone());
            }
            if let Some(name) = descriptor.name() {
                by_name.entry(name.to_string()).or_default().push(descriptor.clone());
            }
            by_key.insert(descriptor.key(), descriptor.clone());
        }

        Self {
            all,
            by_contract,
            by_name,
            by_key,
        }
    }

    /// A new snapshot with `removed` dropped and `added` inserted.
    pub(crate) fn with_changes(&self, added: &[Arc<SystemDescriptor>], removed: &HashSet<DescriptorKey>) -> Self {
        let all = self
            .all
            .iter()
            .filter(|d| !removed.contains(&d.key()))
            .chain(added)
            .cloned()
            .collect();
        Self::build(all)
    }

    /// A new snapshot with the same descriptors, ordered as if `key` were
    /// already ranked `ranking`.
    pub(crate) fn reranked(&self, key: DescriptorKey, ranking: i32) -> Self {
        Self::build_ranked(self.all.clone(), |d| if d.key() == key { ranking } else { d.ranking() })
    }

    /// Returns the smallest index list that can contain every match of
    /// `filter`. The caller still applies the filter.
    pub(crate) fn candidates(&self, filter: &dyn Filter) -> &[Arc<SystemDescriptor>] {
        let Some(indexed) = filter.as_indexed() else {
            return &self.all;
        };
        match (indexed.advertised_contract(), indexed.name()) {
            (Some(contract), _) => self.by_contract.get(contract).map(Vec::as_slice).unwrap_or_default(),
            (None, Some(name)) => self.by_name.get(name).map(Vec::as_slice).unwrap_or_default(),
            (None, None) => &self.all,
        }
    }

    /// Returns the matches of `filter` in registry order.
    pub(crate) fn select(&self, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
        self.candidates(filter)
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    pub(crate) fn get(&self, key: DescriptorKey) -> Option<&Arc<SystemDescriptor>> {
        self.by_key.get(&key)
    }

    pub(crate) fn all(&self) -> &[Arc<SystemDescriptor>] {
        &self.all
    }

    pub(crate) fn len(&self) -> usize {
        self.all.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::foundation::descriptor::Descriptor;
    use crate::foundation::filter;
    use crate::locator::system_descriptor::Source;

    fn bound(locator_id: u64, service_id: u64, ranking: i32, name: Option<&str>) -> Arc<SystemDescriptor> {
        let mut builder = Descriptor::builder(format!("app::S{service_id}"))
            .to("app::Contract")
            .ranked(ranking);
        if let Some(name) = name {
            builder = builder.named(name);
        }
        SystemDescriptor::new(
            builder.build(),
            DescriptorKey::new(locator_id, service_id),
            Weak::new(),
            Source::Declared,
            None,
        )
    }

    fn ids(list: &[Arc<SystemDescriptor>]) -> Vec<(u64, u64)> {
        list.iter().map(|d| (d.locator_id(), d.service_id())).collect()
    }

    #[test]
    fn test_registry_order() {
        let registry = Registry::build(vec![
            bound(0, 0, 0, None),
            bound(0, 1, 5, None),
            bound(1, 0, 0, None),
            bound(0, 2, 0, None),
        ]);
        assert_eq!(ids(registry.all()), vec![(0, 1), (1, 0), (0, 0), (0, 2)]);
    }

    #[test]
    fn test_index_candidates() {
        let registry = Registry::build(vec![bound(0, 0, 0, Some("a")), bound(0, 1, 0, None)]);

        assert_eq!(registry.candidates(&filter::contract("app::Contract")).len(), 2);
        assert_eq!(registry.candidates(&filter::contract("app::Other")).len(), 0);
        assert_eq!(registry.candidates(&filter::named("a")).len(), 1);
        assert_eq!(registry.candidates(&filter::all()).len(), 2);
        assert_eq!(ids(&registry.select(&filter::contract_named("app::Contract", "a"))), vec![(0, 0)]);
    }

    #[test]
    fn test_with_changes_and_rerank() {
        let first = bound(0, 0, 0, None);
        let second = bound(0, 1, 0, None);
        let registry = Registry::build(vec![first.clone(), second.clone()]);

        let removed = HashSet::from([first.key()]);
        let next = registry.with_changes(&[bound(0, 2, 0, None)], &removed);
        assert_eq!(ids(next.all()), vec![(0, 1), (0, 2)]);
        assert!(next.get(first.key()).is_none());
        assert_eq!(registry.len(), 2);

        let reranked = next.reranked(second.key(), -1);
        assert_eq!(ids(reranked.all()), vec![(0, 2), (0, 1)]);
        // The old snapshot and the live ranking are untouched until published.
        assert_eq!(ids(next.all()), vec![(0, 1), (0, 2)]);
        assert_eq!(second.ranking(), 0);
    }
}
