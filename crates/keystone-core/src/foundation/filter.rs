//! Descriptor filters.
//!
//! A [`Filter`] is any predicate over registered descriptors. Filters that
//! also implement [`IndexedFilter`] let the registry jump straight to the
//! index list of a contract or a name instead of scanning everything.

use std::fmt;

use crate::foundation::types::TypeKey;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

/// A predicate over registered descriptors.
pub trait Filter: Send + Sync {
    /// Returns `true` if `descriptor` is selected.
    fn matches(&self, descriptor: &SystemDescriptor) -> bool;

    /// Returns the indexed form of this filter, if it has one.
    fn as_indexed(&self) -> Option<&dyn IndexedFilter> {
        None
    }
}

/// A filter the registry can answer from its indexes.
pub trait IndexedFilter: Filter {
    /// Contract every selected descriptor advertises.
    fn advertised_contract(&self) -> Option<&str>;

    /// Name every selected descriptor has.
    fn name(&self) -> Option<&str>;
}

/// Selects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFilter;

impl Filter for AllFilter {
    fn matches(&self, _descriptor: &SystemDescriptor) -> bool {
        true
    }
}

/// Selects by contract and/or name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFilter {
    contract: Option<String>,
    name: Option<String>,
}

impl Filter for IndexFilter {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        let contract_ok = self
            .contract
            .as_deref()
            .is_none_or(|contract| descriptor.descriptor().advertises(contract));
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|name| descriptor.name() == Some(name));
        contract_ok && name_ok
    }

    fn as_indexed(&self) -> Option<&dyn IndexedFilter> {
        Some(self)
    }
}

impl IndexedFilter for IndexFilter {
    fn advertised_contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Selects exactly one descriptor by its ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecificFilter {
    key: DescriptorKey,
}

impl Filter for SpecificFilter {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        descriptor.key() == self.key
    }
}

/// Selects descriptors bound in a given scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    scope: String,
}

impl Filter for ScopeFilter {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        descriptor.scope() == self.scope
    }
}

/// Selects with a closure.
pub struct PredicateFilter<F> {
    predicate: F,
}

impl<F> Filter for PredicateFilter<F>
where
    F: Fn(&SystemDescriptor) -> bool + Send + Sync,
{
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        (self.predicate)(descriptor)
    }
}

impl<F> fmt::Debug for PredicateFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PredicateFilter(..)")
    }
}

/// Selects everything.
pub fn all() -> AllFilter {
    AllFilter
}

/// Selects descriptors advertising `contract`.
pub fn contract(contract: impl Into<String>) -> IndexFilter {
    IndexFilter {
        contract: Some(contract.into()),
        name: None,
    }
}

/// Selects descriptors advertising the contract `C`.
pub fn contract_of<C: ?Sized + 'static>() -> IndexFilter {
    contract(TypeKey::of::<C>().name())
}

/// Selects descriptors advertising `contract` under `name`.
pub fn contract_named(contract: impl Into<String>, name: impl Into<String>) -> IndexFilter {
    IndexFilter {
        contract: Some(contract.into()),
        name: Some(name.into()),
    }
}

/// Selects descriptors named `name`.
pub fn named(name: impl Into<String>) -> IndexFilter {
    IndexFilter {
        contract: None,
        name: Some(name.into()),
    }
}

/// Selects the descriptor with the given ids.
pub fn specific(locator_id: u64, service_id: u64) -> SpecificFilter {
    SpecificFilter {
        key: DescriptorKey::new(locator_id, service_id),
    }
}

/// Selects descriptors bound in `scope`.
pub fn in_scope(scope: impl Into<String>) -> ScopeFilter {
    ScopeFilter { scope: scope.into() }
}

/// Selects with a closure.
pub fn predicate<F>(predicate: F) -> PredicateFilter<F>
where
    F: Fn(&SystemDescriptor) -> bool + Send + Sync,
{
    PredicateFilter { predicate }
}
