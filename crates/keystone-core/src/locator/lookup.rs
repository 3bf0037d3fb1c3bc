//! Descriptor lookups.
//!
//! Lookups merge this locator's snapshot with its parent's, dropping
//! parent descriptors that are local to the parent, and return everything in
//! registry order. Validation services may veto individual results.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{Collector, ErrorType, LocatorError, LocatorResult, MultiError};
use crate::foundation::filter::{self, Filter};
use crate::foundation::injectee::Injectee;
use crate::locator::ServiceLocator;
use crate::locator::hooks::{Operation, ValidationInformation};
use crate::locator::registry::descriptor_order;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

impl ServiceLocator {
    /// Returns every descriptor matching `filter` visible from this locator,
    /// in registry order.
    pub fn descriptors(&self, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
        if self.check_running().is_err() {
            return Vec::new();
        }
        let found = self.collect(filter, self.id());
        found
            .into_iter()
            .filter(|d| self.validate_lookup(d, None))
            .collect()
    }

    /// Returns the first descriptor [`descriptors`](Self::descriptors) would
    /// return.
    pub fn best_descriptor(&self, filter: &dyn Filter) -> Option<Arc<SystemDescriptor>> {
        self.descriptors(filter).into_iter().next()
    }

    /// Returns the descriptor with the given ids, searching parents too.
    pub fn descriptor_by_key(&self, key: DescriptorKey) -> Option<Arc<SystemDescriptor>> {
        if let Some(found) = self.registry.read().get(key) {
            return Some(found.clone());
        }
        self.parent.as_ref()?.descriptor_by_key(key)
    }

    /// This locator's own descriptors matching `filter`, without validation.
    pub(crate) fn local_descriptors(&self, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
        let snapshot = self.registry.read().clone();
        snapshot.select(filter)
    }

    /// Matches of `filter` visible to locator `requester`, without
    /// validation.
    pub(crate) fn collect(&self, filter: &dyn Filter, requester: u64) -> Vec<Arc<SystemDescriptor>> {
        let snapshot = self.registry.read().clone();
        let mut found: Vec<_> = snapshot
            .candidates(filter)
            .iter()
            .filter(|d| d.visible_to(requester) && filter.matches(d))
            .cloned()
            .collect();
        if let Some(parent) = &self.parent {
            found.extend(parent.collect(filter, requester));
            found.sort_by(|a, b| descriptor_order(a, b));
        }
        found
    }

    // =========================================================================
    // Injectee Matching
    // =========================================================================

    /// Returns the best descriptor for `injectee`, giving just-in-time
    /// resolvers one chance to bind something if nothing matches.
    pub fn injectee_descriptor(&self, injectee: &Injectee) -> LocatorResult<Option<Arc<SystemDescriptor>>> {
        self.check_running()?;
        if let Some(found) = self.matching(injectee, true)?.into_iter().next() {
            return Ok(Some(found));
        }

        let resolvers = self.hooks().jit.clone();
        if resolvers.is_empty() {
            return Ok(None);
        }
        let mut collector = Collector::new();
        let mut added = false;
        for resolver in &resolvers {
            match resolver.just_in_time_resolution(injectee) {
                Ok(true) => added = true,
                Ok(false) => {}
                Err(e) => collector.add(LocatorError::configuration(format!(
                    "just-in-time resolution of {injectee} failed: {e}"
                ))),
            }
        }
        collector.throw_if_errors()?;
        if !added {
            return Ok(None);
        }
        debug!(injectee = %injectee, "Retrying lookup after just-in-time resolution");
        Ok(self.matching(injectee, true)?.into_iter().next())
    }

    /// Returns every descriptor satisfying `injectee` in registry order.
    pub fn matching_descriptors(&self, injectee: &Injectee) -> LocatorResult<Vec<Arc<SystemDescriptor>>> {
        self.check_running()?;
        self.matching(injectee, false)
    }

    fn matching(&self, injectee: &Injectee, first_only: bool) -> LocatorResult<Vec<Arc<SystemDescriptor>>> {
        let contract = filter::contract(injectee.required_type().name());
        let mut collector = Collector::new();
        let mut matched = Vec::new();
        for candidate in self.collect(&contract, self.id()) {
            if let Err(errors) = candidate.reify() {
                collector.add_all(errors);
                continue;
            }
            if !candidate.satisfies(injectee) || !self.validate_lookup(&candidate, Some(injectee)) {
                continue;
            }
            matched.push(candidate);
            if first_only {
                break;
            }
        }
        if matched.is_empty() && collector.has_errors() {
            collector.throw_if_errors()?;
        }
        trace!(injectee = %injectee, matched = matched.len(), "Matched injectee");
        Ok(matched)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_lookup(&self, candidate: &SystemDescriptor, injectee: Option<&Injectee>) -> bool {
        let hooks = self.hooks();
        hooks
            .validation
            .iter()
            .filter(|service| service.lookup_filter().matches(candidate))
            .all(|service| self.run_validator(service.validator(), Operation::Lookup, candidate, injectee))
    }

    pub(crate) fn validate(&self, operation: Operation, candidate: &SystemDescriptor, injectee: Option<&Injectee>) -> bool {
        let hooks = self.hooks();
        hooks
            .validation
            .iter()
            .all(|service| self.run_validator(service.validator(), operation, candidate, injectee))
    }

    fn run_validator(
        &self,
        validator: &dyn crate::locator::hooks::Validator,
        operation: Operation,
        candidate: &SystemDescriptor,
        injectee: Option<&Injectee>,
    ) -> bool {
        let info = ValidationInformation::new(operation, candidate, injectee);
        match validator.validate(&info) {
            Ok(true) => true,
            Ok(false) => {
                debug!(descriptor = %candidate, ?operation, "Validator vetoed operation");
                false
            }
            Err(e) => {
                warn!(descriptor = %candidate, ?operation, error = %e, "Validator failed");
                let error = MultiError::from(LocatorError::illegal_state(format!(
                    "validation of {operation:?} on {candidate} failed: {e}"
                )));
                self.report(ErrorType::ValidateFailure, Some(candidate), injectee, error);
                false
            }
        }
    }
}
