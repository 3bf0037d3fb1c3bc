//! The per-lookup context.

use std::sync::Arc;

use crate::context::{Context, ScopeInfo, scopes};
use crate::error::LocatorResult;
use crate::foundation::types::ServiceArc;
use crate::locator::handle::ServiceHandle;
use crate::locator::system_descriptor::SystemDescriptor;

/// Context for the [`PER_LOOKUP`](scopes::PER_LOOKUP) scope.
///
/// Nothing is cached. Instances are destroyed by the handle that created
/// them.
#[derive(Debug, Default)]
pub struct PerLookupContext;

impl Context for PerLookupContext {
    fn scope(&self) -> ScopeInfo {
        ScopeInfo::new(scopes::PER_LOOKUP).unproxiable()
    }

    fn find_or_create(&self, descriptor: &Arc<SystemDescriptor>, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        descriptor.create(root)
    }

    fn contains_key(&self, _descriptor: &SystemDescriptor) -> bool {
        false
    }

    fn destroy_one(&self, _descriptor: &SystemDescriptor) {}

    fn is_active(&self) -> bool {
        true
    }

    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_lookup_is_unproxiable() {
        let info = PerLookupContext.scope();
        assert_eq!(info.name, scopes::PER_LOOKUP);
        assert!(info.unproxiable);
        assert!(!info.proxiable);
    }
}
