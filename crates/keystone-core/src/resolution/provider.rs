//! Deferred injection through providers.
//!
//! A provider injection point does not resolve anything when its consumer is
//! built. Every access to the [`IterableProvider`] queries the registry
//! again, so services bound later are seen, and the result always follows
//! registry order: ranking descending, then newest locator, then lowest
//! service id.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::error::{Collector, LocatorError, LocatorResult};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{Qualifier, TypeKey};
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;

/// The untyped state of a provider: where to look, and what for.
#[derive(Clone)]
pub struct ProviderCore {
    locator: Weak<ServiceLocator>,
    injectee: Injectee,
}

impl ProviderCore {
    pub(crate) fn new(locator: Weak<ServiceLocator>, injectee: Injectee) -> Self {
        Self { locator, injectee }
    }

    fn locator(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state("locator behind a provider has been dropped").into())
    }

    fn narrowed(&self, qualifier: Qualifier) -> Self {
        let point = self.injectee.point().clone().qualified_by(qualifier);
        Self::new(self.locator.clone(), self.injectee.with_point(point))
    }

    fn retyped(&self, required: TypeKey) -> Self {
        let point = self.injectee.point().retyped(required);
        Self::new(self.locator.clone(), self.injectee.with_point(point))
    }

    fn best_handle(&self) -> LocatorResult<Option<ServiceHandle>> {
        let locator = self.locator()?;
        Ok(locator
            .injectee_descriptor(&self.injectee)?
            .map(|descriptor| locator.root_handle(descriptor, Some(self.injectee.clone()))))
    }

    fn all_handles(&self) -> LocatorResult<Vec<ServiceHandle>> {
        let locator = self.locator()?;
        Ok(locator
            .matching_descriptors(&self.injectee)?
            .into_iter()
            .map(|descriptor| locator.root_handle(descriptor, Some(self.injectee.clone())))
            .collect())
    }
}

impl fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCore")
            .field("injectee", &self.injectee)
            .finish_non_exhaustive()
    }
}

/// A provider of every service matching a contract and qualifiers.
pub struct IterableProvider<C: ?Sized> {
    core: ProviderCore,
    _contract: PhantomData<fn() -> Arc<C>>,
}

impl<C: ?Sized + 'static> IterableProvider<C> {
    pub(crate) fn new(core: ProviderCore) -> Self {
        Self {
            core,
            _contract: PhantomData,
        }
    }

    /// Returns the best matching service, if any.
    pub fn get(&self) -> LocatorResult<Option<Arc<C>>> {
        match self.core.best_handle()? {
            Some(handle) => handle.service_as::<C>().map(Some),
            None => Ok(None),
        }
    }

    /// Returns the best matching service, failing if there is none.
    pub fn require(&self) -> LocatorResult<Arc<C>> {
        self.get()?
            .ok_or_else(|| LocatorError::unsatisfied(&self.core.injectee).into())
    }

    /// Returns a handle to the best matching service.
    pub fn handle(&self) -> LocatorResult<Option<ServiceHandle>> {
        self.core.best_handle()
    }

    /// Returns the number of matching services.
    pub fn size(&self) -> LocatorResult<usize> {
        Ok(self.core.locator()?.matching_descriptors(&self.core.injectee)?.len())
    }

    /// Returns every matching service in registry order.
    ///
    /// Services that fail to create are reported together after the rest
    /// have been attempted.
    pub fn all(&self) -> LocatorResult<Vec<Arc<C>>> {
        let mut collector = Collector::new();
        let mut services = Vec::new();
        for handle in self.core.all_handles()? {
            match handle.service_as::<C>() {
                Ok(service) => services.push(service),
                Err(errors) => collector.add_all(errors),
            }
        }
        collector.into_result(services)
    }

    /// Returns handles to every matching service in registry order.
    pub fn handles(&self) -> LocatorResult<Vec<ServiceHandle>> {
        self.core.all_handles()
    }

    /// Narrows to services with the given name.
    pub fn named(&self, name: impl Into<String>) -> Self {
        Self::new(self.core.narrowed(Qualifier::named(name)))
    }

    /// Narrows to services carrying `qualifier`.
    pub fn qualified_with(&self, qualifier: Qualifier) -> Self {
        Self::new(self.core.narrowed(qualifier))
    }

    /// Narrows to services advertising `D`, keeping the qualifiers.
    pub fn of_type<D: ?Sized + 'static>(&self) -> IterableProvider<D> {
        IterableProvider::new(self.core.retyped(TypeKey::of::<D>()))
    }
}

impl<C: ?Sized> Clone for IterableProvider<C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _contract: PhantomData,
        }
    }
}

impl<C: ?Sized> fmt::Debug for IterableProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterableProvider")
            .field("contract", &std::any::type_name::<C>())
            .field("injectee", &self.core.injectee)
            .finish()
    }
}
