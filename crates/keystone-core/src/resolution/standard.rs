//! The standard `Inject` resolver.

use std::sync::Weak;

use tracing::trace;

use crate::creation::injected::Injected;
use crate::error::{LocatorError, LocatorResult};
use crate::foundation::injectee::{InjecteeKind, Injectee};
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;
use crate::resolution::InjectionResolver;
use crate::resolution::provider::ProviderCore;

/// Resolves direct, optional and provider injection points against the
/// registry.
#[derive(Debug, Clone)]
pub struct StandardInjectionResolver {
    locator: Weak<ServiceLocator>,
}

impl StandardInjectionResolver {
    /// Creates the resolver for `locator`.
    pub fn new(locator: Weak<ServiceLocator>) -> Self {
        Self { locator }
    }
}

impl InjectionResolver for StandardInjectionResolver {
    fn resolve(&self, injectee: &Injectee, root: &ServiceHandle) -> LocatorResult<Injected> {
        let locator = self
            .locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state("locator has been dropped"))?;

        match injectee.point().kind() {
            InjecteeKind::Provider | InjecteeKind::IterableProvider => Ok(Injected::provider_value(
                ProviderCore::new(self.locator.clone(), injectee.clone()),
            )),
            InjecteeKind::Direct | InjecteeKind::Optional => {
                let Some(descriptor) = locator.injectee_descriptor(injectee)? else {
                    if injectee.is_optional() {
                        trace!(injectee = %injectee, "Optional injectee left empty");
                        return Ok(Injected::absent());
                    }
                    return Err(LocatorError::unsatisfied(injectee).into());
                };
                let (raw, proxy) = locator.obtain(&descriptor, Some(injectee), root)?;
                let view = descriptor.view(injectee.required_type(), &raw)?;
                Ok(Injected::service(view, proxy))
            }
        }
    }
}
