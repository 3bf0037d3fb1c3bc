//! Injection resolvers.
//!
//! Every non-self injection point is handed to the resolver registered for
//! its annotation, or to the standard [`INJECT`] resolver when the point has
//! none. Resolvers are services advertising `dyn InjectionResolver` whose
//! service name is the annotation they handle.

pub mod provider;
pub mod standard;

use crate::creation::injected::Injected;
use crate::error::LocatorResult;
use crate::foundation::injectee::Injectee;
use crate::locator::handle::ServiceHandle;

/// Annotation name of the standard resolver.
pub const INJECT: &str = "Inject";

/// Turns an injection point into a value.
pub trait InjectionResolver: Send + Sync {
    /// Resolves `injectee`. Services created along the way that need
    /// destroying with the consumer are attached to `root`.
    fn resolve(&self, injectee: &Injectee, root: &ServiceHandle) -> LocatorResult<Injected>;

    /// Whether a constructor with a parameter carrying this resolver's
    /// annotation is eligible for injection.
    fn is_constructor_parameter_indicator(&self) -> bool {
        false
    }

    /// Whether a method with a parameter carrying this resolver's annotation
    /// is an initializer method.
    fn is_method_parameter_indicator(&self) -> bool {
        false
    }
}

/// What a registered resolver says about member eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverIndicators {
    /// See [`InjectionResolver::is_constructor_parameter_indicator`].
    pub constructor: bool,
    /// See [`InjectionResolver::is_method_parameter_indicator`].
    pub method: bool,
}

impl ResolverIndicators {
    pub(crate) fn of(resolver: &dyn InjectionResolver) -> Self {
        Self {
            constructor: resolver.is_constructor_parameter_indicator(),
            method: resolver.is_method_parameter_indicator(),
        }
    }
}
