//! # Keystone Core
//!
//! The service locator at the heart of the Keystone dependency-injection
//! runtime.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! The data model:
//! - **Descriptors**: serializable service metadata ([`Descriptor`])
//! - **Classes**: what a service needs and how to build it ([`ServiceClass`])
//! - **Injection points**: typed, qualified requests ([`InjectionPoint`])
//! - **Filters**: descriptor selection ([`Filter`])
//!
//! ### Creation Layer
//!
//! Turning descriptors into instances:
//! - **Analysis**: picking constructors, fields and lifecycle methods ([`ClassAnalyzer`])
//! - **Creators**: class-backed, factory-backed and pre-built services ([`Creator`])
//! - **Resolution**: finding the value of each injection point ([`InjectionResolver`])
//! - **Interception**: method and constructor interceptors and proxies ([`aop`])
//!
//! ### Locator Layer
//!
//! Registry, lookup and lifecycle:
//! - **Locator**: hierarchical, ranked service lookup ([`ServiceLocator`])
//! - **Configuration**: atomic, validated binding transactions ([`DynamicConfiguration`])
//! - **Contexts**: singleton, per-lookup, per-thread and immediate scopes ([`Context`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use keystone_core::{InjectionPoint, LocatorBuilder, ServiceClass, scopes};
//!
//! struct Engine;
//!
//! struct Car {
//!     engine: Arc<Engine>,
//! }
//!
//! let locator = LocatorBuilder::new("garage").build()?;
//!
//! let engine = ServiceClass::builder::<Engine>().default_constructor(|| Engine).build();
//! let car = ServiceClass::builder::<Car>()
//!     .in_scope(scopes::SINGLETON)
//!     .inject_constructor(vec![InjectionPoint::of::<Engine>()], |args| {
//!         Ok(Car { engine: args.get::<Engine>(0)? })
//!     })
//!     .build();
//!
//! let mut config = locator.configuration()?;
//! config.add_class(engine)?;
//! config.add_class(car)?;
//! config.commit()?;
//!
//! let car = locator.require_service::<Car>()?;
//! ```

// Foundation
pub mod error;
pub mod foundation;

// Creation
pub mod analysis;
pub mod aop;
pub mod creation;
pub mod resolution;

// Locator
pub mod context;
pub mod locator;

pub use error::{
    BoxError, Collector, CreationPhase, ErrorInformation, ErrorType, LocatorError, LocatorResult, MultiError,
};

pub use foundation::{
    ClassLoader, ClassRegistry, ContractType, Descriptor, DescriptorBuilder, DescriptorType, DescriptorVisibility,
    FactoryDescriptors, Filter, IndexedFilter, Injectee, InjecteeKind, InjectionPoint, Qualifier, ServiceArc,
    ServiceClass, TypeKey, Unqualified, filter,
};

pub use analysis::{ClassAnalyzer, DEFAULT_ANALYZER, InjectionPlan};
pub use aop::proxy::{DispatchProxyFactory, ProxyFactory, ProxyHandle};
pub use aop::{ConstructorInterceptor, Interception, InterceptionService, MethodInterceptor};
pub use creation::Creator;
pub use creation::factory::Factory;
pub use creation::injected::{Injected, InjectionArgs};
pub use resolution::provider::IterableProvider;
pub use resolution::{INJECT, InjectionResolver};

pub use context::{
    Context, ImmediateController, ImmediateErrorHandler, ImmediateState, InheritableThreadContext, PerThreadContext,
    ScopeInfo, scopes, spawn_inheriting,
};
pub use locator::active::AbstractActiveDescriptor;
pub use locator::configuration::{ConfigurationState, DynamicConfiguration};
pub use locator::factory::{LocatorFactory, LocatorListener};
pub use locator::handle::ServiceHandle;
pub use locator::hooks::{
    DynamicConfigurationListener, ErrorService, InstanceLifecycleEvent, InstanceLifecycleListener, JustInTimeInjectionResolver,
    LifecycleEventType, Operation, TwoPhaseResource, TwoPhaseTransactionData, ValidationInformation, ValidationService,
    Validator,
};
pub use locator::system_descriptor::{DescriptorKey, SystemDescriptor};
pub use locator::utilities::{enable_immediate_scope, enable_inheritable_thread_scope, enable_per_thread_scope};
pub use locator::{LocatorBuilder, LocatorState, ServiceLocator};

/// Prelude for common imports.
pub mod prelude {
    pub use super::context::scopes;
    pub use super::error::{LocatorError, LocatorResult, MultiError};
    pub use super::foundation::{Descriptor, InjectionPoint, Qualifier, ServiceClass, filter};
    pub use super::locator::active::AbstractActiveDescriptor;
    pub use super::locator::{LocatorBuilder, ServiceLocator};
}
