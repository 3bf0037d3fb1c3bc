//! Foundation layer: the data model every other layer builds on.
//!
//! - **Descriptors**: serializable service metadata ([`Descriptor`])
//! - **Classes**: introspection records and class loaders ([`ServiceClass`])
//! - **Injection points**: what a class asks for ([`InjectionPoint`], [`Injectee`])
//! - **Types**: type identity, contract views and qualifiers ([`TypeKey`], [`ContractType`])
//! - **Filters**: descriptor selection ([`Filter`], [`IndexedFilter`])

pub mod class;
pub mod descriptor;
pub mod filter;
pub mod injectee;
pub mod types;

pub use class::{ClassLoader, ClassRegistry, RawInstance, ServiceClass, ServiceClassBuilder};
pub use descriptor::{Descriptor, DescriptorBuilder, DescriptorType, DescriptorVisibility, FactoryDescriptors};
pub use filter::{Filter, IndexedFilter};
pub use injectee::{Injectee, InjecteeKind, InjectionPoint, Unqualified};
pub use types::{ContractType, NAMED, Qualifier, ServiceArc, TypeKey, downcast_view, into_view};
