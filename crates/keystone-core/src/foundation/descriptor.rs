//! The descriptor model.
//!
//! A [`Descriptor`] is plain, serializable metadata about one injectable
//! service. Only `implementation` and `descriptor_type` are required to be
//! meaningful before reification; everything else can be derived from the
//! implementation's [`ServiceClass`](crate::foundation::class::ServiceClass)
//! when the locator reifies the descriptor.
//!
//! # Example
//!
//! ```rust,ignore
//! let descriptor = Descriptor::builder("app::SmtpMailer")
//!     .to("app::Mailer")
//!     .in_scope(scopes::SINGLETON)
//!     .named("primary")
//!     .ranked(10)
//!     .build();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::scopes;
use crate::creation::factory::Factory;
use crate::foundation::class::ClassLoader;
use crate::foundation::types::{NAMED, TypeKey};

/// How a descriptor produces instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DescriptorType {
    /// Instances are constructed from the implementation class.
    #[default]
    Class,
    /// Instances are produced by a factory's provide method.
    ProvideMethod,
}

/// Who may see a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DescriptorVisibility {
    /// Visible to the owning locator and its children.
    #[default]
    Normal,
    /// Visible to the owning locator only.
    Local,
}

/// A class-loading strategy attached to a single descriptor.
#[derive(Clone)]
pub struct LoaderRef(pub Arc<dyn ClassLoader>);

impl fmt::Debug for LoaderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoaderRef(..)")
    }
}

impl PartialEq for LoaderRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Serializable metadata describing one injectable service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    /// Implementation identifier, resolved through a class loader.
    pub implementation: String,
    /// Contract names this service can be looked up by.
    pub advertised_contracts: BTreeSet<String>,
    /// Service name, mirrored by a `Named` qualifier.
    pub name: Option<String>,
    /// Scope identifier; `None` means the implementation decides.
    pub scope: Option<String>,
    /// Qualifier names.
    pub qualifiers: BTreeSet<String>,
    /// Free-form metadata; values keep their insertion order.
    pub metadata: BTreeMap<String, Vec<String>>,
    /// Descriptor kind.
    pub descriptor_type: DescriptorType,
    /// Visibility to child locators.
    pub visibility: DescriptorVisibility,
    /// Ranking; higher wins.
    pub ranking: i32,
    /// Proxy policy; `None` inherits the scope's default.
    pub proxiable: Option<bool>,
    /// Whether to proxy when injected into the same scope; `None` inherits.
    pub proxy_for_same_scope: Option<bool>,
    /// Name of the class analyzer to use; `None` selects the default.
    pub class_analysis_name: Option<String>,
    /// Assigned by the locator at commit.
    pub service_id: Option<u64>,
    /// Assigned by the locator at commit.
    pub locator_id: Option<u64>,
    /// Class loader for this descriptor only.
    #[serde(skip)]
    pub loader: Option<LoaderRef>,
}

impl Descriptor {
    /// Starts building a descriptor for an implementation.
    pub fn builder(implementation: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(implementation)
    }

    /// Returns a copy with both locator-assigned ids cleared.
    pub fn without_ids(&self) -> Self {
        Self {
            service_id: None,
            locator_id: None,
            ..self.clone()
        }
    }

    /// Returns `true` if the descriptor advertises `contract`.
    pub fn advertises(&self, contract: &str) -> bool {
        self.advertised_contracts.contains(contract)
    }

    /// Returns the first metadata value for `key`.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.implementation)?;
        if let Some(name) = &self.name {
            write!(f, "(\"{name}\")")?;
        }
        if let (Some(locator), Some(service)) = (self.locator_id, self.service_id) {
            write!(f, "[{locator}.{service}]")?;
        }
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent builder for [`Descriptor`]s.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    /// Creates a builder for an implementation.
    pub fn new(implementation: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor {
                implementation: implementation.into(),
                ..Descriptor::default()
            },
        }
    }

    /// Advertises a contract by name.
    pub fn to(mut self, contract: impl Into<String>) -> Self {
        self.descriptor.advertised_contracts.insert(contract.into());
        self
    }

    /// Advertises the contract of type `C`.
    pub fn to_type<C: ?Sized + 'static>(self) -> Self {
        self.to(TypeKey::of::<C>().name())
    }

    /// Sets the scope.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.descriptor.scope = Some(scope.into());
        self
    }

    /// Sets the name and adds the `Named` qualifier.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self.descriptor.qualifiers.insert(NAMED.to_string());
        self
    }

    /// Adds a qualifier by name.
    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.descriptor.qualifiers.insert(qualifier.into());
        self
    }

    /// Appends a metadata value.
    pub fn has(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor
            .metadata
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Sets the ranking.
    pub fn ranked(mut self, ranking: i32) -> Self {
        self.descriptor.ranking = ranking;
        self
    }

    /// Restricts visibility to the owning locator.
    pub fn local_only(mut self) -> Self {
        self.descriptor.visibility = DescriptorVisibility::Local;
        self
    }

    /// Sets the proxy policy explicitly.
    pub fn proxy(mut self, proxiable: bool) -> Self {
        self.descriptor.proxiable = Some(proxiable);
        self
    }

    /// Sets whether injections into the same scope are proxied.
    pub fn proxy_for_same_scope(mut self, proxy: bool) -> Self {
        self.descriptor.proxy_for_same_scope = Some(proxy);
        self
    }

    /// Selects a class analyzer by name.
    pub fn analyze_with(mut self, analyzer: impl Into<String>) -> Self {
        self.descriptor.class_analysis_name = Some(analyzer.into());
        self
    }

    /// Attaches a class loader to this descriptor.
    pub fn loaded_by(mut self, loader: Arc<dyn ClassLoader>) -> Self {
        self.descriptor.loader = Some(LoaderRef(loader));
        self
    }

    /// Builds a class descriptor.
    pub fn build(self) -> Descriptor {
        self.descriptor
    }

    /// Builds a provide-method descriptor.
    ///
    /// Provide-method descriptors must be bound together with their factory,
    /// see [`build_factory`](Self::build_factory).
    pub fn build_provide_method(mut self) -> Descriptor {
        self.descriptor.descriptor_type = DescriptorType::ProvideMethod;
        self.descriptor
    }

    /// Builds the linked factory pair, with the factory itself a singleton.
    ///
    /// The builder's contracts, scope, name and qualifiers describe the
    /// produced service.
    pub fn build_factory(self) -> FactoryDescriptors {
        self.build_factory_in(scopes::SINGLETON)
    }

    /// Builds the linked factory pair with an explicit factory scope.
    pub fn build_factory_in(self, factory_scope: impl Into<String>) -> FactoryDescriptors {
        let implementation = self.descriptor.implementation.clone();
        let mut factory_as_service = Descriptor::builder(implementation.clone())
            .to(implementation)
            .to_type::<dyn Factory>()
            .in_scope(factory_scope)
            .build();
        factory_as_service.loader = self.descriptor.loader.clone();
        FactoryDescriptors {
            factory_as_service,
            factory_as_factory: self.build_provide_method(),
        }
    }
}

/// A factory service descriptor paired with the provide-method descriptor it
/// backs.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryDescriptors {
    /// The factory itself, as a class service.
    pub factory_as_service: Descriptor,
    /// The products of the factory.
    pub factory_as_factory: Descriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let d = Descriptor::builder("app::Impl")
            .to("app::Contract")
            .in_scope(scopes::SINGLETON)
            .named("primary")
            .qualified_by("Blue")
            .has("key", "a")
            .has("key", "b")
            .ranked(5)
            .local_only()
            .proxy(false)
            .build();

        assert_eq!(d.implementation, "app::Impl");
        assert!(d.advertises("app::Contract"));
        assert_eq!(d.name.as_deref(), Some("primary"));
        assert!(d.qualifiers.contains(NAMED));
        assert!(d.qualifiers.contains("Blue"));
        assert_eq!(d.metadata["key"], vec!["a", "b"]);
        assert_eq!(d.metadata_value("key"), Some("a"));
        assert_eq!(d.ranking, 5);
        assert_eq!(d.visibility, DescriptorVisibility::Local);
        assert_eq!(d.proxiable, Some(false));
        assert_eq!(d.descriptor_type, DescriptorType::Class);
    }

    #[test]
    fn test_build_factory_pairs_descriptors() {
        let pair = Descriptor::builder("app::WidgetFactory")
            .to("app::Widget")
            .in_scope(scopes::PER_LOOKUP)
            .build_factory();

        assert_eq!(
            pair.factory_as_factory.descriptor_type,
            DescriptorType::ProvideMethod
        );
        assert!(pair.factory_as_factory.advertises("app::Widget"));
        assert!(
            pair.factory_as_service
                .advertises(TypeKey::of::<dyn Factory>().name())
        );
        assert_eq!(
            pair.factory_as_service.scope.as_deref(),
            Some(scopes::SINGLETON)
        );
    }

    #[test]
    fn test_without_ids_and_serde() {
        let mut d = Descriptor::builder("app::Impl").to("app::Contract").build();
        d.service_id = Some(3);
        d.locator_id = Some(1);
        assert_eq!(d.without_ids().service_id, None);
        assert_eq!(d.to_string(), "app::Impl[1.3]");

        let json = serde_json::to_string(&d).unwrap();
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
