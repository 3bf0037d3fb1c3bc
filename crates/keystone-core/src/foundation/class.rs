//! Service classes and class-loading strategies.
//!
//! A [`ServiceClass`] is the introspection record the locator reifies
//! descriptors against: constructors, fields, initializer methods,
//! lifecycle methods, interceptable methods and the contracts an instance can
//! be viewed as. It is assembled once with [`ServiceClass::builder`] and then
//! shared immutably.
//!
//! # Example
//!
//! ```rust,ignore
//! let car = ServiceClass::builder::<Car>()
//!     .contract::<dyn Vehicle>(|c| c)
//!     .inject_constructor(vec![InjectionPoint::of::<Engine>()], |args| {
//!         Ok(Car { engine: args.get::<Engine>(0)? })
//!     })
//!     .post_construct("warm_up", |car| car.warm_up())
//!     .build();
//! ```
//!
//! Class-loading strategies map implementation names to classes. The default
//! strategy is the in-memory [`ClassRegistry`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::aop::Value;
use crate::creation::factory::Factory;
use crate::creation::injected::{Injected, InjectionArgs};
use crate::error::{BoxError, LocatorError};
use crate::foundation::descriptor::{Descriptor, DescriptorBuilder, FactoryDescriptors};
use crate::foundation::injectee::InjectionPoint;
use crate::foundation::types::{ContractType, Qualifier, TypeKey};

/// An owned, not yet shared instance.
pub type RawInstance = Box<dyn Any + Send + Sync>;

type ConstructFn = Arc<dyn Fn(&InjectionArgs) -> Result<RawInstance, BoxError> + Send + Sync>;
type FieldFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), &Injected) -> Result<(), BoxError> + Send + Sync>;
type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &InjectionArgs) -> Result<(), BoxError> + Send + Sync>;
type PostConstructFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync)) -> Result<(), BoxError> + Send + Sync>;
type PreDestroyFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), BoxError> + Send + Sync>;
type InvokeFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<Value, BoxError> + Send + Sync>;

fn mismatch<T>(class: &str) -> BoxError {
    format!(
        "instance handed to {class} is not a {}",
        std::any::type_name::<T>()
    )
    .into()
}

// =============================================================================
// Members
// =============================================================================

/// A constructor and the injection points of its parameters.
#[derive(Clone)]
pub struct ConstructorInfo {
    params: Vec<InjectionPoint>,
    inject: bool,
    construct: ConstructFn,
}

impl ConstructorInfo {
    /// Returns the parameter injection points.
    pub fn params(&self) -> &[InjectionPoint] {
        &self.params
    }

    /// Returns `true` if the constructor is marked injectable.
    pub fn is_inject(&self) -> bool {
        self.inject
    }

    /// Invokes the constructor with resolved arguments.
    pub fn construct(&self, args: &InjectionArgs) -> Result<RawInstance, BoxError> {
        (self.construct)(args)
    }
}

/// An injectable field.
#[derive(Clone)]
pub struct FieldInfo {
    name: String,
    point: InjectionPoint,
    inject: bool,
    set: FieldFn,
}

impl FieldInfo {
    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field's injection point.
    pub fn point(&self) -> &InjectionPoint {
        &self.point
    }

    /// Returns `true` if the field is marked injectable.
    pub fn is_inject(&self) -> bool {
        self.inject
    }

    /// Stores a resolved value into the field.
    pub fn set(&self, target: &mut (dyn Any + Send + Sync), value: &Injected) -> Result<(), BoxError> {
        (self.set)(target, value)
    }
}

/// A method that may be used as an initializer.
#[derive(Clone)]
pub struct MethodInfo {
    name: String,
    params: Vec<InjectionPoint>,
    inject: bool,
    invoke: MethodFn,
}

impl MethodInfo {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter injection points.
    pub fn params(&self) -> &[InjectionPoint] {
        &self.params
    }

    /// Returns `true` if the method is marked injectable.
    pub fn is_inject(&self) -> bool {
        self.inject
    }

    /// Invokes the method with resolved arguments.
    pub fn invoke(
        &self,
        target: &mut (dyn Any + Send + Sync),
        args: &InjectionArgs,
    ) -> Result<(), BoxError> {
        (self.invoke)(target, args)
    }
}

/// A post-construct callback.
#[derive(Clone)]
pub struct PostConstructMethod {
    name: String,
    call: PostConstructFn,
}

impl PostConstructMethod {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the callback.
    pub fn call(&self, target: &mut (dyn Any + Send + Sync)) -> Result<(), BoxError> {
        (self.call)(target)
    }
}

/// A pre-destroy callback.
#[derive(Clone)]
pub struct PreDestroyMethod {
    name: String,
    call: PreDestroyFn,
}

impl PreDestroyMethod {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the callback.
    pub fn call(&self, target: &(dyn Any + Send + Sync)) -> Result<(), BoxError> {
        (self.call)(target)
    }
}

/// A method that can be routed through an interceptor chain.
#[derive(Clone)]
pub struct InterceptableMethod {
    name: String,
    invoke: InvokeFn,
}

impl InterceptableMethod {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the method on the real target.
    pub fn invoke(&self, target: &(dyn Any + Send + Sync), args: &[Value]) -> Result<Value, BoxError> {
        (self.invoke)(target, args)
    }
}

/// What a factory class produces.
#[derive(Clone, Debug)]
pub struct ProductInfo {
    key: TypeKey,
    contracts: Vec<ContractType>,
    scope: Option<String>,
    qualifiers: Vec<Qualifier>,
}

impl ProductInfo {
    /// Returns the product type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Returns the contracts products can be viewed as.
    pub fn contracts(&self) -> &[ContractType] {
        &self.contracts
    }

    /// Returns the scope declared for products.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the qualifiers declared for products.
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }
}

// =============================================================================
// ServiceClass
// =============================================================================

/// The introspection record of an injectable type.
#[derive(Clone)]
pub struct ServiceClass {
    name: String,
    key: TypeKey,
    contracts: Vec<ContractType>,
    scope: Option<String>,
    qualifiers: Vec<Qualifier>,
    constructors: Vec<ConstructorInfo>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    post_construct: Vec<PostConstructMethod>,
    pre_destroy: Vec<PreDestroyMethod>,
    interceptable: Vec<InterceptableMethod>,
    product: Option<ProductInfo>,
}

impl ServiceClass {
    /// Starts describing `T`.
    pub fn builder<T: Send + Sync + 'static>() -> ServiceClassBuilder<T> {
        ServiceClassBuilder::new()
    }

    /// Returns the class name used as the implementation identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the implementation type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Returns every contract instances can be viewed as, itself included.
    pub fn contracts(&self) -> &[ContractType] {
        &self.contracts
    }

    /// Finds a contract by name.
    pub fn contract_named(&self, name: &str) -> Option<&ContractType> {
        self.contracts.iter().find(|c| c.name() == name)
    }

    /// Returns the scope annotation.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the qualifier annotations.
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// Returns the declared constructors.
    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.constructors
    }

    /// Returns the declared fields.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Returns the declared methods.
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Returns the declared post-construct methods.
    pub fn post_construct_methods(&self) -> &[PostConstructMethod] {
        &self.post_construct
    }

    /// Returns the declared pre-destroy methods.
    pub fn pre_destroy_methods(&self) -> &[PreDestroyMethod] {
        &self.pre_destroy
    }

    /// Returns the methods that can be intercepted.
    pub fn interceptable_methods(&self) -> &[InterceptableMethod] {
        &self.interceptable
    }

    /// Finds an interceptable method by name.
    pub fn interceptable_method(&self, name: &str) -> Option<&InterceptableMethod> {
        self.interceptable.iter().find(|m| m.name == name)
    }

    /// Returns what this class produces if it is a factory.
    pub fn product(&self) -> Option<&ProductInfo> {
        self.product.as_ref()
    }

    /// Returns a descriptor builder filled in from the class: every
    /// contract, the scope and the qualifiers.
    pub fn descriptor_builder(&self) -> DescriptorBuilder {
        let mut builder = Descriptor::builder(self.name.clone());
        for contract in &self.contracts {
            builder = builder.to(contract.name());
        }
        if let Some(scope) = &self.scope {
            builder = builder.in_scope(scope.clone());
        }
        with_qualifiers(builder, &self.qualifiers)
    }

    /// Returns the linked factory pair for a factory class, describing the
    /// products from the class's product declaration.
    pub fn factory_descriptors(&self) -> Option<FactoryDescriptors> {
        let product = self.product.as_ref()?;
        let mut builder = Descriptor::builder(self.name.clone());
        for contract in &product.contracts {
            builder = builder.to(contract.name());
        }
        if let Some(scope) = &product.scope {
            builder = builder.in_scope(scope.clone());
        }
        let builder = with_qualifiers(builder, &product.qualifiers);
        Some(match &self.scope {
            Some(scope) => builder.build_factory_in(scope.clone()),
            None => builder.build_factory(),
        })
    }
}

fn with_qualifiers(mut builder: DescriptorBuilder, qualifiers: &[Qualifier]) -> DescriptorBuilder {
    for qualifier in qualifiers {
        builder = match (qualifier.is_named(), qualifier.value()) {
            (true, Some(name)) => builder.named(name),
            _ => builder.qualified_by(qualifier.name()),
        };
    }
    builder
}

impl fmt::Debug for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClass")
            .field("name", &self.name)
            .field("contracts", &self.contracts.iter().map(ContractType::name).collect::<Vec<_>>())
            .field("scope", &self.scope)
            .field("constructors", &self.constructors.len())
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

fn factory_contract<T: Factory + 'static>(factory: Arc<T>) -> Arc<dyn Factory> {
    factory
}

/// Typed builder for a [`ServiceClass`] describing `T`.
pub struct ServiceClassBuilder<T> {
    class: ServiceClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ServiceClassBuilder<T> {
    fn new() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            class: ServiceClass {
                name: key.name().to_string(),
                key,
                contracts: vec![ContractType::of::<T>()],
                scope: None,
                qualifiers: Vec::new(),
                constructors: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                post_construct: Vec::new(),
                pre_destroy: Vec::new(),
                interceptable: Vec::new(),
                product: None,
            },
            _marker: PhantomData,
        }
    }

    /// Overrides the class name (defaults to the Rust type name).
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class.name = name.into();
        self
    }

    /// Declares that instances can be viewed as `C`.
    pub fn contract<C: ?Sized + Send + Sync + 'static>(mut self, cast: fn(Arc<T>) -> Arc<C>) -> Self {
        self.class.contracts.push(ContractType::upcast::<T, C>(cast));
        self
    }

    /// Declares `C` together with the adapter that implements it on a proxy.
    pub fn contract_with_adapter<C, F>(mut self, cast: fn(Arc<T>) -> Arc<C>, adapter: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(crate::aop::proxy::ProxyHandle) -> Arc<C> + Send + Sync + 'static,
    {
        self.class
            .contracts
            .push(ContractType::upcast::<T, C>(cast).with_adapter(adapter));
        self
    }

    /// Declares the proxy adapter for `T` itself.
    pub fn self_adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(crate::aop::proxy::ProxyHandle) -> Arc<T> + Send + Sync + 'static,
    {
        if let Some(own) = self.class.contracts.first_mut() {
            *own = own.clone().with_adapter(adapter);
        }
        self
    }

    /// Sets the scope annotation.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.class.scope = Some(scope.into());
        self
    }

    /// Adds a qualifier annotation.
    pub fn qualified_by(mut self, qualifier: Qualifier) -> Self {
        self.class.qualifiers.push(qualifier);
        self
    }

    /// Adds the `Named` qualifier annotation.
    pub fn named(self, name: impl Into<String>) -> Self {
        self.qualified_by(Qualifier::named(name))
    }

    /// Declares a zero-argument constructor.
    pub fn default_constructor<F>(self, construct: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.push_constructor(Vec::new(), false, move |_| Ok(construct()))
    }

    /// Declares a constructor that is not marked injectable.
    ///
    /// It is only selected if a custom injection resolver of one of its
    /// parameters marks it as eligible.
    pub fn constructor<F>(self, params: Vec<InjectionPoint>, construct: F) -> Self
    where
        F: Fn(&InjectionArgs) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.push_constructor(params, false, construct)
    }

    /// Declares a constructor marked injectable.
    pub fn inject_constructor<F>(self, params: Vec<InjectionPoint>, construct: F) -> Self
    where
        F: Fn(&InjectionArgs) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.push_constructor(params, true, construct)
    }

    fn push_constructor<F>(mut self, params: Vec<InjectionPoint>, inject: bool, construct: F) -> Self
    where
        F: Fn(&InjectionArgs) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.class.constructors.push(ConstructorInfo {
            params,
            inject,
            construct: Arc::new(move |args| construct(args).map(|t| Box::new(t) as RawInstance)),
        });
        self
    }

    /// Declares an injectable field.
    pub fn field<F>(self, name: impl Into<String>, point: InjectionPoint, set: F) -> Self
    where
        F: Fn(&mut T, &Injected) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.push_field(name.into(), point, true, set)
    }

    /// Declares a field that is only injected through its custom annotation.
    pub fn annotated_field<F>(self, name: impl Into<String>, point: InjectionPoint, set: F) -> Self
    where
        F: Fn(&mut T, &Injected) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.push_field(name.into(), point, false, set)
    }

    fn push_field<F>(mut self, name: String, point: InjectionPoint, inject: bool, set: F) -> Self
    where
        F: Fn(&mut T, &Injected) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.class.name.clone();
        self.class.fields.push(FieldInfo {
            name,
            point,
            inject,
            set: Arc::new(move |target, value| match target.downcast_mut::<T>() {
                Some(target) => set(target, value),
                None => Err(mismatch::<T>(&class)),
            }),
        });
        self
    }

    /// Declares an initializer method marked injectable.
    pub fn initializer<F>(self, name: impl Into<String>, params: Vec<InjectionPoint>, invoke: F) -> Self
    where
        F: Fn(&mut T, &InjectionArgs) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.push_method(name.into(), params, true, invoke)
    }

    /// Declares a method that is not marked injectable.
    ///
    /// It becomes an initializer only if a custom injection resolver of one
    /// of its parameters is a method-parameter indicator.
    pub fn method<F>(self, name: impl Into<String>, params: Vec<InjectionPoint>, invoke: F) -> Self
    where
        F: Fn(&mut T, &InjectionArgs) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.push_method(name.into(), params, false, invoke)
    }

    fn push_method<F>(mut self, name: String, params: Vec<InjectionPoint>, inject: bool, invoke: F) -> Self
    where
        F: Fn(&mut T, &InjectionArgs) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.class.name.clone();
        self.class.methods.push(MethodInfo {
            name,
            params,
            inject,
            invoke: Arc::new(move |target, args| match target.downcast_mut::<T>() {
                Some(target) => invoke(target, args),
                None => Err(mismatch::<T>(&class)),
            }),
        });
        self
    }

    /// Declares the post-construct method.
    pub fn post_construct<F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.class.name.clone();
        self.class.post_construct.push(PostConstructMethod {
            name: name.into(),
            call: Arc::new(move |target| match target.downcast_mut::<T>() {
                Some(target) => call(target),
                None => Err(mismatch::<T>(&class)),
            }),
        });
        self
    }

    /// Declares the pre-destroy method.
    pub fn pre_destroy<F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let class = self.class.name.clone();
        self.class.pre_destroy.push(PreDestroyMethod {
            name: name.into(),
            call: Arc::new(move |target| match target.downcast_ref::<T>() {
                Some(target) => call(target),
                None => Err(mismatch::<T>(&class)),
            }),
        });
        self
    }

    /// Declares a method that interceptors can wrap.
    pub fn interceptable<F>(mut self, name: impl Into<String>, invoke: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let class = self.class.name.clone();
        self.class.interceptable.push(InterceptableMethod {
            name: name.into(),
            invoke: Arc::new(move |target, args| match target.downcast_ref::<T>() {
                Some(target) => invoke(target, args),
                None => Err(mismatch::<T>(&class)),
            }),
        });
        self
    }

    /// Builds the class.
    pub fn build(self) -> Arc<ServiceClass> {
        Arc::new(self.class)
    }
}

impl<T: Factory + 'static> ServiceClassBuilder<T> {
    /// Declares that `T` is a factory producing `P`.
    pub fn produces<P: Send + Sync + 'static>(mut self) -> Self {
        self.class.contracts.push(ContractType::upcast::<T, dyn Factory>(factory_contract::<T>));
        self.class.product = Some(ProductInfo {
            key: TypeKey::of::<P>(),
            contracts: vec![ContractType::of::<P>()],
            scope: None,
            qualifiers: Vec::new(),
        });
        self
    }

    /// Declares an additional contract of the product `P`.
    ///
    /// Must follow [`produces`](Self::produces).
    pub fn product_contract<P, C>(mut self, cast: fn(Arc<P>) -> Arc<C>) -> Self
    where
        P: Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
    {
        if let Some(product) = self.class.product.as_mut() {
            product.contracts.push(ContractType::upcast::<P, C>(cast));
        }
        self
    }

    /// Sets the scope of the products.
    pub fn product_scope(mut self, scope: impl Into<String>) -> Self {
        if let Some(product) = self.class.product.as_mut() {
            product.scope = Some(scope.into());
        }
        self
    }

    /// Adds a qualifier to the products.
    pub fn product_qualified_by(mut self, qualifier: Qualifier) -> Self {
        if let Some(product) = self.class.product.as_mut() {
            product.qualifiers.push(qualifier);
        }
        self
    }
}

// =============================================================================
// Class Loading
// =============================================================================

/// Resolves implementation names to classes.
pub trait ClassLoader: Send + Sync {
    /// Loads the class registered under `name`.
    fn load_class(&self, name: &str) -> Result<Arc<ServiceClass>, LocatorError>;
}

/// An in-memory class-loading strategy.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<ServiceClass>>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class under its name and returns that name.
    pub fn register(&self, class: Arc<ServiceClass>) -> String {
        let name = class.name().to_string();
        if self.classes.write().insert(name.clone(), class).is_some() {
            debug!(class = %name, "Replaced registered class");
        }
        name
    }

    /// Returns the class registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ServiceClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Returns the number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl ClassLoader for ClassRegistry {
    fn load_class(&self, name: &str) -> Result<Arc<ServiceClass>, LocatorError> {
        self.get(name)
            .ok_or_else(|| LocatorError::reification(name, "class not found"))
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {
        fn area(&self) -> f64;
    }

    #[derive(Default)]
    struct Square {
        side: f64,
        label: Option<String>,
    }

    impl Shape for Square {
        fn area(&self) -> f64 {
            self.side * self.side
        }
    }

    #[test]
    fn test_builder_records_members() {
        let class = ServiceClass::builder::<Square>()
            .class_name("Square")
            .contract::<dyn Shape>(|s| s)
            .default_constructor(|| Square { side: 2.0, label: None })
            .field("label", InjectionPoint::of::<String>(), |s, v| {
                s.label = Some(v.get::<String>()?.to_string());
                Ok(())
            })
            .post_construct("check", |s| {
                if s.side > 0.0 { Ok(()) } else { Err("negative".into()) }
            })
            .pre_destroy("close", |_| Ok(()))
            .build();

        assert_eq!(class.name(), "Square");
        assert_eq!(class.contracts().len(), 2);
        assert!(class.contract_named(TypeKey::of::<dyn Shape>().name()).is_some());
        assert_eq!(class.constructors().len(), 1);
        assert_eq!(class.fields()[0].name(), "label");
        assert_eq!(class.post_construct_methods().len(), 1);
        assert_eq!(class.pre_destroy_methods()[0].name(), "close");
    }

    #[test]
    fn test_erased_callbacks_check_type() {
        let class = ServiceClass::builder::<Square>()
            .default_constructor(Square::default)
            .post_construct("grow", |s| {
                s.side += 1.0;
                Ok(())
            })
            .build();

        let mut raw = class.constructors()[0]
            .construct(&InjectionArgs::default())
            .unwrap();
        class.post_construct_methods()[0].call(raw.as_mut()).unwrap();
        assert_eq!(raw.downcast_ref::<Square>().unwrap().side, 1.0);

        let mut wrong: RawInstance = Box::new(5_u8);
        assert!(class.post_construct_methods()[0].call(wrong.as_mut()).is_err());
    }

    #[test]
    fn test_registry_loads_by_name() {
        let registry = ClassRegistry::new();
        let name = registry.register(
            ServiceClass::builder::<Square>()
                .default_constructor(Square::default)
                .build(),
        );

        assert!(registry.contains(&name));
        assert_eq!(registry.load_class(&name).unwrap().name(), name);
        assert!(registry.load_class("missing").is_err());
    }
}
