//! Service creation, contexts, proxies and hook loading.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::analysis::{ClassAnalyzer, DEFAULT_ANALYZER, InjectionPlan};
use crate::aop::Interception;
use crate::aop::proxy::{ProxyHandle, ProxySpec};
use crate::context::{Context, ScopeInfo, scopes};
use crate::creation::Creator;
use crate::creation::class_creator::ClassCreator;
use crate::creation::injected::Injected;
use crate::error::{BoxError, ErrorInformation, ErrorType, LocatorError, LocatorResult, MultiError};
use crate::foundation::class::ServiceClass;
use crate::foundation::descriptor::Descriptor;
use crate::foundation::filter;
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{ServiceArc, TypeKey, downcast_view};
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;
use crate::locator::hooks::{
    DynamicConfigurationListener, ErrorService, HookKinds, InstanceLifecycleEvent, InstanceLifecycleListener,
    JustInTimeInjectionResolver, LifecycleEventType, ValidationService,
};
use crate::locator::system_descriptor::{Source, SystemDescriptor};
use crate::resolution::{INJECT, InjectionResolver, ResolverIndicators};

impl ServiceLocator {
    // =========================================================================
    // Error Reporting
    // =========================================================================

    /// Hands `errors` to every error service once, and marks them reported.
    pub(crate) fn report(
        &self,
        error_type: ErrorType,
        descriptor: Option<&SystemDescriptor>,
        injectee: Option<&Injectee>,
        mut errors: MultiError,
    ) -> MultiError {
        if errors.is_reported() {
            return errors;
        }
        debug!(locator = %self.name(), ?error_type, error = %errors, "Reporting failure");

        let services = self.hooks().error_services.clone();
        if !services.is_empty() {
            let info = ErrorInformation::new(
                error_type,
                descriptor.map(SystemDescriptor::to_descriptor),
                injectee.cloned(),
                errors.clone(),
            );
            for service in &services {
                if let Err(e) = service.on_failure(&info) {
                    if error_type == ErrorType::FailureToReify {
                        errors.push(LocatorError::configuration(format!("error service failed: {e}")));
                    } else {
                        warn!(locator = %self.name(), error = %e, "Error service failed");
                    }
                }
            }
        }
        errors.mark_reported();
        errors
    }

    // =========================================================================
    // Classes, Analyzers and Resolvers
    // =========================================================================

    pub(crate) fn load_class(&self, descriptor: &Descriptor) -> LocatorResult<Arc<ServiceClass>> {
        if let Some(loader) = &descriptor.loader {
            return loader.0.load_class(&descriptor.implementation).map_err(Into::into);
        }
        self.find_class(&descriptor.implementation)
            .ok_or_else(|| LocatorError::reification(&descriptor.implementation, "class not found").into())
    }

    fn find_class(&self, name: &str) -> Option<Arc<ServiceClass>> {
        if let Some(class) = self.classes.get(name) {
            return Some(class);
        }
        if let Some(loader) = &self.class_loader
            && let Ok(class) = loader.load_class(name)
        {
            return Some(class);
        }
        self.parent.as_ref()?.find_class(name)
    }

    fn named_hook<H: ?Sized + 'static>(&self, name: &str) -> LocatorResult<Option<Arc<H>>> {
        let filter = filter::contract_named(TypeKey::of::<H>().name(), name);
        match self.collect(&filter, self.id()).into_iter().next() {
            Some(descriptor) => self.root_handle(descriptor, None).service_as::<H>().map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn class_analyzer(&self, name: &str) -> LocatorResult<Arc<dyn ClassAnalyzer>> {
        if let Some(analyzer) = self.hooks().analyzers.get(name) {
            return Ok(analyzer.clone());
        }
        self.named_hook::<dyn ClassAnalyzer>(name)?
            .ok_or_else(|| LocatorError::configuration(format!("no class analyzer named '{name}'")).into())
    }

    fn injection_resolver(&self, annotation: &str) -> LocatorResult<Arc<dyn InjectionResolver>> {
        if let Some(resolver) = self.hooks().resolvers.get(annotation) {
            return Ok(resolver.clone());
        }
        self.named_hook::<dyn InjectionResolver>(annotation)?.ok_or_else(|| {
            LocatorError::configuration(format!("no injection resolver for annotation '{annotation}'")).into()
        })
    }

    pub(crate) fn resolver_indicators(&self, annotation: &str) -> Option<ResolverIndicators> {
        self.injection_resolver(annotation)
            .ok()
            .map(|resolver| ResolverIndicators::of(resolver.as_ref()))
    }

    pub(crate) fn resolve_injectee(&self, injectee: &Injectee, root: &ServiceHandle) -> LocatorResult<Injected> {
        if injectee.is_self() {
            return injectee
                .injectee_descriptor()
                .map(Injected::descriptor_value)
                .ok_or_else(|| LocatorError::illegal_state(format!("{injectee} has no owning descriptor")).into());
        }
        let annotation = injectee.point().annotation().unwrap_or(INJECT);
        self.injection_resolver(annotation)?.resolve(injectee, root)
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    pub(crate) fn context_for(&self, scope: &str) -> LocatorResult<Arc<dyn Context>> {
        if let Some(context) = self.contexts.read().get(scope) {
            return Ok(context.clone());
        }

        let filter = filter::contract_named(TypeKey::of::<dyn Context>().name(), scope);
        let descriptor = self
            .collect(&filter, self.id())
            .into_iter()
            .next()
            .ok_or_else(|| LocatorError::configuration(format!("no context is registered for scope {scope}")))?;
        descriptor.reify()?;
        if descriptor.scope() != scopes::SINGLETON {
            return Err(LocatorError::configuration(format!(
                "the context for scope {scope} must be a singleton, found {}",
                descriptor.scope()
            ))
            .into());
        }

        // Contexts are never proxied; the singleton context itself is a
        // constant, which ends the recursion through owner_context.
        let root = self.root_handle(descriptor.clone(), None);
        let raw = self.create_in_context(&descriptor, &root, true)?;
        let context = self.view_as::<dyn Context>(&descriptor, &raw)?;
        if !context.is_active() {
            return Err(LocatorError::illegal_state(format!("the context for scope {scope} is not active")).into());
        }
        self.contexts.write().insert(scope.to_string(), context.clone());
        Ok(context)
    }

    /// The context of `descriptor`'s scope in the locator that owns it.
    fn owner_context(&self, descriptor: &SystemDescriptor) -> LocatorResult<Arc<dyn Context>> {
        match descriptor.locator() {
            Some(owner) if owner.id() != self.id() => owner.context_for(descriptor.scope()),
            _ => self.context_for(descriptor.scope()),
        }
    }

    pub(crate) fn scope_info(&self, scope: &str) -> Option<ScopeInfo> {
        self.context_for(scope).ok().map(|context| context.scope())
    }

    pub(crate) fn context_contains(&self, descriptor: &SystemDescriptor) -> bool {
        descriptor.cached_value().is_some()
            || self
                .owner_context(descriptor)
                .is_ok_and(|context| context.contains_key(descriptor))
    }

    pub(crate) fn destroy_in_context(&self, descriptor: &SystemDescriptor) {
        match self.owner_context(descriptor) {
            Ok(context) => context.destroy_one(descriptor),
            Err(e) => warn!(descriptor = %descriptor, error = %e, "No context to destroy service in"),
        }
    }

    pub(crate) fn destroy_instance_in_context(&self, descriptor: &SystemDescriptor, instance: &ServiceArc) {
        match self.owner_context(descriptor) {
            Ok(context) => context.destroy_instance(descriptor, instance),
            Err(e) => warn!(descriptor = %descriptor, error = %e, "No context to destroy service in"),
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Whether `descriptor` is handed out as a lazy proxy when injected into
    /// `injectee`.
    fn should_proxy(&self, descriptor: &SystemDescriptor, injectee: Option<&Injectee>) -> bool {
        if descriptor.descriptor().proxiable == Some(false) {
            return false;
        }
        let info = self.scope_info(descriptor.scope());
        if info.as_ref().is_some_and(|i| i.unproxiable) {
            return false;
        }
        let proxiable = descriptor
            .descriptor()
            .proxiable
            .unwrap_or_else(|| info.as_ref().is_some_and(|i| i.proxiable));
        if !proxiable {
            return false;
        }
        let same_scope = descriptor
            .descriptor()
            .proxy_for_same_scope
            .unwrap_or_else(|| info.as_ref().is_none_or(|i| i.proxy_for_same_scope));
        if !same_scope
            && let Some(owner) = injectee.and_then(Injectee::injectee_descriptor)
            && owner.scope() == descriptor.scope()
        {
            return false;
        }
        true
    }

    /// Obtains the raw service for a dependency of `root`. The second value
    /// is the proxy when the raw service is one.
    pub(crate) fn obtain(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        injectee: Option<&Injectee>,
        root: &ServiceHandle,
    ) -> LocatorResult<(ServiceArc, Option<ProxyHandle>)> {
        self.obtain_with(descriptor, injectee, root, false)
    }

    /// Obtains the raw service `root` itself stands for.
    pub(crate) fn obtain_owned(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        injectee: Option<&Injectee>,
        root: &ServiceHandle,
    ) -> LocatorResult<(ServiceArc, Option<ProxyHandle>)> {
        self.obtain_with(descriptor, injectee, root, true)
    }

    fn obtain_with(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        injectee: Option<&Injectee>,
        root: &ServiceHandle,
        own: bool,
    ) -> LocatorResult<(ServiceArc, Option<ProxyHandle>)> {
        self.check_running()?;
        descriptor.reify()?;

        if self.should_proxy(descriptor, injectee) {
            let factory = self.proxy_factory().ok_or_else(|| {
                LocatorError::interception(
                    descriptor.implementation(),
                    "the service is proxiable but no proxy factory is available",
                )
            })?;
            let owner = descriptor
                .locator()
                .map(|l| Arc::downgrade(&l))
                .unwrap_or_else(|| self.weak());
            let proxy = factory
                .create_proxy(ProxySpec::lazy(descriptor.clone(), owner))
                .map_err(|e| LocatorError::interception(descriptor.implementation(), e))?;
            trace!(descriptor = %descriptor, "Handing out lazy proxy");
            return Ok((Arc::new(proxy.clone()), Some(proxy)));
        }

        let raw = self.create_in_context(descriptor, root, own)?;
        let proxy = raw.downcast_ref::<ProxyHandle>().cloned();
        Ok((raw, proxy))
    }

    /// Finds or creates the instance of `descriptor` in its context.
    ///
    /// Per-lookup instances become sub-handles of `root` unless `own` says
    /// `root` is the handle for this very instance.
    pub(crate) fn create_in_context(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        root: &ServiceHandle,
        own: bool,
    ) -> LocatorResult<ServiceArc> {
        self.check_running()?;
        if let Some(cached) = descriptor.cached_value() {
            return Ok(cached);
        }
        descriptor.reify()?;
        let context = self.owner_context(descriptor)?;
        let _entered = root.trace().enter(descriptor)?;

        if context.scope().name == scopes::PER_LOOKUP {
            let instance = context.find_or_create(descriptor, root)?;
            if !own {
                root.add_sub_handle(root.created(descriptor.clone(), instance.clone()));
            }
            return Ok(instance);
        }

        let entry_root = if own { root.clone() } else { root.child_root(descriptor) };
        context.find_or_create(descriptor, &entry_root)
    }

    pub(crate) fn proxy_target(&self, descriptor: &Arc<SystemDescriptor>) -> LocatorResult<ServiceArc> {
        let root = self.root_handle(descriptor.clone(), None);
        self.create_in_context(descriptor, &root, true)
    }

    pub(crate) fn view_as<C: ?Sized + 'static>(&self, descriptor: &SystemDescriptor, raw: &ServiceArc) -> LocatorResult<Arc<C>> {
        let view = descriptor.view(TypeKey::of::<C>(), raw)?;
        downcast_view::<C>(&view).ok_or_else(|| {
            LocatorError::illegal_argument(format!("{descriptor} cannot be viewed as {}", std::any::type_name::<C>()))
                .into()
        })
    }

    pub(crate) fn interception_for(&self, owner: &Arc<SystemDescriptor>, class: &ServiceClass) -> Interception {
        let mut interception = Interception::default();
        for service in self.hooks().interception.iter() {
            if service.descriptor_filter().matches(owner) {
                interception.merge(service.as_ref(), class);
            }
        }
        interception
    }

    pub(crate) fn notify_lifecycle(
        &self,
        event_type: LifecycleEventType,
        descriptor: &Arc<SystemDescriptor>,
        instance: Option<&ServiceArc>,
    ) {
        let hooks = self.hooks();
        if hooks.lifecycle.is_empty() {
            return;
        }
        let event = InstanceLifecycleEvent::new(event_type, descriptor, instance);
        for listener in hooks.lifecycle.iter() {
            if listener.filter().matches(descriptor) {
                listener.lifecycle_event(&event);
            }
        }
    }

    // =========================================================================
    // Hook Lists
    // =========================================================================

    /// Rebuilds the hook lists touched by a commit, then those of every
    /// child locator.
    pub(crate) fn reup(&self, kinds: HookKinds) {
        {
            let _reup = self.reup_lock.lock();
            if kinds.contexts {
                self.contexts.write().clear();
            }

            let mut next = (*self.hooks()).clone();
            if kinds.resolvers {
                next.resolvers = self.load_named_hooks::<dyn InjectionResolver>();
            }
            if kinds.analyzers {
                next.analyzers = self.load_named_hooks::<dyn ClassAnalyzer>();
            }
            *self.hooks.write() = Arc::new(next.clone());

            if kinds.error_services {
                next.error_services = self.load_hooks::<dyn ErrorService>(true);
            }
            if kinds.validation {
                next.validation = self.load_hooks::<dyn ValidationService>(true);
            }
            if kinds.jit {
                next.jit = self.load_hooks::<dyn JustInTimeInjectionResolver>(true);
            }
            if kinds.interception {
                next.interception = self.load_hooks::<dyn crate::aop::InterceptionService>(true);
            }
            if kinds.lifecycle {
                next.lifecycle = self.load_hooks::<dyn InstanceLifecycleListener>(true);
            }
            if kinds.listeners {
                next.listeners = self.load_hooks::<dyn DynamicConfigurationListener>(false);
            }
            *self.hooks.write() = Arc::new(next);
        }

        let inherited = HookKinds {
            listeners: false,
            ..kinds
        };
        if !inherited.any() {
            return;
        }
        let children: Vec<_> = self.children.lock().iter().filter_map(|c| c.upgrade()).collect();
        for child in children {
            child.reup(inherited);
        }
    }

    fn load_hooks<H: ?Sized + Send + Sync + 'static>(&self, include_parents: bool) -> Vec<Arc<H>> {
        let contract = filter::contract_of::<H>();
        let descriptors = if include_parents {
            self.collect(&contract, self.id())
        } else {
            self.local_descriptors(&contract)
        };
        descriptors
            .into_iter()
            .filter_map(|descriptor| self.load_hook::<H>(descriptor))
            .collect()
    }

    fn load_named_hooks<H: ?Sized + Send + Sync + 'static>(&self) -> HashMap<String, Arc<H>> {
        let mut hooks = HashMap::new();
        for descriptor in self.collect(&filter::contract_of::<H>(), self.id()) {
            let Some(name) = descriptor.name().map(str::to_string) else {
                continue;
            };
            if hooks.contains_key(&name) {
                continue;
            }
            if let Some(hook) = self.load_hook::<H>(descriptor) {
                hooks.insert(name, hook);
            }
        }
        hooks
    }

    fn load_hook<H: ?Sized + Send + Sync + 'static>(&self, descriptor: Arc<SystemDescriptor>) -> Option<Arc<H>> {
        let label = descriptor.to_string();
        match self.root_handle(descriptor, None).service_as::<H>() {
            Ok(hook) => Some(hook),
            Err(e) => {
                warn!(
                    descriptor = %label,
                    hook = std::any::type_name::<H>(),
                    error = %e,
                    "Failed to load hook service"
                );
                None
            }
        }
    }

    // =========================================================================
    // Unmanaged Creation
    // =========================================================================

    fn unmanaged(&self, class: &Arc<ServiceClass>) -> LocatorResult<(Arc<SystemDescriptor>, ClassCreator, ServiceHandle)> {
        self.check_running()?;
        let descriptor = SystemDescriptor::new(
            class.descriptor_builder().in_scope(scopes::PER_LOOKUP).build(),
            self.next_key(),
            self.weak(),
            Source::Class(class.clone()),
            None,
        );
        let analyzer = self.class_analyzer(DEFAULT_ANALYZER)?;
        let plan = InjectionPlan::analyze(analyzer.as_ref(), class)?;
        let creator = ClassCreator::new(self.weak(), Arc::downgrade(&descriptor), class.clone(), plan)?;
        let root = self.root_handle(descriptor.clone(), None);
        Ok((descriptor, creator, root))
    }

    /// Creates a fully injected instance of a class that is not registered.
    ///
    /// The returned value is the raw instance, or an intercepting proxy when
    /// method interceptors apply.
    pub fn create_and_initialize(&self, class: &Arc<ServiceClass>) -> LocatorResult<ServiceArc> {
        let (_descriptor, creator, root) = self.unmanaged(class)?;
        creator.create(&root)
    }

    /// Like [`create_and_initialize`](Self::create_and_initialize), returning
    /// the instance as `T`.
    pub fn create_and_initialize_as<T: Send + Sync + 'static>(&self, class: &Arc<ServiceClass>) -> LocatorResult<Arc<T>> {
        let raw = self.create_and_initialize(class)?;
        let typed = match raw.downcast_ref::<ProxyHandle>() {
            Some(proxy) => proxy.target_as::<T>(),
            None => raw.downcast::<T>().map_err(|_| -> BoxError { "instance has an unexpected type".into() }),
        };
        typed.map_err(|e| LocatorError::illegal_argument(format!("{}: {e}", class.name())).into())
    }

    /// Injects the fields and initializer methods of an existing instance.
    pub fn inject<T: Any + Send + Sync>(&self, target: &mut T, class: &Arc<ServiceClass>) -> LocatorResult<()> {
        let (_descriptor, creator, root) = self.unmanaged(class)?;
        creator.inject_into(target, &root)
    }

    /// Calls the post-construct method of an existing instance.
    pub fn post_construct<T: Any + Send + Sync>(&self, target: &mut T, class: &Arc<ServiceClass>) -> LocatorResult<()> {
        let (_descriptor, creator, _root) = self.unmanaged(class)?;
        creator.post_construct(target)
    }

    /// Calls the pre-destroy method of an existing instance.
    pub fn pre_destroy<T: Any + Send + Sync>(&self, target: &T, class: &Arc<ServiceClass>) -> LocatorResult<()> {
        let (_descriptor, creator, _root) = self.unmanaged(class)?;
        creator.pre_destroy(target)
    }
}
