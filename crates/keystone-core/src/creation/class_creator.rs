//! Class-based creation.
//!
//! Creation runs in fixed steps, each tagged with a [`CreationPhase`] in the
//! error it raises:
//!
//! 1. resolve every constructor, field and initializer injectee, aggregating
//!    all failures;
//! 2. construct, through the constructor interceptor chain if one applies;
//! 3. inject fields, then call initializer methods;
//! 4. call the post-construct method;
//! 5. share the instance, wrapping it in an intercepting proxy when method
//!    interceptors apply.
//!
//! The instance only becomes visible to anyone once every step succeeded.

use std::any::Any;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::analysis::InjectionPlan;
use crate::aop::proxy::{ProxyHandle, ProxySpec};
use crate::aop::{ConstructorInvocation, Interception};
use crate::creation::Creator;
use crate::creation::injected::{Injected, InjectionArgs};
use crate::error::{Collector, CreationPhase, LocatorError, LocatorResult, MultiError};
use crate::foundation::class::{RawInstance, ServiceClass};
use crate::foundation::injectee::{Injectee, InjecteeParent};
use crate::foundation::types::ServiceArc;
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;
use crate::locator::hooks::LifecycleEventType;
use crate::locator::system_descriptor::SystemDescriptor;

/// Creates instances of a [`ServiceClass`] following its injection plan.
pub struct ClassCreator {
    locator: Weak<ServiceLocator>,
    owner: Weak<SystemDescriptor>,
    class: Arc<ServiceClass>,
    plan: InjectionPlan,
    constructor: Vec<Injectee>,
    fields: Vec<(usize, Injectee)>,
    methods: Vec<(usize, Vec<Injectee>)>,
}

struct Resolved {
    constructor: InjectionArgs,
    fields: Vec<(usize, Injected)>,
    methods: Vec<(usize, InjectionArgs)>,
}

impl ClassCreator {
    pub(crate) fn new(
        locator: Weak<ServiceLocator>,
        owner: Weak<SystemDescriptor>,
        class: Arc<ServiceClass>,
        plan: InjectionPlan,
    ) -> LocatorResult<Self> {
        let declaring = class.name().to_string();
        let constructor_info = class.constructors().get(plan.constructor).ok_or_else(|| {
            LocatorError::analysis(&declaring, format!("constructor {} does not exist", plan.constructor))
        })?;

        let constructor = constructor_info
            .params()
            .iter()
            .enumerate()
            .map(|(i, point)| {
                Injectee::new(point.clone(), i as i32, InjecteeParent::Constructor, &declaring)
                    .with_owner(owner.clone())
            })
            .collect();

        let mut fields = Vec::with_capacity(plan.fields.len());
        for &index in &plan.fields {
            let field = class.fields().get(index).ok_or_else(|| {
                LocatorError::analysis(&declaring, format!("field {index} does not exist"))
            })?;
            let injectee = Injectee::new(
                field.point().clone(),
                -1,
                InjecteeParent::Field(field.name().to_string()),
                &declaring,
            )
            .with_owner(owner.clone());
            fields.push((index, injectee));
        }

        let mut methods = Vec::with_capacity(plan.initializers.len());
        for &index in &plan.initializers {
            let method = class.methods().get(index).ok_or_else(|| {
                LocatorError::analysis(&declaring, format!("method {index} does not exist"))
            })?;
            let injectees = method
                .params()
                .iter()
                .enumerate()
                .map(|(i, point)| {
                    Injectee::new(
                        point.clone(),
                        i as i32,
                        InjecteeParent::Method(method.name().to_string()),
                        &declaring,
                    )
                    .with_owner(owner.clone())
                })
                .collect();
            methods.push((index, injectees));
        }

        Ok(Self {
            locator,
            owner,
            class,
            plan,
            constructor,
            fields,
            methods,
        })
    }

    /// Returns the class this creator instantiates.
    pub fn class(&self) -> &Arc<ServiceClass> {
        &self.class
    }

    /// Returns the injection plan.
    pub fn plan(&self) -> &InjectionPlan {
        &self.plan
    }

    fn locator(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state("locator has been dropped").into())
    }

    /// Wraps `errors` in a new, unreported failure of this creation.
    fn fail(&self, phase: CreationPhase, errors: MultiError) -> MultiError {
        let mut failed = MultiError::new();
        failed.extend(errors);
        failed.push(LocatorError::CreationFailed {
            phase,
            implementation: self.class.name().to_string(),
        });
        failed
    }

    fn callback_failure(&self, phase: CreationPhase, reason: impl std::fmt::Display) -> MultiError {
        self.fail(
            phase,
            LocatorError::construction(phase, self.class.name(), reason).into(),
        )
    }

    fn resolve(
        &self,
        locator: &ServiceLocator,
        root: &ServiceHandle,
        with_constructor: bool,
    ) -> LocatorResult<Resolved> {
        let mut collector = Collector::new();
        let mut resolve_one = |injectee: &Injectee| match locator.resolve_injectee(injectee, root) {
            Ok(value) => value,
            Err(errors) => {
                collector.add_all(errors);
                Injected::absent()
            }
        };

        let constructor = if with_constructor {
            InjectionArgs::new(self.constructor.iter().map(&mut resolve_one).collect())
        } else {
            InjectionArgs::default()
        };
        let fields = self
            .fields
            .iter()
            .map(|(index, injectee)| (*index, resolve_one(injectee)))
            .collect();
        let methods = self
            .methods
            .iter()
            .map(|(index, injectees)| {
                (*index, InjectionArgs::new(injectees.iter().map(&mut resolve_one).collect()))
            })
            .collect();

        collector
            .into_result(Resolved {
                constructor,
                fields,
                methods,
            })
            .map_err(|e| self.fail(CreationPhase::Resolve, e))
    }

    fn construct(&self, interception: &Interception, args: &InjectionArgs) -> LocatorResult<RawInstance> {
        let constructor = &self.class.constructors()[self.plan.constructor];
        let result = if interception.constructor.is_empty() {
            constructor.construct(args)
        } else {
            ConstructorInvocation::new(&self.class, constructor, args, &interception.constructor).proceed()
        };
        result.map_err(|e| self.callback_failure(CreationPhase::Create, e))
    }

    fn initialize(&self, target: &mut (dyn Any + Send + Sync), resolved: &Resolved) -> LocatorResult<()> {
        for (index, value) in &resolved.fields {
            let field = &self.class.fields()[*index];
            field
                .set(target, value)
                .map_err(|e| self.callback_failure(CreationPhase::FieldInject, format!("{}: {e}", field.name())))?;
        }
        for (index, args) in &resolved.methods {
            let method = &self.class.methods()[*index];
            method
                .invoke(target, args)
                .map_err(|e| self.callback_failure(CreationPhase::MethodInject, format!("{}: {e}", method.name())))?;
        }
        Ok(())
    }

    pub(crate) fn post_construct(&self, target: &mut (dyn Any + Send + Sync)) -> LocatorResult<()> {
        match self.plan.post_construct {
            Some(index) => self.class.post_construct_methods()[index]
                .call(target)
                .map_err(|e| self.callback_failure(CreationPhase::PostConstruct, e)),
            None => Ok(()),
        }
    }

    pub(crate) fn pre_destroy(&self, target: &(dyn Any + Send + Sync)) -> LocatorResult<()> {
        match self.plan.pre_destroy {
            Some(index) => self.class.pre_destroy_methods()[index]
                .call(target)
                .map_err(|e| LocatorError::destruction(self.class.name(), e).into()),
            None => Ok(()),
        }
    }

    /// Injects fields and initializer methods into an existing value.
    pub(crate) fn inject_into(&self, target: &mut (dyn Any + Send + Sync), root: &ServiceHandle) -> LocatorResult<()> {
        let locator = self.locator()?;
        let resolved = self.resolve(&locator, root, false)?;
        self.initialize(target, &resolved)
    }

    fn produce(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        let locator = self.locator()?;
        let owner = self.owner.upgrade();

        let resolved = self.resolve(&locator, root, true)?;

        let interception = match &owner {
            Some(owner) => locator.interception_for(owner, &self.class),
            None => Interception::default(),
        };
        if let Some(owner) = &owner {
            locator.notify_lifecycle(LifecycleEventType::PreProduction, owner, None);
        }

        trace!(class = %self.class.name(), "Constructing");
        let mut raw = self.construct(&interception, &resolved.constructor)?;
        self.initialize(raw.as_mut(), &resolved)?;
        self.post_construct(raw.as_mut())?;

        let mut instance: ServiceArc = Arc::from(raw);
        if interception.intercepts_methods() {
            let owner = owner.clone().ok_or_else(|| {
                LocatorError::interception(self.class.name(), "intercepted instance has no descriptor")
            })?;
            let factory = locator.proxy_factory().ok_or_else(|| {
                self.fail(
                    CreationPhase::Create,
                    LocatorError::interception(self.class.name(), "no proxy factory is available").into(),
                )
            })?;
            let spec = ProxySpec::intercepted(owner, self.class.clone(), instance, interception.methods);
            let proxy = factory.create_proxy(spec).map_err(|e| {
                self.fail(
                    CreationPhase::Create,
                    LocatorError::interception(self.class.name(), e).into(),
                )
            })?;
            instance = Arc::new(proxy);
        }

        if let Some(owner) = &owner {
            locator.notify_lifecycle(LifecycleEventType::PostProduction, owner, Some(&instance));
        }
        Ok(instance)
    }
}

impl Creator for ClassCreator {
    fn injectees(&self) -> Vec<Injectee> {
        let mut all = self.constructor.clone();
        all.extend(self.fields.iter().map(|(_, injectee)| injectee.clone()));
        all.extend(self.methods.iter().flat_map(|(_, injectees)| injectees.iter().cloned()));
        all
    }

    fn create(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        // Per-lookup dependencies of a failed creation die with it.
        let mark = root.sub_handle_mark();
        let result = self.produce(root);
        if result.is_err() {
            root.release_sub_handles_since(mark);
        }
        result
    }

    fn dispose(&self, instance: &ServiceArc) -> LocatorResult<()> {
        if let (Some(locator), Some(owner)) = (self.locator.upgrade(), self.owner.upgrade()) {
            locator.notify_lifecycle(LifecycleEventType::PreDestruction, &owner, Some(instance));
        }

        match instance.downcast_ref::<ProxyHandle>() {
            Some(proxy) => {
                let target = proxy.target()?;
                self.pre_destroy(&*target)
            }
            None => self.pre_destroy(&**instance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ClassAnalyzer;
    use crate::analysis::default::DefaultClassAnalyzer;
    use crate::foundation::injectee::InjectionPoint;

    struct Wheel;
    struct Cart;

    #[test]
    fn test_injectees_in_resolution_order() {
        let class = ServiceClass::builder::<Cart>()
            .inject_constructor(vec![InjectionPoint::of::<Wheel>(), InjectionPoint::of::<Wheel>()], |_| {
                Ok(Cart)
            })
            .field("spare", InjectionPoint::optional_of::<Wheel>(), |_, _| Ok(()))
            .initializer("mount", vec![InjectionPoint::of::<Wheel>().named("front")], |_, _| Ok(()))
            .build();
        let analyzer = DefaultClassAnalyzer::standalone();
        let plan = InjectionPlan::analyze(&analyzer as &dyn ClassAnalyzer, &class).unwrap();
        let creator = ClassCreator::new(Weak::new(), Weak::new(), class, plan).unwrap();

        let injectees = creator.injectees();
        assert_eq!(injectees.len(), 4);
        assert_eq!(injectees[1].position(), 1);
        assert_eq!(injectees[2].position(), -1);
        assert!(injectees[2].is_optional());
        assert_eq!(injectees[3].parent(), &InjecteeParent::Method("mount".into()));
        assert_eq!(injectees[3].point().name(), Some("front"));
    }
}
