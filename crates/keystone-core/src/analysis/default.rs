//! The default class analyzer.

use std::sync::Weak;

use crate::analysis::ClassAnalyzer;
use crate::error::{LocatorError, LocatorResult};
use crate::foundation::class::ServiceClass;
use crate::foundation::injectee::InjectionPoint;
use crate::locator::ServiceLocator;
use crate::resolution::ResolverIndicators;

/// Selection rules:
///
/// - Constructor: the single constructor marked injectable; else the single
///   constructor a custom resolver marks eligible; else the zero-argument
///   constructor.
/// - Fields: every field marked injectable, plus annotated fields whose
///   annotation has a registered resolver.
/// - Initializers: every method marked injectable, plus methods with a
///   parameter whose resolver is a method-parameter indicator. Methods with
///   an event-subscription parameter are never initializers.
/// - At most one post-construct and one pre-destroy method.
#[derive(Debug, Clone, Default)]
pub struct DefaultClassAnalyzer {
    locator: Weak<ServiceLocator>,
}

impl DefaultClassAnalyzer {
    /// Creates an analyzer that consults `locator` for custom resolvers.
    pub fn new(locator: Weak<ServiceLocator>) -> Self {
        Self { locator }
    }

    /// Creates an analyzer that knows no custom resolvers.
    pub fn standalone() -> Self {
        Self::default()
    }

    fn indicators(&self, point: &InjectionPoint) -> Option<ResolverIndicators> {
        let annotation = point.annotation()?;
        self.locator.upgrade()?.resolver_indicators(annotation)
    }
}

impl ClassAnalyzer for DefaultClassAnalyzer {
    fn constructor(&self, class: &ServiceClass) -> LocatorResult<usize> {
        let constructors = class.constructors();

        let marked: Vec<usize> = (0..constructors.len())
            .filter(|&i| constructors[i].is_inject())
            .collect();
        match marked.as_slice() {
            [only] => return Ok(*only),
            [] => {}
            _ => {
                return Err(LocatorError::analysis(
                    class.name(),
                    format!("{} constructors are marked injectable", marked.len()),
                )
                .into());
            }
        }

        let eligible: Vec<usize> = (0..constructors.len())
            .filter(|&i| {
                constructors[i]
                    .params()
                    .iter()
                    .any(|p| self.indicators(p).is_some_and(|r| r.constructor))
            })
            .collect();
        match eligible.as_slice() {
            [only] => return Ok(*only),
            [] => {}
            _ => {
                return Err(LocatorError::analysis(
                    class.name(),
                    format!("{} constructors are eligible through custom resolvers", eligible.len()),
                )
                .into());
            }
        }

        constructors
            .iter()
            .position(|c| c.params().is_empty())
            .ok_or_else(|| {
                LocatorError::analysis(
                    class.name(),
                    "no injectable constructor and no zero-argument constructor",
                )
                .into()
            })
    }

    fn initializer_methods(&self, class: &ServiceClass) -> LocatorResult<Vec<usize>> {
        Ok(class
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.params().iter().any(InjectionPoint::is_subscribe_to))
            .filter(|(_, m)| {
                m.is_inject()
                    || m
                        .params()
                        .iter()
                        .any(|p| self.indicators(p).is_some_and(|r| r.method))
            })
            .map(|(i, _)| i)
            .collect())
    }

    fn fields(&self, class: &ServiceClass) -> LocatorResult<Vec<usize>> {
        Ok(class
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_inject() || self.indicators(f.point()).is_some())
            .map(|(i, _)| i)
            .collect())
    }

    fn post_construct_method(&self, class: &ServiceClass) -> LocatorResult<Option<usize>> {
        single_lifecycle(class, class.post_construct_methods().len(), "post-construct")
    }

    fn pre_destroy_method(&self, class: &ServiceClass) -> LocatorResult<Option<usize>> {
        single_lifecycle(class, class.pre_destroy_methods().len(), "pre-destroy")
    }
}

fn single_lifecycle(class: &ServiceClass, count: usize, what: &str) -> LocatorResult<Option<usize>> {
    match count {
        0 => Ok(None),
        1 => Ok(Some(0)),
        n => Err(LocatorError::analysis(class.name(), format!("{n} {what} methods are declared")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::InjectionPlan;

    struct Wheel;
    struct Bike {
        _front: Option<std::sync::Arc<Wheel>>,
    }

    fn bare() -> Bike {
        Bike { _front: None }
    }

    #[test]
    fn test_prefers_inject_constructor() {
        let class = ServiceClass::builder::<Bike>()
            .default_constructor(bare)
            .inject_constructor(vec![InjectionPoint::of::<Wheel>()], |_| Ok(bare()))
            .build();
        assert_eq!(DefaultClassAnalyzer::standalone().constructor(&class).unwrap(), 1);
    }

    #[test]
    fn test_falls_back_to_zero_arg_constructor() {
        let class = ServiceClass::builder::<Bike>()
            .constructor(vec![InjectionPoint::of::<Wheel>()], |_| Ok(bare()))
            .default_constructor(bare)
            .build();
        assert_eq!(DefaultClassAnalyzer::standalone().constructor(&class).unwrap(), 1);
    }

    #[test]
    fn test_collects_every_structural_error() {
        let class = ServiceClass::builder::<Bike>()
            .inject_constructor(Vec::new(), |_| Ok(bare()))
            .inject_constructor(vec![InjectionPoint::of::<Wheel>()], |_| Ok(bare()))
            .post_construct("a", |_| Ok(()))
            .post_construct("b", |_| Ok(()))
            .pre_destroy("c", |_| Ok(()))
            .pre_destroy("d", |_| Ok(()))
            .build();

        let err = InjectionPlan::analyze(&DefaultClassAnalyzer::standalone(), &class).unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.any(|e| matches!(e, LocatorError::Analysis { .. })));
    }

    #[test]
    fn test_no_usable_constructor() {
        let class = ServiceClass::builder::<Bike>()
            .constructor(vec![InjectionPoint::of::<Wheel>()], |_| Ok(bare()))
            .build();
        assert!(DefaultClassAnalyzer::standalone().constructor(&class).is_err());
    }

    #[test]
    fn test_members_and_subscriptions() {
        let class = ServiceClass::builder::<Bike>()
            .default_constructor(bare)
            .field("front", InjectionPoint::of::<Wheel>(), |_, _| Ok(()))
            .annotated_field("rear", InjectionPoint::of::<Wheel>().annotated("Spare"), |_, _| Ok(()))
            .initializer("mount", vec![InjectionPoint::of::<Wheel>()], |_, _| Ok(()))
            .initializer("on_event", vec![InjectionPoint::of::<Wheel>().subscribe_to()], |_, _| Ok(()))
            .method("helper", vec![InjectionPoint::of::<Wheel>()], |_, _| Ok(()))
            .post_construct("ready", |_| Ok(()))
            .build();

        let plan = InjectionPlan::analyze(&DefaultClassAnalyzer::standalone(), &class).unwrap();
        assert_eq!(plan.constructor, 0);
        assert_eq!(plan.fields, vec![0]);
        assert_eq!(plan.initializers, vec![0]);
        assert_eq!(plan.post_construct, Some(0));
        assert_eq!(plan.pre_destroy, None);
    }
}
