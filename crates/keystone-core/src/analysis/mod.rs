//! Injection-point discovery.
//!
//! A [`ClassAnalyzer`] picks, for one [`ServiceClass`], the constructor to
//! call, the fields and initializer methods to inject, and the lifecycle
//! methods. [`InjectionPlan::analyze`] runs every step and fails once with
//! all structural problems it found.
//!
//! Analyzers are services advertising `dyn ClassAnalyzer` under a name.
//! Descriptors pick one with
//! [`analyze_with`](crate::foundation::descriptor::DescriptorBuilder::analyze_with);
//! the rest use [`DEFAULT_ANALYZER`].

pub mod default;

use crate::error::{Collector, LocatorError, LocatorResult};
use crate::foundation::class::ServiceClass;

/// Name of the analyzer every locator registers.
pub const DEFAULT_ANALYZER: &str = "default";

/// Discovers the injection plan of a class. Results are member indices.
pub trait ClassAnalyzer: Send + Sync {
    /// Returns the index of the constructor to use.
    fn constructor(&self, class: &ServiceClass) -> LocatorResult<usize>;

    /// Returns the indices of the initializer methods.
    fn initializer_methods(&self, class: &ServiceClass) -> LocatorResult<Vec<usize>>;

    /// Returns the indices of the fields to inject.
    fn fields(&self, class: &ServiceClass) -> LocatorResult<Vec<usize>>;

    /// Returns the index of the post-construct method.
    fn post_construct_method(&self, class: &ServiceClass) -> LocatorResult<Option<usize>>;

    /// Returns the index of the pre-destroy method.
    fn pre_destroy_method(&self, class: &ServiceClass) -> LocatorResult<Option<usize>>;
}

/// The complete, consistent result of analyzing one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    /// Constructor index.
    pub constructor: usize,
    /// Field indices.
    pub fields: Vec<usize>,
    /// Initializer method indices.
    pub initializers: Vec<usize>,
    /// Post-construct method index.
    pub post_construct: Option<usize>,
    /// Pre-destroy method index.
    pub pre_destroy: Option<usize>,
}

impl InjectionPlan {
    /// Runs every analysis step, collecting all failures.
    pub fn analyze(analyzer: &dyn ClassAnalyzer, class: &ServiceClass) -> LocatorResult<Self> {
        let mut collector = Collector::new();
        let constructor = record(&mut collector, analyzer.constructor(class));
        let fields = record(&mut collector, analyzer.fields(class));
        let initializers = record(&mut collector, analyzer.initializer_methods(class));
        let post_construct = record(&mut collector, analyzer.post_construct_method(class));
        let pre_destroy = record(&mut collector, analyzer.pre_destroy_method(class));
        collector.throw_if_errors()?;

        match (constructor, fields, initializers, post_construct, pre_destroy) {
            (Some(constructor), Some(fields), Some(initializers), Some(post_construct), Some(pre_destroy)) => {
                Ok(Self {
                    constructor,
                    fields,
                    initializers,
                    post_construct,
                    pre_destroy,
                })
            }
            _ => Err(LocatorError::analysis(class.name(), "analysis did not complete").into()),
        }
    }
}

fn record<T>(collector: &mut Collector, result: LocatorResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(errors) => {
            collector.add_all(errors);
            None
        }
    }
}
