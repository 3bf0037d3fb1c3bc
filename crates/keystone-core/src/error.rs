//! Error types for the Keystone locator core.
//!
//! Every failure the locator can raise is a [`LocatorError`]. Public
//! operations never return a bare `LocatorError`; they return a
//! [`MultiError`], an aggregate that can carry several causes at once, so a
//! single failed construction reports every unsatisfied dependency instead of
//! the first one only. Aggregates are always flat: adding one `MultiError` to
//! another moves its causes, it never nests.
//!
//! [`Collector`] is the accumulate-then-fail helper used by the analyzer,
//! the creators and reification.

use std::fmt;

use thiserror::Error;

use crate::foundation::descriptor::Descriptor;
use crate::foundation::injectee::Injectee;

/// Boxed error returned by user-supplied callbacks (constructors, factories,
/// interceptors, hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for locator operations.
pub type LocatorResult<T> = Result<T, MultiError>;

// =============================================================================
// Creation Phases
// =============================================================================

/// The step of a service's life during which a failure happened.
///
/// Used as the location tag attached to creation and destruction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreationPhase {
    /// Resolving the injectees of a class.
    Resolve,
    /// Invoking the constructor.
    Create,
    /// Injecting fields.
    FieldInject,
    /// Invoking initializer methods.
    MethodInject,
    /// Invoking the post-construct method.
    PostConstruct,
    /// Invoking the pre-destroy method.
    PreDestroy,
    /// Calling a factory's provide method.
    Provide,
    /// Calling a factory's dispose method.
    Dispose,
}

impl CreationPhase {
    /// Returns the tag used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Create => "create",
            Self::FieldInject => "field inject",
            Self::MethodInject => "method inject",
            Self::PostConstruct => "post construct",
            Self::PreDestroy => "pre destroy",
            Self::Provide => "provide",
            Self::Dispose => "dispose",
        }
    }
}

impl fmt::Display for CreationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Locator Errors
// =============================================================================

/// A single failure raised by the locator.
#[derive(Debug, Clone, Error)]
pub enum LocatorError {
    /// Class loading, contract resolution or analysis failed.
    #[error("unable to reify {implementation}: {reason}")]
    Reification {
        /// Implementation identifier of the descriptor.
        implementation: String,
        /// Reason for failure.
        reason: String,
    },

    /// A required injection point had no matching descriptor.
    #[error("there was no object available for injection at {injectee}")]
    UnsatisfiedDependency {
        /// Rendered injection point.
        injectee: String,
        /// Required contract name.
        required: String,
    },

    /// Self-referential creation was detected.
    #[error("a circular dependency involving {descriptor} was found: {path}")]
    CircularDependency {
        /// The descriptor that was re-entered.
        descriptor: String,
        /// The creation path that led back to it.
        path: String,
    },

    /// An idempotent filter matched a descriptor already in the registry.
    #[error("a descriptor matching an idempotent filter already exists: {}", .descriptor.implementation)]
    DuplicateService {
        /// The existing descriptor that matched.
        descriptor: Box<Descriptor>,
    },

    /// A constructor, factory, injection or lifecycle callback failed.
    #[error("{phase} failed for {implementation}: {reason}")]
    Construction {
        /// Where the failure happened.
        phase: CreationPhase,
        /// Implementation identifier.
        implementation: String,
        /// Reason for failure.
        reason: String,
    },

    /// A pre-destroy or dispose call failed.
    #[error("failed to destroy {implementation}: {reason}")]
    Destruction {
        /// Implementation identifier.
        implementation: String,
        /// Reason for failure.
        reason: String,
    },

    /// Interception or proxying was requested but could not be set up.
    #[error("interception failed for {implementation}: {reason}")]
    Interception {
        /// Implementation identifier.
        implementation: String,
        /// Reason for failure.
        reason: String,
    },

    /// Location tag appended to an aggregate describing a failed creation.
    #[error("unable to perform operation: {phase} on {implementation}")]
    CreationFailed {
        /// The phase that failed.
        phase: CreationPhase,
        /// Implementation identifier.
        implementation: String,
    },

    /// A class is structurally invalid for injection.
    #[error("class {class} is not injectable: {reason}")]
    Analysis {
        /// Class name.
        class: String,
        /// Reason for failure.
        reason: String,
    },

    /// A commit was rejected by a two-phase resource.
    #[error("dynamic configuration failed: {0}")]
    DynamicConfiguration(String),

    /// The locator is misconfigured (missing context, bad scope, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was attempted in the wrong state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An argument was rejected.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The locator has been shut down.
    #[error("locator '{0}' has been shut down")]
    Shutdown(String),
}

impl LocatorError {
    /// Creates a reification error.
    pub fn reification(implementation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reification {
            implementation: implementation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a construction error from a user callback failure.
    pub fn construction(
        phase: CreationPhase,
        implementation: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::Construction {
            phase,
            implementation: implementation.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a destruction error.
    pub fn destruction(implementation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Destruction {
            implementation: implementation.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an interception error.
    pub fn interception(implementation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Interception {
            implementation: implementation.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a structural analysis error.
    pub fn analysis(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Analysis {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an illegal-state error.
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Creates an illegal-argument error.
    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    /// Creates an unsatisfied-dependency error for an injection point.
    pub fn unsatisfied(injectee: &Injectee) -> Self {
        Self::UnsatisfiedDependency {
            injectee: injectee.to_string(),
            required: injectee.required_type().name().to_string(),
        }
    }

    /// Returns `true` for unsatisfied-dependency errors.
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::UnsatisfiedDependency { .. })
    }

    /// Returns `true` for circular-dependency errors.
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    /// Returns `true` for duplicate-service errors.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateService { .. })
    }
}

// =============================================================================
// Aggregate Error
// =============================================================================

/// An aggregate of one or more [`LocatorError`]s.
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    errors: Vec<LocatorError>,
    reported: bool,
}

impl MultiError {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single cause.
    pub fn push(&mut self, error: LocatorError) {
        self.errors.push(error);
    }

    /// Moves every cause of `other` into this aggregate.
    ///
    /// Only the causes move. Whether this aggregate was reported is
    /// unchanged, so a failure built from reported causes is still
    /// reported in its own right.
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    /// Returns the causes in the order they were added.
    pub fn errors(&self) -> &[LocatorError] {
        &self.errors
    }

    /// Consumes the aggregate and returns its causes.
    pub fn into_errors(self) -> Vec<LocatorError> {
        self.errors
    }

    /// Returns the number of causes.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if the aggregate holds no causes.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Counts the causes matching a predicate.
    pub fn count(&self, predicate: impl Fn(&LocatorError) -> bool) -> usize {
        self.errors.iter().filter(|e| predicate(e)).count()
    }

    /// Returns `true` if any cause matches a predicate.
    pub fn any(&self, predicate: impl Fn(&LocatorError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }

    /// Whether the aggregate has already been handed to the error services.
    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub(crate) fn mark_reported(&mut self) {
        self.reported = true;
    }
}

impl From<LocatorError> for MultiError {
    fn from(error: LocatorError) -> Self {
        Self {
            errors: vec![error],
            reported: false,
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no errors"),
            [only] => write!(f, "{only}"),
            all => {
                write!(f, "{} errors occurred:", all.len())?;
                for (i, error) in all.iter().enumerate() {
                    write!(f, "\n  {}. {error}", i + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

// =============================================================================
// Collector
// =============================================================================

/// Accumulates failures and turns them into a single [`MultiError`].
#[derive(Debug, Default)]
pub struct Collector {
    errors: Option<MultiError>,
}

impl Collector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure.
    pub fn add(&mut self, error: LocatorError) {
        self.errors.get_or_insert_with(MultiError::new).push(error);
    }

    /// Records every failure of an aggregate.
    pub fn add_all(&mut self, errors: MultiError) {
        self.errors.get_or_insert_with(MultiError::new).extend(errors);
    }

    /// Returns `true` once anything has been recorded.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Returns `Err` with everything collected so far and resets the
    /// collector, or `Ok` if nothing was recorded.
    pub fn throw_if_errors(&mut self) -> LocatorResult<()> {
        match self.errors.take() {
            Some(errors) if !errors.is_empty() => Err(errors),
            _ => Ok(()),
        }
    }

    /// Consumes the collector, returning `value` if nothing was recorded.
    pub fn into_result<T>(mut self, value: T) -> LocatorResult<T> {
        self.throw_if_errors().map(|()| value)
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// The category of a failure handed to an error service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// A descriptor could not be reified.
    FailureToReify,
    /// A dynamic configuration commit failed.
    DynamicConfigurationFailure,
    /// A service could not be created.
    ServiceCreationFailure,
    /// A service could not be destroyed.
    ServiceDestructionFailure,
    /// A validator raised an error.
    ValidateFailure,
}

/// Everything an error service is told about a failure.
#[derive(Debug, Clone)]
pub struct ErrorInformation {
    error_type: ErrorType,
    descriptor: Option<Descriptor>,
    injectee: Option<Injectee>,
    error: MultiError,
}

impl ErrorInformation {
    /// Creates error information.
    pub fn new(
        error_type: ErrorType,
        descriptor: Option<Descriptor>,
        injectee: Option<Injectee>,
        error: MultiError,
    ) -> Self {
        Self {
            error_type,
            descriptor,
            injectee,
            error,
        }
    }

    /// Returns the failure category.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Returns the descriptor involved, if any.
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    /// Returns the injection point involved, if any.
    pub fn injectee(&self) -> Option<&Injectee> {
        self.injectee.as_ref()
    }

    /// Returns the aggregate error.
    pub fn error(&self) -> &MultiError {
        &self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_flattens() {
        let mut outer = MultiError::from(LocatorError::illegal_state("a"));
        let mut inner = MultiError::new();
        inner.push(LocatorError::illegal_argument("b"));
        inner.push(LocatorError::configuration("c"));
        outer.extend(inner);

        assert_eq!(outer.len(), 3);
        assert!(matches!(outer.errors()[2], LocatorError::Configuration(_)));
    }

    #[test]
    fn test_extend_keeps_own_reported_state() {
        let mut cause = MultiError::from(LocatorError::illegal_state("inner"));
        cause.mark_reported();

        let mut outer = MultiError::new();
        outer.extend(cause);
        assert!(!outer.is_reported());
        assert_eq!(outer.len(), 1);
    }

    #[test]
    fn test_collector_throw_if_errors_resets() {
        let mut collector = Collector::new();
        assert!(collector.throw_if_errors().is_ok());

        collector.add(LocatorError::illegal_state("first"));
        collector.add(LocatorError::illegal_state("second"));
        let err = collector.throw_if_errors().unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(!collector.has_errors());
    }

    #[test]
    fn test_display_single_and_many() {
        let single = MultiError::from(LocatorError::Shutdown("root".into()));
        assert_eq!(single.to_string(), "locator 'root' has been shut down");

        let mut many = single.clone();
        many.push(LocatorError::illegal_argument("bad"));
        let rendered = many.to_string();
        assert!(rendered.starts_with("2 errors occurred:"));
        assert!(rendered.contains("2. illegal argument: bad"));
    }

    #[test]
    fn test_phase_tags() {
        assert_eq!(CreationPhase::FieldInject.to_string(), "field inject");
        assert_eq!(CreationPhase::PostConstruct.as_str(), "post construct");
    }
}
