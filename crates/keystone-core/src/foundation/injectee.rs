//! Injection points.
//!
//! An [`InjectionPoint`] is the declarative half: what a constructor
//! parameter, field or initializer parameter asks for. An [`Injectee`] is the
//! reified half: the same point placed on a concrete element of a class and
//! linked back to the descriptor that owns it.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::foundation::types::{Qualifier, TypeKey};
use crate::locator::system_descriptor::SystemDescriptor;

/// How the value of an injection point is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjecteeKind {
    /// The service itself.
    Direct,
    /// The service, or nothing if no descriptor matches.
    Optional,
    /// A provider that looks the service up on each access.
    Provider,
    /// A provider over every matching service.
    IterableProvider,
}

/// Restriction on the qualifiers a matching service may carry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unqualified {
    excluded: Vec<String>,
}

impl Unqualified {
    /// Matches only services that carry no qualifiers at all.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches services that carry none of the listed qualifiers.
    pub fn excluding<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the excluded qualifier names.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Returns `true` if a service carrying `qualifiers` is acceptable.
    pub fn permits(&self, qualifiers: &[Qualifier]) -> bool {
        if self.excluded.is_empty() {
            return qualifiers.is_empty();
        }
        !qualifiers
            .iter()
            .any(|q| self.excluded.iter().any(|name| name == q.name()))
    }
}

// =============================================================================
// InjectionPoint
// =============================================================================

/// What one constructor parameter, field or method parameter requires.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionPoint {
    required: TypeKey,
    kind: InjecteeKind,
    qualifiers: Vec<Qualifier>,
    optional: bool,
    self_descriptor: bool,
    unqualified: Option<Unqualified>,
    annotation: Option<String>,
    subscribe_to: bool,
}

impl InjectionPoint {
    fn with_kind(required: TypeKey, kind: InjecteeKind) -> Self {
        Self {
            required,
            kind,
            qualifiers: Vec::new(),
            optional: false,
            self_descriptor: false,
            unqualified: None,
            annotation: None,
            subscribe_to: false,
        }
    }

    /// Requires the service `C`.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self::with_kind(TypeKey::of::<C>(), InjecteeKind::Direct)
    }

    /// Requires `C` if one is available.
    pub fn optional_of<C: ?Sized + 'static>() -> Self {
        Self::with_kind(TypeKey::of::<C>(), InjecteeKind::Optional)
    }

    /// Requires a provider of `C`.
    pub fn provider_of<C: ?Sized + 'static>() -> Self {
        Self::with_kind(TypeKey::of::<C>(), InjecteeKind::Provider)
    }

    /// Requires an iterable provider of every `C`.
    pub fn iterable_of<C: ?Sized + 'static>() -> Self {
        Self::with_kind(TypeKey::of::<C>(), InjecteeKind::IterableProvider)
    }

    /// Requires the descriptor of the service being constructed.
    pub fn self_descriptor() -> Self {
        let mut point = Self::with_kind(TypeKey::of::<SystemDescriptor>(), InjecteeKind::Direct);
        point.self_descriptor = true;
        point
    }

    /// Adds a `Named` qualifier.
    pub fn named(self, name: impl Into<String>) -> Self {
        self.qualified_by(Qualifier::named(name))
    }

    /// Adds a required qualifier.
    pub fn qualified_by(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Marks the point optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Restricts which qualifiers a matching service may carry.
    pub fn unqualified(mut self, restriction: Unqualified) -> Self {
        self.unqualified = Some(restriction);
        self
    }

    /// Routes resolution to the injection resolver registered for
    /// `annotation`.
    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    /// Marks the parameter as an event-subscription sink.
    pub fn subscribe_to(mut self) -> Self {
        self.subscribe_to = true;
        self
    }

    pub(crate) fn retyped(&self, required: TypeKey) -> Self {
        Self {
            required,
            ..self.clone()
        }
    }

    /// Returns the required contract (the element type for providers).
    pub fn required_type(&self) -> TypeKey {
        self.required
    }

    /// Returns the delivery kind.
    pub fn kind(&self) -> InjecteeKind {
        self.kind
    }

    /// Returns the required qualifiers.
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    /// Returns `true` if a missing service resolves to nothing.
    pub fn is_optional(&self) -> bool {
        self.optional || self.kind == InjecteeKind::Optional
    }

    /// Returns `true` if the point injects its owner's descriptor.
    pub fn is_self(&self) -> bool {
        self.self_descriptor
    }

    /// Returns the unqualified restriction.
    pub fn unqualified_restriction(&self) -> Option<&Unqualified> {
        self.unqualified.as_ref()
    }

    /// Returns the custom injection annotation, if any.
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    /// Returns `true` for event-subscription sinks.
    pub fn is_subscribe_to(&self) -> bool {
        self.subscribe_to
    }

    /// Returns the value of the `Named` qualifier, if any.
    pub fn name(&self) -> Option<&str> {
        self.qualifiers
            .iter()
            .find(|q| q.is_named())
            .and_then(Qualifier::value)
    }
}

// =============================================================================
// Injectee
// =============================================================================

/// The element an injectee belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjecteeParent {
    /// A constructor parameter.
    Constructor,
    /// A field, by name.
    Field(String),
    /// A method parameter, by method name.
    Method(String),
    /// A programmatic lookup with no declaring element.
    Lookup,
}

impl fmt::Display for InjecteeParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructor => f.write_str("<init>"),
            Self::Field(name) | Self::Method(name) => f.write_str(name),
            Self::Lookup => f.write_str("<lookup>"),
        }
    }
}

/// A reified injection point.
#[derive(Clone)]
pub struct Injectee {
    point: InjectionPoint,
    position: i32,
    parent: InjecteeParent,
    declaring_class: String,
    owner: Weak<SystemDescriptor>,
}

impl Injectee {
    /// Creates an injectee; `position` is `-1` for fields.
    pub fn new(
        point: InjectionPoint,
        position: i32,
        parent: InjecteeParent,
        declaring_class: impl Into<String>,
    ) -> Self {
        Self {
            point,
            position,
            parent,
            declaring_class: declaring_class.into(),
            owner: Weak::new(),
        }
    }

    /// Creates an injectee for a programmatic lookup.
    pub fn for_lookup(point: InjectionPoint) -> Self {
        Self::new(point, -1, InjecteeParent::Lookup, "")
    }

    pub(crate) fn with_owner(mut self, owner: Weak<SystemDescriptor>) -> Self {
        self.owner = owner;
        self
    }

    pub(crate) fn with_point(&self, point: InjectionPoint) -> Self {
        Self {
            point,
            ..self.clone()
        }
    }

    /// Returns the declarative injection point.
    pub fn point(&self) -> &InjectionPoint {
        &self.point
    }

    /// Returns the required contract.
    pub fn required_type(&self) -> TypeKey {
        self.point.required_type()
    }

    /// Returns the required qualifiers.
    pub fn required_qualifiers(&self) -> &[Qualifier] {
        self.point.qualifiers()
    }

    /// Returns the parameter index, or `-1` for fields and lookups.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Returns the declaring element.
    pub fn parent(&self) -> &InjecteeParent {
        &self.parent
    }

    /// Returns the declaring class name.
    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    /// Returns `true` if the injectee is optional.
    pub fn is_optional(&self) -> bool {
        self.point.is_optional()
    }

    /// Returns `true` if the injectee injects its owner's descriptor.
    pub fn is_self(&self) -> bool {
        self.point.is_self()
    }

    /// Returns the descriptor that owns this injectee, while it is alive.
    pub fn injectee_descriptor(&self) -> Option<Arc<SystemDescriptor>> {
        self.owner.upgrade()
    }
}

impl fmt::Display for Injectee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.declaring_class.is_empty() {
            write!(f, "{}", self.parent)?;
        } else {
            write!(f, "{}.{}", self.declaring_class, self.parent)?;
        }
        if self.position >= 0 {
            write!(f, "[{}]", self.position)?;
        }
        write!(f, " requiring {}", self.point.required_type())?;
        for qualifier in self.point.qualifiers() {
            write!(f, " {qualifier}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Injectee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injectee")
            .field("required", &self.point.required_type())
            .field("kind", &self.point.kind())
            .field("position", &self.position)
            .field("parent", &self.parent)
            .field("declaring_class", &self.declaring_class)
            .field("optional", &self.is_optional())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;

    #[test]
    fn test_point_builders() {
        let point = InjectionPoint::of::<Engine>().named("v8").optional();
        assert_eq!(point.kind(), InjecteeKind::Direct);
        assert!(point.is_optional());
        assert_eq!(point.name(), Some("v8"));

        assert!(InjectionPoint::optional_of::<Engine>().is_optional());
        assert!(InjectionPoint::self_descriptor().is_self());
        assert_eq!(
            InjectionPoint::iterable_of::<Engine>().kind(),
            InjecteeKind::IterableProvider
        );
    }

    #[test]
    fn test_unqualified_rules() {
        let blue = Qualifier::new("Blue");
        let red = Qualifier::new("Red");

        assert!(Unqualified::any().permits(&[]));
        assert!(!Unqualified::any().permits(std::slice::from_ref(&blue)));

        let no_blue = Unqualified::excluding(["Blue"]);
        assert!(no_blue.permits(std::slice::from_ref(&red)));
        assert!(!no_blue.permits(&[red, blue]));
    }

    #[test]
    fn test_display() {
        let injectee = Injectee::new(
            InjectionPoint::of::<Engine>().named("v8"),
            0,
            InjecteeParent::Constructor,
            "Car",
        );
        let rendered = injectee.to_string();
        assert!(rendered.starts_with("Car.<init>[0] requiring "));
        assert!(rendered.ends_with("@Named(\"v8\")"));
        assert_eq!(injectee.position(), 0);
        assert!(injectee.injectee_descriptor().is_none());
    }
}
