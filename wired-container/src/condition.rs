//! Load conditions gating provider registration.
//!
//! A [`LoadCondition`] inspects a [`ConditionContext`] and records why it
//! matched or not. The provider is registered when no negative match was
//! recorded. Conditions may look at container state, so a condition that
//! fails now can succeed after another conditional provider is registered.
//!
//! ```rust
//! use wired_container::condition::{OnProperty, OnTypePresent, all_of};
//!
//! struct Database;
//!
//! let condition = all_of(vec![
//!     Box::new(OnProperty::equals("cache.enabled", "true")),
//!     Box::new(OnTypePresent::of::<Database>()),
//! ]);
//! ```

use std::fmt;

use crate::environment::Environment;
use crate::key::QualifiedTypeIdentifier;
use crate::type_id::TypeIdentifier;

/// What a condition can observe while it is evaluated.
pub trait ContainerState: Send + Sync {
    fn environment(&self) -> &dyn Environment;

    /// Returns `true` if a registered provider supplies `key`.
    fn contains(&self, key: &QualifiedTypeIdentifier) -> bool;
}

/// A predicate deciding whether a provider should be registered.
pub trait LoadCondition: Send + Sync {
    /// Records positive and/or negative matches on `context`.
    fn test(&self, context: &mut ConditionContext<'_>);
}

/// Evaluation state for one condition test.
pub struct ConditionContext<'a> {
    state: &'a dyn ContainerState,
    positive: Vec<String>,
    negative: Vec<String>,
}

impl<'a> ConditionContext<'a> {
    pub fn new(state: &'a dyn ContainerState) -> Self {
        Self {
            state,
            positive: Vec::new(),
            negative: Vec::new(),
        }
    }

    /// A condition matched when it recorded no negative match.
    #[inline]
    pub fn is_matched(&self) -> bool {
        self.negative.is_empty()
    }

    pub fn positive_matches(&self) -> &[String] {
        &self.positive
    }

    pub fn negative_matches(&self) -> &[String] {
        &self.negative
    }

    pub fn record_match(&mut self, reason: impl Into<String>) {
        self.positive.push(reason.into());
    }

    pub fn record_mismatch(&mut self, reason: impl Into<String>) {
        self.negative.push(reason.into());
    }

    /// Forgets everything recorded so far.
    pub fn reset(&mut self) {
        self.positive.clear();
        self.negative.clear();
    }

    pub fn environment(&self) -> &dyn Environment {
        self.state.environment()
    }

    pub fn contains(&self, key: &QualifiedTypeIdentifier) -> bool {
        self.state.contains(key)
    }

    pub fn contains_type(&self, type_identifier: &TypeIdentifier) -> bool {
        self.state.contains(&QualifiedTypeIdentifier::unqualified(type_identifier.clone()))
    }

    /// A fresh context over the same state, for composite conditions.
    fn child(&self) -> ConditionContext<'a> {
        ConditionContext::new(self.state)
    }
}

impl fmt::Debug for ConditionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionContext")
            .field("positive", &self.positive)
            .field("negative", &self.negative)
            .finish()
    }
}

/// Matches on an environment property.
#[derive(Debug, Clone)]
pub struct OnProperty {
    key: String,
    expected: Option<String>,
    match_if_missing: bool,
}

impl OnProperty {
    /// Matches when `key` is set to anything but `"false"`.
    pub fn present(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected: None,
            match_if_missing: false,
        }
    }

    /// Matches when `key` equals `value` (ASCII case-insensitive).
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected: Some(value.into()),
            match_if_missing: false,
        }
    }

    #[must_use]
    pub fn match_if_missing(mut self) -> Self {
        self.match_if_missing = true;
        self
    }
}

impl LoadCondition for OnProperty {
    fn test(&self, context: &mut ConditionContext<'_>) {
        let actual = context.environment().property(&self.key);
        match (actual, &self.expected) {
            (None, _) if self.match_if_missing => {
                context.record_match(format!("property {} is missing (allowed)", self.key))
            }
            (None, _) => context.record_mismatch(format!("property {} is not set", self.key)),
            (Some(value), None) if !value.eq_ignore_ascii_case("false") => {
                context.record_match(format!("property {} is set", self.key))
            }
            (Some(_), None) => context.record_mismatch(format!("property {} is false", self.key)),
            (Some(value), Some(expected)) if value.eq_ignore_ascii_case(expected) => {
                context.record_match(format!("property {}={}", self.key, value))
            }
            (Some(value), Some(expected)) => context.record_mismatch(format!(
                "property {}={} (expected {})",
                self.key, value, expected
            )),
        }
    }
}

/// Matches when some registered provider supplies the key.
#[derive(Debug, Clone)]
pub struct OnTypePresent(QualifiedTypeIdentifier);

impl OnTypePresent {
    pub fn new(key: impl Into<QualifiedTypeIdentifier>) -> Self {
        Self(key.into())
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(QualifiedTypeIdentifier::of::<T>())
    }
}

impl LoadCondition for OnTypePresent {
    fn test(&self, context: &mut ConditionContext<'_>) {
        if context.contains(&self.0) {
            context.record_match(format!("{:#} is present", self.0.type_identifier()));
        } else {
            context.record_mismatch(format!("{:#} is missing", self.0.type_identifier()));
        }
    }
}

/// Matches when no registered provider supplies the key.
#[derive(Debug, Clone)]
pub struct OnTypeMissing(QualifiedTypeIdentifier);

impl OnTypeMissing {
    pub fn new(key: impl Into<QualifiedTypeIdentifier>) -> Self {
        Self(key.into())
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(QualifiedTypeIdentifier::of::<T>())
    }
}

impl LoadCondition for OnTypeMissing {
    fn test(&self, context: &mut ConditionContext<'_>) {
        if context.contains(&self.0) {
            context.record_mismatch(format!("{:#} is already present", self.0.type_identifier()));
        } else {
            context.record_match(format!("{:#} is missing", self.0.type_identifier()));
        }
    }
}

/// Every inner condition must match.
pub struct AllOf(Vec<Box<dyn LoadCondition>>);

pub fn all_of(conditions: Vec<Box<dyn LoadCondition>>) -> AllOf {
    AllOf(conditions)
}

impl LoadCondition for AllOf {
    fn test(&self, context: &mut ConditionContext<'_>) {
        for condition in &self.0 {
            condition.test(context);
        }
    }
}

/// At least one inner condition must match.
pub struct AnyOf(Vec<Box<dyn LoadCondition>>);

pub fn any_of(conditions: Vec<Box<dyn LoadCondition>>) -> AnyOf {
    AnyOf(conditions)
}

impl LoadCondition for AnyOf {
    fn test(&self, context: &mut ConditionContext<'_>) {
        let mut negatives = Vec::new();
        for condition in &self.0 {
            let mut child = context.child();
            condition.test(&mut child);
            if child.is_matched() {
                for reason in child.positive {
                    context.record_match(reason);
                }
                return;
            }
            negatives.extend(child.negative);
        }
        if negatives.is_empty() {
            context.record_mismatch("no alternative matched");
        }
        for reason in negatives {
            context.record_mismatch(reason);
        }
    }
}

/// Inverts an inner condition.
pub struct Not(Box<dyn LoadCondition>);

pub fn not(condition: impl LoadCondition + 'static) -> Not {
    Not(Box::new(condition))
}

impl LoadCondition for Not {
    fn test(&self, context: &mut ConditionContext<'_>) {
        let mut child = context.child();
        self.0.test(&mut child);
        if child.is_matched() {
            let reasons = child.positive.join(", ");
            context.record_mismatch(format!("not({reasons})"));
        } else {
            let reasons = child.negative.join(", ");
            context.record_match(format!("not({reasons})"));
        }
    }
}

/// A closure-backed condition with a fixed description.
pub struct FnCondition<F> {
    description: String,
    predicate: F,
}

/// Wraps a predicate; `description` is recorded as the (mis)match reason.
pub fn condition_fn<F>(description: impl Into<String>, predicate: F) -> FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    FnCondition {
        description: description.into(),
        predicate,
    }
}

impl<F> LoadCondition for FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    fn test(&self, context: &mut ConditionContext<'_>) {
        if (self.predicate)(context) {
            context.record_match(self.description.clone());
        } else {
            context.record_mismatch(self.description.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MapEnvironment;

    struct Database;
    struct Cache;

    struct FakeState {
        env: MapEnvironment,
        present: Vec<QualifiedTypeIdentifier>,
    }

    impl ContainerState for FakeState {
        fn environment(&self) -> &dyn Environment {
            &self.env
        }

        fn contains(&self, key: &QualifiedTypeIdentifier) -> bool {
            self.present.contains(key)
        }
    }

    fn state() -> FakeState {
        FakeState {
            env: MapEnvironment::new().with("feature.enabled", "true"),
            present: vec![QualifiedTypeIdentifier::of::<Database>()],
        }
    }

    fn eval(condition: &dyn LoadCondition, state: &FakeState) -> (bool, Vec<String>, Vec<String>) {
        let mut ctx = ConditionContext::new(state);
        condition.test(&mut ctx);
        (
            ctx.is_matched(),
            ctx.positive_matches().to_vec(),
            ctx.negative_matches().to_vec(),
        )
    }

    #[test]
    fn property_equals() {
        let st = state();
        assert!(eval(&OnProperty::equals("feature.enabled", "TRUE"), &st).0);
        assert!(!eval(&OnProperty::equals("feature.enabled", "false"), &st).0);
        assert!(!eval(&OnProperty::present("other"), &st).0);
        assert!(eval(&OnProperty::present("other").match_if_missing(), &st).0);
    }

    #[test]
    fn type_presence() {
        let st = state();
        assert!(eval(&OnTypePresent::of::<Database>(), &st).0);
        assert!(!eval(&OnTypePresent::of::<Cache>(), &st).0);
        assert!(eval(&OnTypeMissing::of::<Cache>(), &st).0);
    }

    #[test]
    fn all_of_collects_every_mismatch() {
        let st = state();
        let condition = all_of(vec![
            Box::new(OnTypePresent::of::<Cache>()),
            Box::new(OnProperty::present("missing.key")),
        ]);
        let (matched, _, negative) = eval(&condition, &st);
        assert!(!matched);
        assert_eq!(negative.len(), 2);
    }

    #[test]
    fn any_of_stops_at_first_match() {
        let st = state();
        let condition = any_of(vec![
            Box::new(OnTypePresent::of::<Cache>()),
            Box::new(OnProperty::equals("feature.enabled", "true")),
        ]);
        let (matched, positive, negative) = eval(&condition, &st);
        assert!(matched);
        assert_eq!(positive, vec!["property feature.enabled=true"]);
        assert!(negative.is_empty());
    }

    #[test]
    fn not_inverts() {
        let st = state();
        assert!(!eval(&not(OnTypePresent::of::<Database>()), &st).0);
        assert!(eval(&not(OnTypePresent::of::<Cache>()), &st).0);
    }

    #[test]
    fn closure_condition_and_reset() {
        let st = state();
        let condition = condition_fn("never", |_| false);
        let mut ctx = ConditionContext::new(&st);
        condition.test(&mut ctx);
        assert!(!ctx.is_matched());
        ctx.reset();
        assert!(ctx.is_matched());
        assert!(ctx.negative_matches().is_empty());
    }
}
