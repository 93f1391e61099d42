//! Rule contracts and the per-entity-type rule registry

use crate::entity::Validatable;
use crate::error::RuleError;
use crate::message::{MessageKey, Severity, ValidationMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identity of a registered rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(u64);

impl RuleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// What a rule concluded about its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Valid,
    /// One message text per violation found
    Invalid(Vec<String>),
}

impl RuleOutcome {
    pub fn invalid(text: impl Into<String>) -> Self {
        Self::Invalid(vec![text.into()])
    }

    /// `Valid` when `ok` holds, otherwise a single violation with `text`
    pub fn check(ok: bool, text: impl FnOnce() -> String) -> Self {
        if ok {
            Self::Valid
        } else {
            Self::Invalid(vec![text()])
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Valid => true,
            Self::Invalid(texts) => texts.is_empty(),
        }
    }
}

/// Result returned by rule implementations
pub type RuleResult = Result<RuleOutcome, RuleError>;

/// Context handed to every rule check
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    property: Option<&'a str>,
    entity: &'a dyn Validatable,
}

impl<'a> RuleContext<'a> {
    pub fn new(property: Option<&'a str>, entity: &'a dyn Validatable) -> Self {
        Self { property, entity }
    }

    /// Property being checked, `None` for group rules
    pub fn property(&self) -> Option<&'a str> {
        self.property
    }

    pub fn entity(&self) -> &'a dyn Validatable {
        self.entity
    }

    /// Read another property of the entity under validation
    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.entity.property_value(name)
    }

    /// Label used in default message texts
    pub fn label(&self) -> &'a str {
        self.property.unwrap_or("value")
    }
}

/// Synchronous rule capability.
///
/// `T` is `Value` for single-property rules and `dyn Validatable` for group rules.
pub trait SyncRule<T: ?Sized>: Send + Sync {
    fn check(&self, input: &T, ctx: &RuleContext<'_>) -> RuleResult;

    fn rule_name(&self) -> &str;
}

/// Asynchronous rule capability, e.g. for rules performing a remote lookup
#[async_trait]
pub trait AsyncRule<T: ?Sized + Sync>: Send + Sync {
    async fn check(&self, input: &T, ctx: &RuleContext<'_>) -> RuleResult;

    fn rule_name(&self) -> &str;
}

/// A rule implementation in one of its two capability variants
pub enum RuleKind<T: ?Sized + Sync> {
    Sync(Arc<dyn SyncRule<T>>),
    Async(Arc<dyn AsyncRule<T>>),
}

impl<T: ?Sized + Sync> Clone for RuleKind<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(rule) => Self::Sync(rule.clone()),
            Self::Async(rule) => Self::Async(rule.clone()),
        }
    }
}

/// Severity and display settings attached to a rule at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSettings {
    pub severity: Severity,
    /// Take part in implicit validation triggered by property changes
    pub use_in_implicit: bool,
    pub show_on_field: bool,
    pub show_in_summary: bool,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            severity: Severity::Error,
            use_in_implicit: true,
            show_on_field: true,
            show_in_summary: true,
        }
    }
}

impl RuleSettings {
    fn message(&self, rule: RuleId, text: String) -> ValidationMessage {
        ValidationMessage::new(self.severity, text)
            .show_on_field(self.show_on_field)
            .show_in_summary(self.show_in_summary)
            .produced_by(rule)
    }
}

/// A registered rule: identity, implementation and settings
pub struct Rule<T: ?Sized + Sync> {
    id: RuleId,
    kind: RuleKind<T>,
    settings: RuleSettings,
}

impl<T: ?Sized + Sync> Clone for Rule<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind.clone(),
            settings: self.settings,
        }
    }
}

impl<T: ?Sized + Sync> Rule<T> {
    pub fn sync<R>(rule: R) -> Self
    where
        R: SyncRule<T> + 'static,
    {
        Self::from_kind(RuleKind::Sync(Arc::new(rule)))
    }

    pub fn new_async<R>(rule: R) -> Self
    where
        R: AsyncRule<T> + 'static,
    {
        Self::from_kind(RuleKind::Async(Arc::new(rule)))
    }

    pub fn from_kind(kind: RuleKind<T>) -> Self {
        Self {
            id: RuleId::next(),
            kind,
            settings: RuleSettings::default(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.settings.severity = severity;
        self
    }

    /// Shorthand for `severity(Severity::Warning)`
    pub fn warning(self) -> Self {
        self.severity(Severity::Warning)
    }

    pub fn use_in_implicit(mut self, use_in_implicit: bool) -> Self {
        self.settings.use_in_implicit = use_in_implicit;
        self
    }

    pub fn show_on_field(mut self, show: bool) -> Self {
        self.settings.show_on_field = show;
        self
    }

    pub fn show_in_summary(mut self, show: bool) -> Self {
        self.settings.show_in_summary = show;
        self
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn kind(&self) -> &RuleKind<T> {
        &self.kind
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, RuleKind::Async(_))
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            RuleKind::Sync(rule) => rule.rule_name(),
            RuleKind::Async(rule) => rule.rule_name(),
        }
    }

    /// Whether this rule runs in a pass with the given `include_all` flag
    pub(crate) fn participates(&self, include_all: bool) -> bool {
        include_all || self.settings.use_in_implicit
    }

    pub(crate) async fn run(&self, input: &T, ctx: &RuleContext<'_>) -> RuleResult {
        match &self.kind {
            RuleKind::Sync(rule) => rule.check(input, ctx),
            RuleKind::Async(rule) => rule.check(input, ctx).await,
        }
    }

    /// Turn an outcome into messages carrying this rule's settings
    pub(crate) fn messages(&self, outcome: RuleOutcome) -> Vec<ValidationMessage> {
        match outcome {
            RuleOutcome::Valid => Vec::new(),
            RuleOutcome::Invalid(texts) => texts
                .into_iter()
                .map(|text| self.settings.message(self.id, text))
                .collect(),
        }
    }
}

impl<T: ?Sized + Sync> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("is_async", &self.is_async())
            .field("settings", &self.settings)
            .finish()
    }
}

/// A rule spanning several properties of an entity.
///
/// Re-evaluated whenever one of its causative properties is validated, and
/// reports its single message under each affected property (or under
/// [`MessageKey::Entity`] when none are declared).
#[derive(Clone, Debug)]
pub struct GroupRule {
    rule: Rule<dyn Validatable>,
    causes: Vec<String>,
    affects: Vec<String>,
}

impl GroupRule {
    pub fn sync<R>(rule: R) -> Self
    where
        R: SyncRule<dyn Validatable> + 'static,
    {
        Self::from_rule(Rule::sync(rule))
    }

    pub fn new_async<R>(rule: R) -> Self
    where
        R: AsyncRule<dyn Validatable> + 'static,
    {
        Self::from_rule(Rule::new_async(rule))
    }

    pub fn from_rule(rule: Rule<dyn Validatable>) -> Self {
        Self {
            rule,
            causes: Vec::new(),
            affects: Vec::new(),
        }
    }

    /// Properties whose validation re-evaluates this rule
    pub fn causes<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.causes.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Properties this rule's message is reported under
    pub fn affects<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affects.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Use the same properties as causes and affected properties
    pub fn over<I, S>(self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        self.causes(properties.clone()).affects(properties)
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.rule = self.rule.severity(severity);
        self
    }

    pub fn warning(self) -> Self {
        self.severity(Severity::Warning)
    }

    pub fn use_in_implicit(mut self, use_in_implicit: bool) -> Self {
        self.rule = self.rule.use_in_implicit(use_in_implicit);
        self
    }

    pub fn show_on_field(mut self, show: bool) -> Self {
        self.rule = self.rule.show_on_field(show);
        self
    }

    pub fn show_in_summary(mut self, show: bool) -> Self {
        self.rule = self.rule.show_in_summary(show);
        self
    }

    pub fn id(&self) -> RuleId {
        self.rule.id()
    }

    pub fn rule(&self) -> &Rule<dyn Validatable> {
        &self.rule
    }

    pub fn causative(&self) -> &[String] {
        &self.causes
    }

    pub fn affected(&self) -> &[String] {
        &self.affects
    }

    pub fn is_caused_by(&self, property: &str) -> bool {
        self.causes.iter().any(|cause| cause == property)
    }

    /// Keys the message of this rule is reported under
    pub fn affected_keys(&self) -> Vec<MessageKey> {
        if self.affects.is_empty() {
            vec![MessageKey::Entity]
        } else {
            self.affects.iter().cloned().map(MessageKey::Property).collect()
        }
    }
}

/// Rule registry for one entity type.
///
/// Built once and shared (usually behind an `Arc`) by every validator of that type.
/// Properties keep the order in which they were first registered.
#[derive(Clone, Default)]
pub struct Rules {
    properties: Vec<String>,
    property_rules: HashMap<String, Vec<Rule<Value>>>,
    group_rules: Vec<GroupRule>,
}

impl fmt::Debug for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("properties", &self.properties)
            .field("property_rule_count", &self.property_rule_count())
            .field("group_rule_count", &self.group_rules.len())
            .finish()
    }
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a property
    pub fn property(mut self, property: impl Into<String>, rule: Rule<Value>) -> Self {
        let property = property.into();
        if !self.property_rules.contains_key(&property) {
            self.properties.push(property.clone());
        }
        self.property_rules.entry(property).or_default().push(rule);
        self
    }

    /// Register several rules for a property
    pub fn property_rules(
        self,
        property: impl Into<String>,
        rules: impl IntoIterator<Item = Rule<Value>>,
    ) -> Self {
        let property = property.into();
        rules
            .into_iter()
            .fold(self, |registry, rule| registry.property(property.clone(), rule))
    }

    /// Register a synchronous rule with default settings
    pub fn sync<R>(self, property: impl Into<String>, rule: R) -> Self
    where
        R: SyncRule<Value> + 'static,
    {
        self.property(property, Rule::sync(rule))
    }

    /// Register an asynchronous rule with default settings
    pub fn asynchronous<R>(self, property: impl Into<String>, rule: R) -> Self
    where
        R: AsyncRule<Value> + 'static,
    {
        self.property(property, Rule::new_async(rule))
    }

    pub fn group(mut self, rule: GroupRule) -> Self {
        self.group_rules.push(rule);
        self
    }

    /// Rules registered for a property, in registration order
    pub fn rules_for(&self, property: &str) -> &[Rule<Value>] {
        self.property_rules
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Group rules re-evaluated when `property` is validated
    pub fn groups_caused_by<'a, 'p>(&'a self, property: &'p str) -> impl Iterator<Item = &'a GroupRule> + 'p
    where
        'a: 'p,
    {
        self.group_rules
            .iter()
            .filter(move |group| group.is_caused_by(property))
    }

    pub fn group_rules(&self) -> &[GroupRule] {
        &self.group_rules
    }

    /// Properties with at least one rule, in registration order
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Whether any rule (property or group) refers to this property
    pub fn knows_property(&self, property: &str) -> bool {
        self.property_rules.contains_key(property)
            || self.group_rules.iter().any(|group| {
                group.is_caused_by(property) || group.affected().iter().any(|p| p == property)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.property_rules.is_empty() && self.group_rules.is_empty()
    }

    pub fn property_rule_count(&self) -> usize {
        self.property_rules.values().map(Vec::len).sum()
    }

    pub fn group_rule_count(&self) -> usize {
        self.group_rules.len()
    }
}
