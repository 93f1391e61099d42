//! Rule evaluation for one validation pass

use crate::entity::Validatable;
use crate::error::{ValidationError, ValidationResult};
use crate::message::{MessageKey, ValidationMessage};
use crate::rules::{GroupRule, Rule, RuleContext, RuleId, RuleOutcome, Rules};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// Messages produced for one property by its single-property rules
#[derive(Debug, Clone)]
pub struct PropertyOutcome {
    pub property: String,
    pub messages: Vec<ValidationMessage>,
    /// Rules that ran for this property in this pass
    pub participating: HashSet<RuleId>,
}

/// Result of one group rule; `message` is `None` when the rule passed
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub group: RuleId,
    pub keys: Vec<MessageKey>,
    pub message: Option<ValidationMessage>,
}

/// Everything a pass produced, ready to be applied to the store
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub properties: Vec<PropertyOutcome>,
    pub groups: Vec<GroupOutcome>,
    /// AND of every rule outcome in the pass
    pub is_valid: bool,
}

impl Default for PassOutcome {
    fn default() -> Self {
        Self {
            properties: Vec::new(),
            groups: Vec::new(),
            is_valid: true,
        }
    }
}

/// Evaluates rules against the current entity values.
///
/// One evaluator covers one pass: group rules reached through several
/// causative properties run only once. The evaluator never writes to the
/// message store.
pub struct RuleEvaluator<'a> {
    rules: &'a Rules,
    entity: &'a (dyn Validatable + 'static),
    include_all: bool,
    seen_groups: HashSet<RuleId>,
    outcome: PassOutcome,
}

impl<'a> RuleEvaluator<'a> {
    /// `include_all = false` restricts the pass to rules marked for implicit validation
    pub fn new(rules: &'a Rules, entity: &'a (dyn Validatable + 'static), include_all: bool) -> Self {
        Self {
            rules,
            entity,
            include_all,
            seen_groups: HashSet::new(),
            outcome: PassOutcome::default(),
        }
    }

    /// Evaluate sync then async property rules, then sync then async group rules caused by `property`
    pub async fn evaluate_property(&mut self, property: &str) -> ValidationResult<()> {
        let rules: &'a Rules = self.rules;
        let include_all = self.include_all;
        let value = self.entity.property_value(property).unwrap_or(Value::Null);
        let ctx = RuleContext::new(Some(property), self.entity);

        let property_rules = rules.rules_for(property);
        let ordered = property_rules
            .iter()
            .filter(|rule| !rule.is_async())
            .chain(property_rules.iter().filter(|rule| rule.is_async()))
            .filter(|rule| rule.participates(include_all));

        let mut messages = Vec::new();
        let mut participating = HashSet::new();
        for rule in ordered {
            participating.insert(rule.id());
            let outcome = run_rule(rule, &value, &ctx, property).await?;
            if !outcome.is_valid() {
                debug!("Rule '{}' reported a violation on {}", rule.name(), property);
                self.outcome.is_valid = false;
            }
            messages.extend(rule.messages(outcome));
        }

        self.outcome.properties.push(PropertyOutcome {
            property: property.to_string(),
            messages,
            participating,
        });

        let groups: Vec<&'a GroupRule> = rules.groups_caused_by(property).collect();
        self.evaluate_groups(groups).await
    }

    /// Evaluate every participating group rule not reached through a property yet
    pub async fn evaluate_remaining_groups(&mut self) -> ValidationResult<()> {
        let rules: &'a Rules = self.rules;
        self.evaluate_groups(rules.group_rules().iter().collect()).await
    }

    pub fn finish(self) -> PassOutcome {
        self.outcome
    }

    async fn evaluate_groups(&mut self, groups: Vec<&'a GroupRule>) -> ValidationResult<()> {
        let (sync, asynchronous): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .filter(|group| group.rule().participates(self.include_all))
            .partition(|group| !group.rule().is_async());

        for group in sync.into_iter().chain(asynchronous) {
            self.evaluate_group(group).await?;
        }
        Ok(())
    }

    async fn evaluate_group(&mut self, group: &'a GroupRule) -> ValidationResult<()> {
        if !self.seen_groups.insert(group.id()) {
            return Ok(());
        }

        let ctx = RuleContext::new(None, self.entity);
        let target = group.id().to_string();
        let outcome = run_rule(group.rule(), self.entity, &ctx, &target).await?;
        if !outcome.is_valid() {
            debug!("Group rule '{}' ({}) reported a violation", group.rule().name(), target);
            self.outcome.is_valid = false;
        }

        let mut messages = group.rule().messages(outcome).into_iter();
        let message = messages.next();
        if messages.next().is_some() {
            debug!("Group rule '{}' returned several messages, keeping the first", group.rule().name());
        }

        self.outcome.groups.push(GroupOutcome {
            group: group.id(),
            keys: group.affected_keys(),
            message,
        });
        Ok(())
    }
}

/// Run one rule, turning faults and panics into request errors
async fn run_rule<T: ?Sized + Sync>(
    rule: &Rule<T>,
    input: &T,
    ctx: &RuleContext<'_>,
    target: &str,
) -> ValidationResult<RuleOutcome> {
    match AssertUnwindSafe(rule.run(input, ctx)).catch_unwind().await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(source)) => {
            warn!("Rule '{}' failed on {}: {}", rule.name(), target, source);
            Err(ValidationError::rule(rule.name(), target, source))
        }
        Err(_) => {
            warn!("Rule '{}' panicked on {}", rule.name(), target);
            Err(ValidationError::RulePanicked {
                rule: rule.name().to_string(),
                target: target.to_string(),
            })
        }
    }
}
