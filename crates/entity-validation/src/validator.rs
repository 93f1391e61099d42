//! Validator bound to one entity

use crate::config::ValidatorConfig;
use crate::entity::Validatable;
use crate::error::{ValidationError, ValidationResult};
use crate::evaluator::{PassOutcome, RuleEvaluator};
use crate::message::{MessageKey, ValidationMessage};
use crate::notifier::{ChangeNotifier, ChangeSet, SubscriptionId, ValidationEvent};
use crate::rules::Rules;
use crate::sequencer::{ValidationHandle, ValidationSequencer};
use crate::store::{ApplyMode, MergedView, MessageStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
enum Pass {
    /// Every registered property, then every group rule not reached yet
    Entity,
    /// One property, every rule
    Property(String),
    /// One property after a change, implicit rules only
    Implicit(String),
}

impl Pass {
    fn include_all(&self) -> bool {
        !matches!(self, Pass::Implicit(_))
    }
}

struct Inner<E> {
    entity: Arc<E>,
    rules: Arc<Rules>,
    store: MessageStore,
    notifier: ChangeNotifier,
    sequencer: ValidationSequencer,
    config: ValidatorConfig,
    enabled: AtomicBool,
}

impl<E: Validatable + 'static> Inner<E> {
    async fn run(self: Arc<Self>, pass: Pass) -> ValidationResult<bool> {
        let entity: &(dyn Validatable + 'static) = self.entity.as_ref();
        let mut evaluator = RuleEvaluator::new(&self.rules, entity, pass.include_all());

        match &pass {
            Pass::Entity => {
                for property in self.rules.properties() {
                    evaluator.evaluate_property(property).await?;
                }
                evaluator.evaluate_remaining_groups().await?;
            }
            Pass::Property(property) | Pass::Implicit(property) => {
                evaluator.evaluate_property(property).await?;
            }
        }

        let outcome = evaluator.finish();
        let is_valid = outcome.is_valid;
        let changes = self.apply(outcome, pass.include_all());

        debug!(
            "Validation pass {:?} finished: valid={}, {} key(s) changed",
            pass,
            is_valid,
            changes.keys().len()
        );
        self.notifier.notify(&changes);
        Ok(is_valid)
    }

    /// Write a completed pass into the store and collect the keys that changed
    fn apply(&self, outcome: PassOutcome, replace: bool) -> ChangeSet {
        let mut changes = ChangeSet::new();

        for result in outcome.properties {
            let mode = if replace {
                ApplyMode::Replace
            } else {
                ApplyMode::Merge(result.participating)
            };
            if self
                .store
                .apply_property_result(&result.property, result.messages, &mode)
            {
                changes.push(MessageKey::Property(result.property));
            }
        }

        for result in outcome.groups {
            if self
                .store
                .apply_group_result(result.group, &result.keys, result.message)
            {
                changes.extend(result.keys);
            }
        }

        changes
    }
}

/// Keeps the validation state of one entity.
///
/// Validation requests are queued per validator and applied strictly in the
/// order they were issued. Cloning the validator yields another handle to the
/// same state.
///
/// ```rust
/// use entity_validation::{EntityValidator, NumericRule, PropertyBag, Rules};
///
/// # tokio_test::block_on(async {
/// let rules = Rules::new().sync("Bid", NumericRule::new().greater_than(0.0));
/// let validator = EntityValidator::new(PropertyBag::new().with("Bid", -5), rules);
///
/// let valid = validator.validate().unwrap().await.unwrap();
/// assert!(!valid);
/// assert_eq!(validator.messages("Bid")[0].text(), "Bid must be greater than 0");
/// # });
/// ```
pub struct EntityValidator<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for EntityValidator<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> std::fmt::Debug for EntityValidator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityValidator")
            .field("rules", &self.inner.rules)
            .field("config", &self.inner.config)
            .field("pending", &self.inner.sequencer.pending())
            .finish()
    }
}

impl<E: Validatable + 'static> EntityValidator<E> {
    pub fn new(entity: E, rules: impl Into<Arc<Rules>>) -> Self {
        Self::with_config(Arc::new(entity), rules, ValidatorConfig::default())
    }

    /// Validator over an entity that is shared with other owners
    pub fn with_config(
        entity: Arc<E>,
        rules: impl Into<Arc<Rules>>,
        config: ValidatorConfig,
    ) -> Self {
        let inner = Inner {
            entity,
            rules: rules.into(),
            store: MessageStore::new(),
            notifier: ChangeNotifier::new(),
            sequencer: ValidationSequencer::new(*config.get_continue_on_failure()),
            enabled: AtomicBool::new(*config.get_enabled()),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn entity(&self) -> &Arc<E> {
        &self.inner.entity
    }

    pub fn rules(&self) -> &Rules {
        &self.inner.rules
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.inner.config
    }

    /// Validate every registered property and group rule.
    ///
    /// The handle resolves to whether every rule passed.
    pub fn validate(&self) -> ValidationResult<ValidationHandle<bool>> {
        self.submit(Pass::Entity)
    }

    /// Validate one property with all of its rules, including the group rules it causes
    pub fn validate_property(&self, property: &str) -> ValidationResult<ValidationHandle<bool>> {
        self.check_property(property)?;
        self.submit(Pass::Property(property.to_string()))
    }

    /// Report that a property value changed.
    ///
    /// Queues an implicit pass over the rules marked for implicit validation.
    /// Returns `None` when validation is disabled, when the configuration
    /// ignores property changes, or when no rule listens to this property.
    pub fn property_changed(
        &self,
        property: &str,
    ) -> ValidationResult<Option<ValidationHandle<bool>>> {
        self.check_property(property)?;

        if !self.is_enabled() || !*self.inner.config.get_validate_on_property_change() {
            debug!("Ignoring change of {}: implicit validation is off", property);
            return Ok(None);
        }
        if !self.inner.rules.knows_property(property) {
            return Ok(None);
        }

        self.submit(Pass::Implicit(property.to_string())).map(Some)
    }

    /// Add a message outside the rule system
    pub fn add_message(
        &self,
        property: &str,
        message: ValidationMessage,
    ) -> ValidationResult<ValidationHandle<()>> {
        self.add_messages(property, vec![message])
    }

    /// Add several messages outside the rule system.
    ///
    /// They are diffed and notified like rule results and stay until a
    /// replacing validation of the property or [`clear`](Self::clear).
    pub fn add_messages(
        &self,
        property: &str,
        messages: Vec<ValidationMessage>,
    ) -> ValidationResult<ValidationHandle<()>> {
        self.check_property(property)?;

        let inner = self.inner.clone();
        let property = property.to_string();
        self.inner.sequencer.submit(async move {
            let mut changes = ChangeSet::new();
            if inner.store.add_messages(&property, messages) {
                changes.push(MessageKey::Property(property));
            }
            inner.notifier.notify(&changes);
            Ok(())
        })
    }

    /// Remove every message once the requests issued before have applied
    pub fn clear(&self) -> ValidationResult<ValidationHandle<()>> {
        let inner = self.inner.clone();
        self.inner.sequencer.submit(async move {
            let mut changes = ChangeSet::new();
            changes.extend(inner.store.clear());
            debug!("Cleared messages of {} key(s)", changes.keys().len());
            inner.notifier.notify(&changes);
            Ok(())
        })
    }

    /// Messages currently shown for a property, rule groups included
    pub fn messages(&self, property: &str) -> Vec<ValidationMessage> {
        self.all_messages().property(property).to_vec()
    }

    /// Messages of group rules that affect no particular property
    pub fn entity_messages(&self) -> Vec<ValidationMessage> {
        self.all_messages().entity().to_vec()
    }

    pub fn all_messages(&self) -> MergedView {
        self.inner.store.all_messages()
    }

    pub fn has_errors(&self) -> bool {
        self.all_messages().has_errors()
    }

    pub fn has_warnings(&self) -> bool {
        self.all_messages().has_warnings()
    }

    /// Whether any request is queued or running
    pub fn is_validating(&self) -> bool {
        self.inner.sequencer.is_busy()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ValidationEvent) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    /// Switch implicit validation on or off; explicit requests always run
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    fn check_property(&self, property: &str) -> ValidationResult<()> {
        if property.is_empty() {
            return Err(ValidationError::MissingArgument("property"));
        }
        if !self.inner.entity.has_property(property) && !self.inner.rules.knows_property(property) {
            return Err(ValidationError::UnknownProperty(property.to_string()));
        }
        Ok(())
    }

    fn submit(&self, pass: Pass) -> ValidationResult<ValidationHandle<bool>> {
        let inner = self.inner.clone();
        let handle = self.inner.sequencer.submit(inner.run(pass.clone()))?;
        debug!("Queued validation request #{} ({:?})", handle.ticket(), pass);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropertyBag;
    use crate::rules::{Rule, RuleOutcome};
    use crate::validators::{CustomRule, NumericRule, RequiredRule};
    use parking_lot::Mutex;

    fn bid_validator() -> EntityValidator<PropertyBag> {
        let rules = Rules::new()
            .sync("Bid", NumericRule::new().greater_than(0.0))
            .sync(
                "Bid",
                CustomRule::new("above_current_bid", |value, ctx| {
                    let current = ctx.value_of("CurrentBid").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    Ok(RuleOutcome::check(
                        value.as_f64().map_or(true, |bid| bid > current),
                        || format!("Bid must be greater than {}", current),
                    ))
                }),
            );
        EntityValidator::new(
            PropertyBag::new().with("Bid", 0).with("CurrentBid", 100),
            rules,
        )
    }

    #[test]
    fn test_usage_errors_are_synchronous() {
        let validator = bid_validator();

        assert!(matches!(
            validator.validate_property(""),
            Err(ValidationError::MissingArgument("property"))
        ));
        assert!(matches!(
            validator.validate_property("Nope"),
            Err(ValidationError::UnknownProperty(ref name)) if name == "Nope"
        ));
        assert!(!validator.is_validating());
    }

    #[test]
    fn test_requires_runtime() {
        let validator = bid_validator();
        assert!(matches!(validator.validate(), Err(ValidationError::NoRuntime)));
        assert!(!validator.is_validating());
    }

    #[tokio::test]
    async fn test_property_validation_reports_every_failure() {
        let validator = bid_validator();
        validator.entity().set("Bid", -5);

        let valid = validator.validate_property("Bid").unwrap().await.unwrap();
        assert!(!valid);

        let texts: Vec<String> = validator
            .messages("Bid")
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(
            texts,
            vec!["Bid must be greater than 0", "Bid must be greater than 100"]
        );
        assert!(validator.has_errors());
        assert!(!validator.has_warnings());
    }

    #[tokio::test]
    async fn test_disabled_validator_ignores_property_changes() {
        let validator = bid_validator();
        validator.set_enabled(false);
        validator.entity().set("Bid", -5);

        assert!(validator.property_changed("Bid").unwrap().is_none());
        assert!(validator.messages("Bid").is_empty());

        // Explicit requests still run
        assert!(!validator.validate_property("Bid").unwrap().await.unwrap());

        validator.set_enabled(true);
        let handle = validator.property_changed("Bid").unwrap().expect("queued");
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_property_without_rules_is_not_queued() {
        let validator = bid_validator();
        assert!(validator.property_changed("CurrentBid").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_pass_writes_nothing() {
        let rules = Rules::new()
            .sync("Title", RequiredRule::new())
            .sync(
                "Title",
                CustomRule::new("flaky", |value, _| {
                    if value.as_str() == Some("boom") {
                        Err("backend unavailable".into())
                    } else {
                        Ok(RuleOutcome::Valid)
                    }
                }),
            );
        let validator = EntityValidator::new(PropertyBag::new().with("Title", ""), rules);
        validator.validate().unwrap().await.unwrap();
        assert_eq!(validator.messages("Title").len(), 1);

        validator.entity().set("Title", "boom");
        let error = validator.validate().unwrap().await.unwrap_err();
        assert!(matches!(error, ValidationError::Rule { .. }));
        // Old messages survive the failed pass
        assert_eq!(validator.messages("Title")[0].text(), "Title is required");
    }

    #[tokio::test]
    async fn test_manual_messages_are_notified() {
        let validator = bid_validator();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        validator.subscribe(move |event| sink.lock().push(event.clone()));

        validator
            .add_message("Bid", ValidationMessage::warning("Bid looks unusually high"))
            .unwrap()
            .await
            .unwrap();
        // Same text again: no change
        validator
            .add_message("Bid", ValidationMessage::warning("Bid looks unusually high"))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                ValidationEvent::MessagesChanged(MessageKey::property("Bid")),
                ValidationEvent::AllMessagesChanged,
            ]
        );
        assert!(validator.has_warnings());
    }

    #[tokio::test]
    async fn test_explicit_only_rule_is_kept_by_implicit_pass() {
        let rules = Rules::new()
            .property(
                "Bid",
                Rule::sync(NumericRule::new().greater_than(0.0)).use_in_implicit(false),
            )
            .sync("Bid", NumericRule::new().integer_only(true));
        let validator = EntityValidator::new(PropertyBag::new().with("Bid", -5), rules);

        validator.validate().unwrap().await.unwrap();
        assert_eq!(validator.messages("Bid").len(), 1);

        validator.entity().set("Bid", -5.5);
        validator.property_changed("Bid").unwrap().unwrap().await.unwrap();

        let texts: Vec<String> = validator
            .messages("Bid")
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(
            texts,
            vec!["Bid must be greater than 0", "Bid must be an integer"]
        );
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_fail_applied_request() {
        let validator = bid_validator();
        validator.subscribe(|_| panic!("listener bug"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        validator.subscribe(move |event| sink.lock().push(event.clone()));

        validator.entity().set("Bid", -5);
        assert!(!validator.validate_property("Bid").unwrap().await.unwrap());

        assert_eq!(validator.messages("Bid").len(), 2);
        assert_eq!(events.lock().len(), 2);
    }
}
