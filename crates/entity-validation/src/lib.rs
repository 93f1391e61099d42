//! # entity-validation
//!
//! Reactive validation for bound entities. Rules are registered once per
//! entity type, evaluated on demand or whenever a property changes, and
//! subscribers are notified only when the set of outstanding messages
//! actually changes.
//!
//! Requests issued against one [`EntityValidator`] run one at a time in issue
//! order; validators of different entities run independently.

pub mod config;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod message;
pub mod notifier;
pub mod rules;
pub mod sequencer;
pub mod store;
pub mod validator;
pub mod validators;

// Re-exports for easy access
pub use config::{ValidatorConfig, ValidatorConfigBuilder};
pub use entity::{PropertyBag, ToValidationValue, Validatable};
pub use error::{RuleError, ValidationError, ValidationResult};
pub use message::{MessageKey, MessageOrigin, Severity, ValidationMessage};
pub use notifier::{SubscriptionId, ValidationEvent};
pub use rules::{
    AsyncRule, GroupRule, Rule, RuleContext, RuleId, RuleKind, RuleOutcome, RuleResult,
    RuleSettings, Rules, SyncRule,
};
pub use sequencer::{RequestState, ValidationHandle};
pub use store::MergedView;
pub use validator::EntityValidator;

// Built-in rules
pub use validators::{
    AsyncCustomRule, CompareRule, Comparison, CustomRule, LengthRule, NumericRule, PatternRule,
    RequiredRule,
};
