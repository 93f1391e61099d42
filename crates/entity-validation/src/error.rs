//! Validation error types and handling

use thiserror::Error;

/// Result type for validator operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Error raised by a rule implementation while checking a value.
///
/// A rule that judges a value invalid returns [`RuleOutcome::Invalid`](crate::RuleOutcome);
/// this error type is reserved for faults inside the rule itself.
pub type RuleError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the validator.
///
/// Usage errors (`UnknownProperty`, `MissingArgument`, `NoRuntime`) are
/// returned synchronously and nothing is queued. The remaining variants fail
/// the handle of one specific request.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("No async runtime available to run validation")]
    NoRuntime,

    #[error("Rule '{rule}' failed on {target}: {source}")]
    Rule {
        rule: String,
        target: String,
        #[source]
        source: RuleError,
    },

    #[error("Rule '{rule}' panicked on {target}")]
    RulePanicked { rule: String, target: String },

    #[error("Validation request panicked")]
    Panicked,

    #[error("Request #{ticket} skipped because an earlier request failed")]
    PriorStepFailed { ticket: u64 },

    #[error("Validation sequencer shut down before request completed")]
    SequencerClosed,

    #[error("Timed out waiting for validation request")]
    Timeout,
}

impl ValidationError {
    /// Wrap a rule fault with the rule name and the property (or group) it ran on
    pub fn rule(rule: impl Into<String>, target: impl Into<String>, source: RuleError) -> Self {
        Self::Rule {
            rule: rule.into(),
            target: target.into(),
            source,
        }
    }

    /// Whether this error was caused by how the validator was called rather than by rule logic
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownProperty(_) | Self::MissingArgument(_) | Self::NoRuntime
        )
    }
}
