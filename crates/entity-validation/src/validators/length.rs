//! Length rule for strings and arrays

use crate::rules::{RuleContext, RuleOutcome, RuleResult, SyncRule};
use serde_json::Value;

/// Rule for string/array length constraints
#[derive(Debug, Clone, Default)]
pub struct LengthRule {
    /// Minimum length (inclusive)
    pub min: Option<usize>,
    /// Maximum length (inclusive)
    pub max: Option<usize>,
    pub message: Option<String>,
}

impl LengthRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn range(self, min: usize, max: usize) -> Self {
        self.min(min).max(max)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn length_of(value: &Value) -> Option<usize> {
        match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(arr) => Some(arr.len()),
            _ => None,
        }
    }

    fn error_message(&self, label: &str) -> String {
        if let Some(ref custom_message) = self.message {
            return custom_message.clone();
        }

        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => {
                format!("{} must be exactly {} characters long", label, min)
            }
            (Some(min), Some(max)) => {
                format!("{} must be between {} and {} characters long", label, min, max)
            }
            (Some(min), None) => format!("{} must be at least {} characters long", label, min),
            (None, Some(max)) => format!("{} must be at most {} characters long", label, max),
            (None, None) => format!("{} has an invalid length", label),
        }
    }
}

impl SyncRule<Value> for LengthRule {
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> RuleResult {
        if value.is_null() {
            return Ok(RuleOutcome::Valid);
        }

        let Some(length) = Self::length_of(value) else {
            return Ok(RuleOutcome::invalid(format!(
                "{} must be a string or a list",
                ctx.label()
            )));
        };

        let too_short = self.min.is_some_and(|min| length < min);
        let too_long = self.max.is_some_and(|max| length > max);

        Ok(RuleOutcome::check(!too_short && !too_long, || {
            self.error_message(ctx.label())
        }))
    }

    fn rule_name(&self) -> &str {
        "length"
    }
}
