//! Numeric value rules

use crate::rules::{RuleContext, RuleOutcome, RuleResult, SyncRule};
use serde_json::Value;

/// Rule for numeric constraints.
///
/// Reports at most one violation per check, the first constraint that fails.
#[derive(Debug, Clone, Default)]
pub struct NumericRule {
    /// Minimum value (inclusive)
    pub min: Option<f64>,
    /// Maximum value (inclusive)
    pub max: Option<f64>,
    /// Lower bound (exclusive)
    pub greater_than: Option<f64>,
    /// Upper bound (exclusive)
    pub less_than: Option<f64>,
    pub integer_only: bool,
    pub message: Option<String>,
}

impl NumericRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn greater_than(mut self, bound: f64) -> Self {
        self.greater_than = Some(bound);
        self
    }

    pub fn less_than(mut self, bound: f64) -> Self {
        self.less_than = Some(bound);
        self
    }

    pub fn integer_only(mut self, integer_only: bool) -> Self {
        self.integer_only = integer_only;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Extract numeric value from JSON Value
    pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
        match value {
            Value::Number(num) => num.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn violation(&self, label: &str, num: f64) -> Option<String> {
        let default = if self.integer_only && num.fract() != 0.0 {
            format!("{} must be an integer", label)
        } else if self.greater_than.is_some_and(|bound| num <= bound) {
            format!("{} must be greater than {}", label, self.greater_than?)
        } else if self.less_than.is_some_and(|bound| num >= bound) {
            format!("{} must be less than {}", label, self.less_than?)
        } else if self.min.is_some_and(|min| num < min) {
            format!("{} must be at least {}", label, self.min?)
        } else if self.max.is_some_and(|max| num > max) {
            format!("{} must be at most {}", label, self.max?)
        } else {
            return None;
        };

        Some(self.message.clone().unwrap_or(default))
    }
}

impl SyncRule<Value> for NumericRule {
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> RuleResult {
        // Skip validation for null values
        if value.is_null() {
            return Ok(RuleOutcome::Valid);
        }

        let num = match Self::numeric_value(value) {
            Some(num) if num.is_finite() => num,
            Some(_) => {
                return Ok(RuleOutcome::invalid(format!(
                    "{} must be a finite number",
                    ctx.label()
                )))
            }
            None => {
                return Ok(RuleOutcome::invalid(format!(
                    "{} must be a numeric value",
                    ctx.label()
                )))
            }
        };

        Ok(match self.violation(ctx.label(), num) {
            Some(text) => RuleOutcome::invalid(text),
            None => RuleOutcome::Valid,
        })
    }

    fn rule_name(&self) -> &str {
        "numeric"
    }
}
