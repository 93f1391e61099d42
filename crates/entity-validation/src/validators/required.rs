//! Required property rule

use crate::rules::{RuleContext, RuleOutcome, RuleResult, SyncRule};
use serde_json::Value;

/// Rule that ensures a property is present and not empty
#[derive(Debug, Clone, Default)]
pub struct RequiredRule {
    pub message: Option<String>,
}

impl RequiredRule {
    pub fn new() -> Self {
        Self { message: None }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Check if a value is considered empty
    fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(arr) => arr.is_empty(),
            Value::Object(obj) => obj.is_empty(),
            _ => false,
        }
    }
}

impl SyncRule<Value> for RequiredRule {
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> RuleResult {
        Ok(RuleOutcome::check(!Self::is_empty(value), || {
            self.message
                .clone()
                .unwrap_or_else(|| format!("{} is required", ctx.label()))
        }))
    }

    fn rule_name(&self) -> &str {
        "required"
    }
}
