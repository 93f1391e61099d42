//! Group rule comparing two numeric properties of the same entity

use crate::entity::Validatable;
use crate::rules::{GroupRule, RuleContext, RuleOutcome, RuleResult, SyncRule};
use crate::validators::numeric::NumericRule;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Self::Less => left < right,
            Self::LessOrEqual => left <= right,
            Self::Equal => left == right,
            Self::GreaterOrEqual => left >= right,
            Self::Greater => left > right,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Less => "less than",
            Self::LessOrEqual => "less than or equal to",
            Self::Equal => "equal to",
            Self::GreaterOrEqual => "greater than or equal to",
            Self::Greater => "greater than",
        };
        f.write_str(text)
    }
}

/// Requires `left <comparison> right` between two numeric properties.
///
/// Missing or non-numeric values are left to single-property rules and pass here.
#[derive(Debug, Clone)]
pub struct CompareRule {
    pub left: String,
    pub comparison: Comparison,
    pub right: String,
    pub message: Option<String>,
}

impl CompareRule {
    pub fn new(left: impl Into<String>, comparison: Comparison, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            comparison,
            right: right.into(),
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Group rule caused by and reported under both compared properties
    pub fn into_group(self) -> GroupRule {
        let properties = [self.left.clone(), self.right.clone()];
        GroupRule::sync(self).over(properties)
    }
}

impl SyncRule<dyn Validatable> for CompareRule {
    fn check(&self, entity: &(dyn Validatable + 'static), _ctx: &RuleContext<'_>) -> RuleResult {
        let left = entity
            .property_value(&self.left)
            .and_then(|v| NumericRule::numeric_value(&v));
        let right = entity
            .property_value(&self.right)
            .and_then(|v| NumericRule::numeric_value(&v));

        let (Some(left), Some(right)) = (left, right) else {
            return Ok(RuleOutcome::Valid);
        };

        Ok(RuleOutcome::check(self.comparison.holds(left, right), || {
            self.message.clone().unwrap_or_else(|| {
                format!("{} must be {} {}", self.left, self.comparison, self.right)
            })
        }))
    }

    fn rule_name(&self) -> &str {
        "compare"
    }
}
