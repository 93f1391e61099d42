//! Pattern-based rule using regular expressions

use crate::rules::{RuleContext, RuleOutcome, RuleResult, SyncRule};
use regex::Regex;
use serde_json::Value;

/// Rule requiring a string property to match a regular expression
#[derive(Debug, Clone)]
pub struct PatternRule {
    pattern: Regex,
    /// `pattern` wrapped so it must span the whole text
    anchored: Regex,
    pub message: Option<String>,
    /// Match the entire string (default) or just find a match
    pub full_match: bool,
}

impl PatternRule {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::from_regex(Regex::new(pattern)?)
    }

    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(&format!("(?i){}", pattern))
    }

    pub fn from_regex(regex: Regex) -> Result<Self, regex::Error> {
        let anchored = Regex::new(&format!(r"\A(?:{})\z", regex.as_str()))?;
        Ok(Self {
            pattern: regex,
            anchored,
            message: None,
            full_match: true,
        })
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn full_match(mut self, full_match: bool) -> Self {
        self.full_match = full_match;
        self
    }

    pub fn pattern_string(&self) -> &str {
        self.pattern.as_str()
    }

    fn matches(&self, text: &str) -> bool {
        if self.full_match {
            self.anchored.is_match(text)
        } else {
            self.pattern.is_match(text)
        }
    }
}

impl SyncRule<Value> for PatternRule {
    fn check(&self, value: &Value, ctx: &RuleContext<'_>) -> RuleResult {
        if value.is_null() {
            return Ok(RuleOutcome::Valid);
        }

        let Some(text) = value.as_str() else {
            return Ok(RuleOutcome::invalid(format!(
                "{} must be a string for pattern validation",
                ctx.label()
            )));
        };

        Ok(RuleOutcome::check(self.matches(text), || {
            self.message.clone().unwrap_or_else(|| {
                format!("{} does not match the required pattern", ctx.label())
            })
        }))
    }

    fn rule_name(&self) -> &str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PropertyBag;

    fn check(rule: &PatternRule, value: Value) -> RuleOutcome {
        let entity = PropertyBag::new();
        rule.check(&value, &RuleContext::new(Some("Code"), &entity))
            .unwrap()
    }

    #[test]
    fn test_pattern_full_match() {
        let rule = PatternRule::new(r"[A-Z]{3}").unwrap();
        assert!(check(&rule, Value::from("ABC")).is_valid());
        assert_eq!(
            check(&rule, Value::from("xABCx")),
            RuleOutcome::invalid("Code does not match the required pattern")
        );
    }

    #[test]
    fn test_full_match_tries_every_alternative() {
        let rule = PatternRule::new("a|ab").unwrap();
        assert!(check(&rule, Value::from("a")).is_valid());
        assert!(check(&rule, Value::from("ab")).is_valid());
        assert!(!check(&rule, Value::from("abb")).is_valid());

        let rule = PatternRule::from_regex(Regex::new(r"\d+|\d+-[A-Z]").unwrap()).unwrap();
        assert!(check(&rule, Value::from("12-B")).is_valid());
        assert_eq!(rule.pattern_string(), r"\d+|\d+-[A-Z]");
    }

    #[test]
    fn test_pattern_partial_match() {
        let rule = PatternRule::new(r"[A-Z]{3}").unwrap().full_match(false);
        assert!(check(&rule, Value::from("xABCx")).is_valid());
    }

    #[test]
    fn test_pattern_case_insensitive_and_types() {
        let rule = PatternRule::new_case_insensitive(r"lot-\d+")
            .unwrap()
            .message("Lot codes look like LOT-12");
        assert!(check(&rule, Value::from("LOT-12")).is_valid());
        assert_eq!(check(&rule, Value::from("12")), RuleOutcome::invalid("Lot codes look like LOT-12"));
        assert!(!check(&rule, Value::from(12)).is_valid());
        assert!(check(&rule, Value::Null).is_valid());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(PatternRule::new(r"(unclosed").is_err());
    }
}
