//! Validation messages and the keys they are reported under

use crate::rules::RuleId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// Where a message in the merged view came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// A single-property rule or a manually added message
    Property,
    /// A group rule spanning one or more properties
    Group,
}

/// Key under which messages are reported.
///
/// Group rules without affected properties report under [`MessageKey::Entity`],
/// which can never collide with a real property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKey {
    Property(String),
    Entity,
}

impl MessageKey {
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    /// Property name, or `None` for the entity-wide key
    pub fn property_name(&self) -> Option<&str> {
        match self {
            Self::Property(name) => Some(name),
            Self::Entity => None,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => write!(f, "{}", name),
            Self::Entity => write!(f, "<entity>"),
        }
    }
}

impl From<&str> for MessageKey {
    fn from(name: &str) -> Self {
        Self::Property(name.to_string())
    }
}

impl From<String> for MessageKey {
    fn from(name: String) -> Self {
        Self::Property(name)
    }
}

/// An immutable validation finding.
///
/// Two messages with identical text are the same finding for diffing purposes,
/// even when constructed independently. See [`same_message_set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    severity: Severity,
    text: String,
    show_on_field: bool,
    show_in_summary: bool,
    origin: Option<MessageOrigin>,
    /// Rule that produced this message, `None` for manually added messages
    #[serde(skip)]
    rule: Option<RuleId>,
}

impl ValidationMessage {
    /// Create a message with the given severity, shown both on the field and in the summary
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            show_on_field: true,
            show_in_summary: true,
            origin: None,
            rule: None,
        }
    }

    /// Create an error-level message
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    /// Create a warning-level message
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn show_on_field(mut self, show: bool) -> Self {
        self.show_on_field = show;
        self
    }

    pub fn show_in_summary(mut self, show: bool) -> Self {
        self.show_in_summary = show;
        self
    }

    pub(crate) fn produced_by(mut self, rule: RuleId) -> Self {
        self.rule = Some(rule);
        self
    }

    pub(crate) fn with_origin(mut self, origin: MessageOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_shown_on_field(&self) -> bool {
        self.show_on_field
    }

    pub fn is_shown_in_summary(&self) -> bool {
        self.show_in_summary
    }

    pub fn origin(&self) -> Option<MessageOrigin> {
        self.origin
    }

    pub fn rule(&self) -> Option<RuleId> {
        self.rule
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether both messages describe the same finding
    pub fn same_finding(&self, other: &ValidationMessage) -> bool {
        self.text == other.text
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.text),
            Severity::Warning => write!(f, "warning: {}", self.text),
        }
    }
}

/// Set equality over message text, ignoring order, duplicates and instance identity
pub fn same_message_set(left: &[ValidationMessage], right: &[ValidationMessage]) -> bool {
    let left: HashSet<&str> = left.iter().map(|m| m.text()).collect();
    let right: HashSet<&str> = right.iter().map(|m| m.text()).collect();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_defaults() {
        let message = ValidationMessage::error("Bid must be positive");
        assert_eq!(message.severity(), Severity::Error);
        assert!(message.is_shown_on_field());
        assert!(message.is_shown_in_summary());
        assert!(message.origin().is_none());
        assert!(message.rule().is_none());
    }

    #[test]
    fn test_same_message_set_ignores_order_and_instances() {
        let first = vec![
            ValidationMessage::error("a"),
            ValidationMessage::warning("b"),
        ];
        let second = vec![
            ValidationMessage::warning("b"),
            ValidationMessage::error("a"),
        ];
        assert!(same_message_set(&first, &second));
        assert!(!same_message_set(&first, &second[..1]));
        assert!(same_message_set(&[], &[]));
    }

    #[test]
    fn test_message_key_display() {
        assert_eq!(MessageKey::property("Bid").to_string(), "Bid");
        assert_eq!(MessageKey::Entity.to_string(), "<entity>");
        assert_eq!(MessageKey::Entity.property_name(), None);
        assert_eq!(MessageKey::from("Bid").property_name(), Some("Bid"));
    }

    #[test]
    fn test_message_serializes_without_rule_identity() {
        let message = ValidationMessage::warning("check later").show_in_summary(false);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["severity"], "Warning");
        assert_eq!(json["show_in_summary"], false);
        assert!(json.get("rule").is_none());
    }
}
