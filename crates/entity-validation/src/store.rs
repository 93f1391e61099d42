//! Authoritative message state and the merged view observers read

use crate::message::{same_message_set, MessageKey, MessageOrigin, Severity, ValidationMessage};
use crate::rules::RuleId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Index;

/// How a property result is written into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyMode {
    /// Explicit or full validation: the new messages replace the old set
    Replace,
    /// Implicit validation: only messages of the participating rules are
    /// replaced, everything else (other rules, manual messages) is kept
    Merge(HashSet<RuleId>),
}

#[derive(Debug, Clone)]
struct GroupEntry {
    keys: Vec<MessageKey>,
    message: ValidationMessage,
}

#[derive(Debug, Default)]
struct StoreState {
    properties: HashMap<String, Vec<ValidationMessage>>,
    groups: BTreeMap<RuleId, GroupEntry>,
}

impl StoreState {
    fn write_property(&mut self, property: &str, messages: Vec<ValidationMessage>) -> bool {
        let old = self
            .properties
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if same_message_set(old, &messages) {
            return false;
        }

        if messages.is_empty() {
            self.properties.remove(property);
        } else {
            self.properties.insert(property.to_string(), messages);
        }
        true
    }
}

/// Keep the first message of each text
fn dedup_by_text(messages: impl IntoIterator<Item = ValidationMessage>) -> Vec<ValidationMessage> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|message| seen.insert(message.text().to_string()))
        .collect()
}

/// Holds per-property messages and per-group-rule messages.
///
/// Every operation takes the lock once, so readers never observe half of an update.
#[derive(Debug, Default)]
pub struct MessageStore {
    state: Mutex<StoreState>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the result of evaluating one property; returns whether its message set changed
    pub fn apply_property_result(
        &self,
        property: &str,
        messages: Vec<ValidationMessage>,
        mode: &ApplyMode,
    ) -> bool {
        let mut state = self.state.lock();
        let next = match mode {
            ApplyMode::Replace => dedup_by_text(messages),
            ApplyMode::Merge(participating) => {
                let kept = state
                    .properties
                    .get(property)
                    .into_iter()
                    .flatten()
                    .filter(|message| {
                        message
                            .rule()
                            .map_or(true, |rule| !participating.contains(&rule))
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                dedup_by_text(kept.into_iter().chain(messages))
            }
        };
        state.write_property(property, next)
    }

    /// Write the result of one group rule; returns whether its message changed
    pub fn apply_group_result(
        &self,
        group: RuleId,
        keys: &[MessageKey],
        message: Option<ValidationMessage>,
    ) -> bool {
        let mut state = self.state.lock();
        match message {
            None => state.groups.remove(&group).is_some(),
            Some(message) => {
                if let Some(entry) = state.groups.get(&group) {
                    if entry.message.same_finding(&message) {
                        return false;
                    }
                }
                state.groups.insert(
                    group,
                    GroupEntry {
                        keys: keys.to_vec(),
                        message,
                    },
                );
                true
            }
        }
    }

    /// Union manually added messages into a property's set
    pub fn add_messages(&self, property: &str, messages: Vec<ValidationMessage>) -> bool {
        let mut state = self.state.lock();
        let current = state.properties.get(property).cloned().unwrap_or_default();
        let next = dedup_by_text(current.into_iter().chain(messages));
        state.write_property(property, next)
    }

    /// Messages stored for a property by single-property rules and manual additions
    pub fn property_messages(&self, property: &str) -> Vec<ValidationMessage> {
        self.state
            .lock()
            .properties
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the merged view
    pub fn all_messages(&self) -> MergedView {
        let state = self.state.lock();
        let mut entries: BTreeMap<MessageKey, Vec<ValidationMessage>> = BTreeMap::new();

        for (property, messages) in &state.properties {
            entries.insert(
                MessageKey::Property(property.clone()),
                messages
                    .iter()
                    .cloned()
                    .map(|m| m.with_origin(MessageOrigin::Property))
                    .collect(),
            );
        }

        for entry in state.groups.values() {
            for key in &entry.keys {
                entries
                    .entry(key.clone())
                    .or_default()
                    .push(entry.message.clone().with_origin(MessageOrigin::Group));
            }
        }

        MergedView { entries }
    }

    /// Remove every message, returning the keys that had any
    pub fn clear(&self) -> Vec<MessageKey> {
        let mut state = self.state.lock();
        let mut keys: Vec<MessageKey> = state
            .properties
            .drain()
            .map(|(property, _)| MessageKey::Property(property))
            .collect();
        keys.sort();

        for (_, entry) in std::mem::take(&mut state.groups) {
            for key in entry.keys {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.properties.is_empty() && state.groups.is_empty()
    }
}

/// Read-only snapshot of all messages, by property (or entity) key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedView {
    entries: BTreeMap<MessageKey, Vec<ValidationMessage>>,
}

impl MergedView {
    pub fn get(&self, key: &MessageKey) -> &[ValidationMessage] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn property(&self, property: &str) -> &[ValidationMessage] {
        self.get(&MessageKey::property(property))
    }

    /// Messages of group rules that affect no specific property
    pub fn entity(&self) -> &[ValidationMessage] {
        self.get(&MessageKey::Entity)
    }

    pub fn keys(&self) -> impl Iterator<Item = &MessageKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MessageKey, &[ValidationMessage])> {
        self.entries.iter().map(|(key, messages)| (key, messages.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys with at least one message
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has_errors(&self) -> bool {
        self.has_severity(Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.has_severity(Severity::Warning)
    }

    fn has_severity(&self, severity: Severity) -> bool {
        self.entries
            .values()
            .flatten()
            .any(|message| message.severity() == severity)
    }

    /// Distinct messages flagged for the summary, a group message is listed once
    pub fn summary(&self) -> Vec<&ValidationMessage> {
        let mut seen = HashSet::new();
        self.entries
            .values()
            .flatten()
            .filter(|message| message.is_shown_in_summary())
            .filter(|message| seen.insert(message.text()))
            .collect()
    }
}

impl Index<&str> for MergedView {
    type Output = [ValidationMessage];

    fn index(&self, property: &str) -> &Self::Output {
        self.property(property)
    }
}
