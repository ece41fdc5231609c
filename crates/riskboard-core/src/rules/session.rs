//! In-memory state behind the rule editor.
//!
//! A session is an ordered map from rule key to rule. Removing a rule leaves a
//! tombstone under its key, drops the key from the live order, releases any
//! input state the editor stored for it and notifies listeners registered for
//! that key. All mutation goes through the methods here.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::loader::compile_rule;
use super::types::{NewDecisionRule, RuleDefinition};

pub type RemovalListener = Box<dyn FnOnce(&str) + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no live rule with key {0}")]
    UnknownKey(String),
    #[error("new order must list each live key exactly once: {0}")]
    InvalidOrder(String),
}

#[derive(Debug, Clone)]
enum SessionEntry {
    Active(RuleDefinition),
    Removed,
}

#[derive(Default)]
pub struct RuleEditSession {
    entries: HashMap<String, SessionEntry>,
    order: Vec<String>,
    inputs: HashMap<String, HashMap<String, String>>,
    listeners: HashMap<String, Vec<RemovalListener>>,
}

impl fmt::Debug for RuleEditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEditSession")
            .field("order", &self.order)
            .field("entries", &self.entries)
            .field("inputs", &self.inputs)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RuleEditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session from loaded rules, keeping their order. Keys that
    /// collide (two score rules for one decision) fall back to `rule_<n>`.
    pub fn from_rules(rules: &[RuleDefinition]) -> Self {
        let mut session = Self::new();
        for (index, rule) in rules.iter().enumerate() {
            let mut rule = rule.clone();
            if session.entries.contains_key(&rule.key) {
                rule.key = format!("rule_{}", index + 1);
            }
            session.order.push(rule.key.clone());
            session
                .entries
                .insert(rule.key.clone(), SessionEntry::Active(rule));
        }
        session
    }

    /// Add a rule at the end, or replace the rule already live under `key`
    /// in place. A tombstoned key comes back at the end.
    pub fn insert(&mut self, key: impl Into<String>, rule: NewDecisionRule) {
        let key = key.into();
        let mut definition = compile_rule(self.order.len() + 1, rule);
        definition.key = key.clone();

        let was_live = matches!(self.entries.get(&key), Some(SessionEntry::Active(_)));
        self.entries.insert(key.clone(), SessionEntry::Active(definition));
        if !was_live {
            self.order.push(key);
        }
    }

    /// Tombstone `key`. Returns false when there was nothing live to remove.
    pub fn mark_removed(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if !matches!(entry, SessionEntry::Active(_)) {
            return false;
        }
        *entry = SessionEntry::Removed;

        self.order.retain(|live| live != key);
        self.inputs.remove(key);
        for listener in self.listeners.remove(key).unwrap_or_default() {
            listener(key);
        }
        debug!(key, "rule removed from edit session");
        true
    }

    /// Replace the live order. `new_order` must be a permutation of the
    /// current live keys.
    pub fn reorder<S: AsRef<str>>(&mut self, new_order: &[S]) -> Result<(), SessionError> {
        if new_order.len() != self.order.len() {
            return Err(SessionError::InvalidOrder(format!(
                "expected {} keys, got {}",
                self.order.len(),
                new_order.len()
            )));
        }

        let mut seen = HashSet::new();
        for key in new_order.iter().map(AsRef::as_ref) {
            if !self.is_live(key) {
                return Err(SessionError::UnknownKey(key.to_string()));
            }
            if !seen.insert(key) {
                return Err(SessionError::InvalidOrder(format!("{key} listed twice")));
            }
        }

        self.order = new_order.iter().map(|key| key.as_ref().to_string()).collect();
        Ok(())
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_live(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(SessionEntry::Active(_)))
    }

    pub fn is_removed(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(SessionEntry::Removed))
    }

    pub fn get(&self, key: &str) -> Option<&RuleDefinition> {
        match self.entries.get(key) {
            Some(SessionEntry::Active(rule)) => Some(rule),
            _ => None,
        }
    }

    /// Live `(key, rule)` pairs in display order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &RuleDefinition)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.get(key).map(|rule| (key.as_str(), rule)))
    }

    /// The live rules in the form the rule table stores them.
    pub fn to_new_rules(&self) -> Vec<NewDecisionRule> {
        self.rules().map(|(_, rule)| rule.to_new_rule()).collect()
    }

    /// Run `listener` once when `key` is removed.
    pub fn on_removed(
        &mut self,
        key: &str,
        listener: impl FnOnce(&str) + Send + 'static,
    ) -> Result<(), SessionError> {
        if !self.is_live(key) {
            return Err(SessionError::UnknownKey(key.to_string()));
        }
        self.listeners
            .entry(key.to_string())
            .or_default()
            .push(Box::new(listener));
        Ok(())
    }

    /// Editor input state scoped to a live rule.
    pub fn set_input(
        &mut self,
        key: &str,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !self.is_live(key) {
            return Err(SessionError::UnknownKey(key.to_string()));
        }
        self.inputs
            .entry(key.to_string())
            .or_default()
            .insert(field.into(), value.into());
        Ok(())
    }

    pub fn input(&self, key: &str, field: &str) -> Option<&str> {
        self.inputs
            .get(key)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
    }
}
