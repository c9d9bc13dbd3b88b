//! Key/value state attached to executions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value state attached to a job or step execution.
///
/// A step can stash progress here; when the step is restarted after a failure
/// the new execution starts from the previous context. The context tracks
/// whether it has been modified since it was created or last marked clean.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(flatten)]
    entries: Map<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, marking the context dirty.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Returns the integer stored under `key`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Returns whether a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns an iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the context has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether the context changed since it was last marked clean.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the context clean, typically after it has been persisted.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(String, Value)> for ExecutionContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            dirty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_marks_dirty() {
        let mut ctx = ExecutionContext::new();
        assert!(!ctx.is_dirty());

        ctx.put("count", 3);
        ctx.put("name", "partition0");
        assert!(ctx.is_dirty());
        assert_eq!(ctx.get_i64("count"), Some(3));
        assert_eq!(ctx.get_str("name"), Some("partition0"));

        ctx.clear_dirty();
        assert!(!ctx.is_dirty());
        assert!(ctx.remove("count").is_some());
        assert!(ctx.is_dirty());
    }

    #[test]
    fn missing_key_and_wrong_type() {
        let mut ctx = ExecutionContext::new();
        ctx.put("name", "x");
        assert_eq!(ctx.get_i64("name"), None);
        assert_eq!(ctx.get_str("absent"), None);
    }
}
