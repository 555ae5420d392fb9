//! Run-scoped variables shared between guest scripts and `{{name}}` substitution.
use indexmap::IndexMap;
use serde_json::Value;

/// Mutable variable map living as long as one [`crate::Runner::run`]. Scripts write it through
/// `client.global`, and the built-in `$uuid`/`$timestamp`/`$randomInt` are refreshed into it before
/// every substitution. Nothing clears it implicitly.
#[derive(Debug, Clone, Default)]
pub struct GlobalsStore {
    storage: IndexMap<String, Value>,
}

impl GlobalsStore {
    pub fn new() -> GlobalsStore {
        GlobalsStore::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.storage.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.storage.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&mut self, name: &str) {
        self.storage.shift_remove(name);
    }

    pub fn clear_all(&mut self) {
        self.storage.clear();
    }
}
