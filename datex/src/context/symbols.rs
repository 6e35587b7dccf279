//! The job-scoped symbol table.
//!
//! Symbols are plain string name/value pairs. The engine seeds the well-known
//! entries below when it opens the job context; afterwards only explicit
//! symbol-set operations (tasks, or code holding the context) may change them.

use std::collections::BTreeMap;

/// Symbol holding the job name.
pub const SYM_JOB_NAME: &str = "job.name";
/// Symbol holding the unique id of this run.
pub const SYM_JOB_ID: &str = "job.id";
/// Symbol holding the installation home directory.
pub const SYM_HOME_DIR: &str = "dir.home";
/// Symbol holding the working directory.
pub const SYM_WORK_DIR: &str = "dir.work";
/// Symbol holding the directory of the job configuration file.
pub const SYM_JOB_DIR: &str = "dir.job";
/// Symbol holding the run date (`YYYY-MM-DD`).
pub const SYM_RUN_DATE: &str = "run.date";
/// Symbol holding the run time (`HH:MM:SS`, UTC).
pub const SYM_RUN_TIME: &str = "run.time";

/// A sorted name→value table.
///
/// Sorted iteration keeps symbol dumps (the `LogContext` task, status
/// output) stable across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    entries: BTreeMap<String, String>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a symbol, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Returns a symbol's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Returns true when the symbol exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Removes a symbol, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no symbols are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates symbols in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, String)> for SymbolTable {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let mut symbols = SymbolTable::new();
        symbols.set(SYM_JOB_NAME, "nightly");
        assert_eq!(symbols.get(SYM_JOB_NAME), Some("nightly"));
        assert_eq!(symbols.get("unset"), None);
    }

    #[test]
    fn test_sorted_iteration() {
        let mut symbols = SymbolTable::new();
        symbols.set("zeta", "1");
        symbols.set("alpha", "2");

        let names: Vec<_> = symbols.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_remove() {
        let mut symbols = SymbolTable::new();
        symbols.set("mode", "full");
        assert_eq!(symbols.remove("mode"), Some("full".to_string()));
        assert!(symbols.is_empty());
    }
}
