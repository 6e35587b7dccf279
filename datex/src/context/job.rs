//! Job-scoped shared state.
//!
//! One [`JobContext`] exists per run. It is `Arc`-shared with every stage and
//! every transaction context, so all mutation goes through interior
//! mutability. The error flag is the single authoritative halt signal: once
//! set it is never cleared for the remainder of the run, and the engine polls
//! it at every stage boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::store::ContextStore;
use super::symbols::SymbolTable;

/// Shared state for one job run.
#[derive(Debug)]
pub struct JobContext {
    /// Job name from configuration.
    name: String,
    /// Unique id of this run.
    id: Uuid,
    /// Symbol table, seeded at open.
    symbols: RwLock<SymbolTable>,
    /// Halt signal. Sticky for the whole run.
    error: AtomicBool,
    /// Most recent failure description.
    error_message: RwLock<Option<String>>,
    /// Free-form state label maintained by the engine.
    state: RwLock<String>,
    /// When the run started.
    started_at: RwLock<Option<DateTime<Utc>>>,
    /// When the run ended.
    ended_at: RwLock<Option<DateTime<Utc>>>,
    /// Records completed so far.
    frames_processed: AtomicU64,
    /// Cross-run store, present while the context is open.
    store: RwLock<Option<ContextStore>>,
}

impl JobContext {
    /// Creates a context for a named job.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
            symbols: RwLock::new(SymbolTable::new()),
            error: AtomicBool::new(false),
            error_message: RwLock::new(None),
            state: RwLock::new("new".to_string()),
            started_at: RwLock::new(None),
            ended_at: RwLock::new(None),
            frames_processed: AtomicU64::new(0),
            store: RwLock::new(None),
        }
    }

    /// The job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique id of this run.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Sets a symbol.
    pub fn set_symbol(&self, name: impl Into<String>, value: impl Into<String>) {
        self.symbols.write().set(name, value);
    }

    /// Returns a symbol's value.
    #[must_use]
    pub fn get_symbol(&self, name: &str) -> Option<String> {
        self.symbols.read().get(name).map(str::to_string)
    }

    /// Returns a snapshot of the whole symbol table.
    #[must_use]
    pub fn symbols(&self) -> SymbolTable {
        self.symbols.read().clone()
    }

    /// Raises the halt signal with a failure description.
    ///
    /// The flag stays set for the rest of the run; a later call replaces the
    /// message but cannot clear the flag.
    pub fn fail(&self, message: impl Into<String>) {
        self.error.store(true, Ordering::SeqCst);
        *self.error_message.write() = Some(message.into());
    }

    /// True when the halt signal is raised.
    #[must_use]
    pub fn is_in_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// The most recent failure description, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    /// Sets the state label.
    pub fn set_state(&self, state: impl Into<String>) {
        *self.state.write() = state.into();
    }

    /// The current state label.
    #[must_use]
    pub fn state(&self) -> String {
        self.state.read().clone()
    }

    /// Stamps the start of the run.
    pub fn mark_started(&self) {
        *self.started_at.write() = Some(Utc::now());
    }

    /// Stamps the end of the run. A second call has no effect, so closing
    /// twice does not move the end time.
    pub fn mark_ended(&self) {
        let mut ended = self.ended_at.write();
        if ended.is_none() {
            *ended = Some(Utc::now());
        }
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.read()
    }

    /// When the run ended.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.ended_at.read()
    }

    /// Counts one completed record, returning the new total.
    pub fn record_frame(&self) -> u64 {
        self.frames_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records completed so far.
    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    /// Attaches the cross-run store for the duration of the run.
    pub fn attach_store(&self, store: ContextStore) {
        *self.store.write() = Some(store);
    }

    /// True when a cross-run store is attached.
    #[must_use]
    pub fn has_store(&self) -> bool {
        self.store.read().is_some()
    }

    /// Returns a value from the attached store.
    #[must_use]
    pub fn store_get(&self, key: &str) -> Option<Value> {
        self.store.read().as_ref().and_then(|s| s.get(key).cloned())
    }

    /// Sets a value in the attached store. Returns false when no store is
    /// attached.
    pub fn store_set(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.store.write().as_mut() {
            Some(store) => {
                store.set(key, value);
                true
            }
            None => false,
        }
    }

    /// Detaches the store so the caller can flush and release it.
    pub fn take_store(&self) -> Option<ContextStore> {
        self.store.write().take()
    }

    /// Takes a serializable snapshot for runners, listeners and the control
    /// API.
    #[must_use]
    pub fn status(&self) -> ContextStatus {
        let started_at = self.started_at();
        let ended_at = self.ended_at();
        let duration_ms = started_at.map(|start| {
            let end = ended_at.unwrap_or_else(Utc::now);
            u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
        });
        ContextStatus {
            job: self.name.clone(),
            id: self.id,
            state: self.state(),
            error: self.is_in_error(),
            message: self.error_message(),
            frames_processed: self.frames_processed(),
            started_at,
            ended_at,
            duration_ms,
        }
    }
}

/// A point-in-time view of a job context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStatus {
    /// Job name.
    pub job: String,
    /// Run id.
    pub id: Uuid,
    /// State label at snapshot time.
    pub state: String,
    /// Whether the halt signal was raised.
    pub error: bool,
    /// Failure description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Records completed.
    pub frames_processed: u64,
    /// Start of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// End of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Elapsed milliseconds, running or final.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_error_flag_is_sticky() {
        let ctx = JobContext::new("job");
        assert!(!ctx.is_in_error());

        ctx.fail("reader exploded");
        assert!(ctx.is_in_error());
        assert_eq!(ctx.error_message().as_deref(), Some("reader exploded"));

        ctx.fail("writer exploded");
        assert!(ctx.is_in_error());
        assert_eq!(ctx.error_message().as_deref(), Some("writer exploded"));
    }

    #[test]
    fn test_frame_counter() {
        let ctx = JobContext::new("job");
        assert_eq!(ctx.record_frame(), 1);
        assert_eq!(ctx.record_frame(), 2);
        assert_eq!(ctx.frames_processed(), 2);
    }

    #[test]
    fn test_mark_ended_only_once() {
        let ctx = JobContext::new("job");
        ctx.mark_started();
        ctx.mark_ended();
        let first = ctx.ended_at();
        ctx.mark_ended();
        assert_eq!(ctx.ended_at(), first);
    }

    #[test]
    fn test_symbols_through_context() {
        let ctx = JobContext::new("job");
        ctx.set_symbol("mode", "full");
        assert_eq!(ctx.get_symbol("mode").as_deref(), Some("full"));
        assert_eq!(ctx.get_symbol("unset"), None);
    }

    #[test]
    fn test_store_round_trip_through_context() {
        let dir = tempdir().unwrap();
        let ctx = JobContext::new("job");
        assert!(!ctx.store_set("orphan", 1));

        ctx.attach_store(ContextStore::open(&dir.path().join("store.json")).unwrap());
        assert!(ctx.store_set("runs", 3));
        assert_eq!(ctx.store_get("runs"), Some(serde_json::json!(3)));

        let store = ctx.take_store().unwrap();
        assert!(!ctx.has_store());
        drop(store);
    }

    #[test]
    fn test_status_snapshot_serializes() {
        let ctx = JobContext::new("nightly");
        ctx.mark_started();
        ctx.set_state("running");
        ctx.record_frame();

        let status = ctx.status();
        assert_eq!(status.job, "nightly");
        assert_eq!(status.frames_processed, 1);
        assert!(status.duration_ms.is_some());

        let text = serde_json::to_string(&status).unwrap();
        assert!(text.contains("\"state\":\"running\""));
    }
}
