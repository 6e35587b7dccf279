//! Tracing setup and the in-memory log ring served by the control API.
//!
//! Every tracing event is rendered to a single line and appended to a named
//! [`LogBuffer`], keyed by the first segment of the event target. The control
//! API tails and clears these buffers remotely, so a service can be inspected
//! without shell access to its log files.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Lines retained per buffer before the oldest entry is evicted.
const DEFAULT_CAPACITY: usize = 1000;

/// Installs the global subscriber: env-filtered console output plus the
/// buffer layer feeding `logs`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing(logs: &LogRegistry) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(logs.layer())
        .try_init();
}

/// A bounded ring of rendered log lines.
///
/// Cloning is cheap and every clone shares the same storage.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Creates a buffer that retains at most `capacity` lines.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest when the ring is full.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Returns up to `count` of the newest lines, oldest first.
    ///
    /// When `contains` is set, only lines containing that substring are
    /// considered.
    #[must_use]
    pub fn tail(&self, count: usize, contains: Option<&str>) -> Vec<String> {
        let lines = self.lines.lock();
        let mut selected: Vec<String> = lines
            .iter()
            .filter(|line| contains.map_or(true, |needle| line.contains(needle)))
            .cloned()
            .collect();
        let skip = selected.len().saturating_sub(count);
        selected.drain(..skip);
        selected
    }

    /// Discards every retained line.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Number of lines currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// True when no lines are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// Named log buffers, created on demand.
#[derive(Debug, Clone, Default)]
pub struct LogRegistry {
    buffers: Arc<DashMap<String, LogBuffer>>,
}

impl LogRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer for `name`, creating it if absent.
    pub fn buffer(&self, name: impl Into<String>) -> LogBuffer {
        self.buffers.entry(name.into()).or_default().clone()
    }

    /// Returns the buffer for `name` if one has been created.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<LogBuffer> {
        self.buffers.get(name).map(|entry| entry.clone())
    }

    /// Names of every buffer created so far, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// A tracing layer that renders events into this registry.
    #[must_use]
    pub fn layer(&self) -> BufferLayer {
        BufferLayer {
            registry: self.clone(),
        }
    }
}

/// Tracing layer that appends each event to the buffer named after the first
/// segment of the event target.
#[derive(Debug, Clone)]
pub struct BufferLayer {
    registry: LogRegistry,
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        let name = meta
            .target()
            .split("::")
            .next()
            .unwrap_or("service")
            .to_string();
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let line = format!(
            "{stamp} {:>5} {} {}",
            meta.level(),
            meta.target(),
            visitor.rendered()
        );
        self.registry.buffer(name).push(line);
    }
}

/// Collects an event's message and fields into one display line.
#[derive(Debug, Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn rendered(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_evicts_oldest_at_capacity() {
        let buffer = LogBuffer::with_capacity(3);
        for n in 1..=5 {
            buffer.push(format!("line {n}"));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.tail(10, None), vec!["line 3", "line 4", "line 5"]);
    }

    #[test]
    fn test_tail_returns_newest_lines_oldest_first() {
        let buffer = LogBuffer::default();
        for n in 1..=4 {
            buffer.push(format!("line {n}"));
        }

        assert_eq!(buffer.tail(2, None), vec!["line 3", "line 4"]);
    }

    #[test]
    fn test_tail_filters_by_substring() {
        let buffer = LogBuffer::default();
        buffer.push("job alpha started");
        buffer.push("job beta started");
        buffer.push("job alpha finished");

        let lines = buffer.tail(10, Some("alpha"));
        assert_eq!(lines, vec!["job alpha started", "job alpha finished"]);
    }

    #[test]
    fn test_clear_discards_everything() {
        let buffer = LogBuffer::default();
        buffer.push("one");
        buffer.push("two");
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.tail(10, None).is_empty());
    }

    #[test]
    fn test_registry_shares_storage_between_handles() {
        let registry = LogRegistry::new();
        registry.buffer("engine").push("first");

        let other = registry.get("engine").unwrap();
        assert_eq!(other.tail(10, None), vec!["first"]);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_names_are_sorted() {
        let registry = LogRegistry::new();
        registry.buffer("zulu");
        registry.buffer("alpha");
        registry.buffer("mike");

        assert_eq!(registry.names(), vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn test_layer_routes_events_by_target_prefix() {
        let registry = LogRegistry::new();
        let subscriber = tracing_subscriber::registry().with(registry.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(job = "demo", "run finished");
        });

        let buffer = registry.get("datex").expect("buffer for crate target");
        let lines = buffer.tail(10, None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("run finished"));
        assert!(lines[0].contains("job=demo"));
        assert!(lines[0].contains("INFO"));
    }
}
