//! Tracing capture for assertions on engine log output

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

/// One captured event: message plus its structured fields
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }
}

/// Layer recording every event it sees; clones share the buffer
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn matching(&self, pattern: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message.contains(pattern))
            .collect()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        !self.matching(pattern).is_empty()
    }

    pub fn contains_at(&self, level: Level, pattern: &str) -> bool {
        self.matching(pattern).iter().any(|e| e.level == level)
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.matching(pattern).len()
    }

    /// Value of `field` on the first event whose message contains `pattern`
    pub fn field_of(&self, pattern: &str, field: &str) -> Option<String> {
        self.matching(pattern)
            .into_iter()
            .find_map(|e| e.fields.get(field).cloned())
    }

    pub fn assert_contains(&self, pattern: &str) {
        if !self.contains(pattern) {
            let dump: Vec<String> = self
                .events()
                .iter()
                .map(|e| format!("[{}] {}: {} {:?}", e.level, e.target, e.message, e.fields))
                .collect();
            panic!("no log message contains '{pattern}'; captured:\n{}", dump.join("\n"));
        }
    }

    pub fn assert_no_match(&self, pattern: &str) {
        let found = self.count_matching(pattern);
        assert_eq!(found, 0, "expected no log message containing '{pattern}', found {found}");
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let metadata = event.metadata();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: collector.message,
            fields: collector.fields,
        });
    }
}

/// Capture `hydra_engine` events on this thread until the guard drops
///
/// Works with the default current-thread `#[tokio::test]` runtime.
pub fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::new();
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new("hydra_engine=debug"))
        .with(capture.clone());
    (capture, tracing::subscriber::set_default(subscriber))
}
