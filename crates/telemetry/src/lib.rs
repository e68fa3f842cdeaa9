use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct ProviderError {
    pub message: String,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Delivery backend for tracked events. Implementations may forward to an
/// analytics service, a metrics registry, or nothing at all; delivery is
/// best-effort and failures stay inside the tracker.
pub trait TelemetryProvider: Send + Sync {
    fn deliver(&self, event: &str, properties: &Map<String, Value>) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey {
    event: String,
    instance: Option<String>,
}

/// Records that a given (event, instance) pair fired at most once and
/// forwards the first occurrence to the configured provider.
///
/// Constructed explicitly and passed to callers; there is no module-level
/// registry. An instance id scopes the one-shot to a UI element; omitting
/// it yields a tracker-wide one-shot for the event name.
pub struct OneShotTracker {
    fired: Mutex<HashSet<EventKey>>,
    provider: Arc<dyn TelemetryProvider>,
    context: Map<String, Value>,
}

impl OneShotTracker {
    pub fn new(provider: Arc<dyn TelemetryProvider>) -> Self {
        Self {
            fired: Mutex::new(HashSet::new()),
            provider,
            context: Map::new(),
        }
    }

    /// Attach a context property merged into every delivery (role, build,
    /// session id). Event-specific properties win on key collision.
    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn has_fired(&self, event: &str, instance: Option<&str>) -> bool {
        self.lock_fired().contains(&key_of(event, instance))
    }

    pub fn mark_fired(&self, event: &str, instance: Option<&str>) {
        self.lock_fired().insert(key_of(event, instance));
    }

    /// Clear one-shot state. No arguments clears everything; an event name
    /// clears that single key. Test isolation only.
    pub fn reset(&self, event: Option<&str>, instance: Option<&str>) {
        let mut fired = self.lock_fired();
        match event {
            None => fired.clear(),
            Some(event) => {
                fired.remove(&key_of(event, instance));
            }
        }
    }

    /// Fire `event` at most once per key. Returns `false` without touching
    /// the provider when the key already fired. The check and the mark
    /// share one critical section so concurrent callers cannot both
    /// observe "not fired".
    pub fn track(
        &self,
        event: &str,
        properties: Map<String, Value>,
        instance: Option<&str>,
    ) -> bool {
        {
            let mut fired = self.lock_fired();
            let key = key_of(event, instance);
            if fired.contains(&key) {
                return false;
            }
            fired.insert(key);
        }

        let mut merged = self.context.clone();
        merged.extend(properties);

        if let Err(err) = self.provider.deliver(event, &merged) {
            tracing::warn!(event, error = %err, "telemetry delivery failed");
        }
        true
    }

    fn lock_fired(&self) -> std::sync::MutexGuard<'_, HashSet<EventKey>> {
        match self.fired.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn key_of(event: &str, instance: Option<&str>) -> EventKey {
    EventKey {
        event: event.to_string(),
        instance: instance.map(|s| s.to_string()),
    }
}

/// Provider that discards every delivery.
#[derive(Debug, Default)]
pub struct NoopProvider;

impl TelemetryProvider for NoopProvider {
    fn deliver(&self, _event: &str, _properties: &Map<String, Value>) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Provider that captures deliveries in memory. Test double shared by the
/// workspace's test suites.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    events: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Map<String, Value>)> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetryProvider for RecordingProvider {
    fn deliver(&self, event: &str, properties: &Map<String, Value>) -> Result<(), ProviderError> {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push((event.to_string(), properties.clone()));
        Ok(())
    }
}

/// Provider backed by a per-instance Prometheus registry. Counts delivered
/// events by name so redaction-failure detections show up on a dashboard
/// without shipping event payloads anywhere.
pub struct MetricsProvider {
    registry: Registry,
    events_total: IntCounterVec,
}

impl MetricsProvider {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_total = IntCounterVec::new(
            Opts::new(
                "vantage_console_events_total",
                "Console telemetry events delivered, by event name.",
            ),
            &["event"],
        )
        .expect("create vantage_console_events_total");
        registry
            .register(Box::new(events_total.clone()))
            .expect("register vantage_console_events_total");
        Self {
            registry,
            events_total,
        }
    }

    /// Text exposition of the registry, for scraping or debug dumps.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for MetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider for MetricsProvider {
    fn deliver(&self, event: &str, _properties: &Map<String, Value>) -> Result<(), ProviderError> {
        self.events_total.with_label_values(&[event]).inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    impl TelemetryProvider for FailingProvider {
        fn deliver(
            &self,
            _event: &str,
            _properties: &Map<String, Value>,
        ) -> Result<(), ProviderError> {
            Err(ProviderError {
                message: "provider offline".to_string(),
            })
        }
    }

    #[test]
    fn repeat_track_delivers_exactly_once() {
        let provider = Arc::new(RecordingProvider::new());
        let tracker = OneShotTracker::new(provider.clone());

        assert!(tracker.track("ledger_expanded", Map::new(), Some("x")));
        assert!(!tracker.track("ledger_expanded", Map::new(), Some("x")));
        assert!(!tracker.track("ledger_expanded", Map::new(), Some("x")));

        assert_eq!(provider.events().len(), 1);
    }

    #[test]
    fn distinct_instances_each_fire() {
        let provider = Arc::new(RecordingProvider::new());
        let tracker = OneShotTracker::new(provider.clone());

        for instance in ["a", "b", "c"] {
            assert!(tracker.track("ledger_expanded", Map::new(), Some(instance)));
        }
        assert_eq!(provider.events().len(), 3);
    }

    #[test]
    fn omitting_instance_is_a_tracker_wide_key() {
        let provider = Arc::new(RecordingProvider::new());
        let tracker = OneShotTracker::new(provider.clone());

        assert!(tracker.track("first_answer", Map::new(), None));
        assert!(!tracker.track("first_answer", Map::new(), None));
        assert!(tracker.has_fired("first_answer", None));
        assert!(!tracker.has_fired("first_answer", Some("a")));
    }

    #[test]
    fn reset_clears_selected_key_or_everything() {
        let provider = Arc::new(RecordingProvider::new());
        let tracker = OneShotTracker::new(provider.clone());

        tracker.mark_fired("e1", Some("a"));
        tracker.mark_fired("e2", None);

        tracker.reset(Some("e1"), Some("a"));
        assert!(!tracker.has_fired("e1", Some("a")));
        assert!(tracker.has_fired("e2", None));

        tracker.mark_fired("e1", Some("a"));
        tracker.reset(None, None);
        assert!(!tracker.has_fired("e1", Some("a")));
        assert!(!tracker.has_fired("e2", None));
    }

    #[test]
    fn provider_failure_does_not_propagate_and_still_marks_fired() {
        let tracker = OneShotTracker::new(Arc::new(FailingProvider));

        assert!(tracker.track("broken", Map::new(), None));
        assert!(tracker.has_fired("broken", None));
        assert!(!tracker.track("broken", Map::new(), None));
    }

    #[test]
    fn context_properties_merge_into_every_delivery() {
        let provider = Arc::new(RecordingProvider::new());
        let tracker = OneShotTracker::new(provider.clone())
            .with_context("role", Value::String("pro".to_string()));

        let mut props = Map::new();
        props.insert("panel".to_string(), Value::String("ledger".to_string()));
        tracker.track("panel_opened", props, None);

        let events = provider.events();
        assert_eq!(events[0].1.get("role"), Some(&Value::String("pro".to_string())));
        assert_eq!(
            events[0].1.get("panel"),
            Some(&Value::String("ledger".to_string()))
        );
    }

    #[test]
    fn metrics_provider_counts_by_event_name() {
        let provider = MetricsProvider::new();
        provider.deliver("redaction_failure", &Map::new()).unwrap();
        provider.deliver("redaction_failure", &Map::new()).unwrap();
        provider.deliver("panel_opened", &Map::new()).unwrap();

        let rendered = provider.render();
        assert!(rendered.contains("vantage_console_events_total"));
        assert!(rendered.contains("event=\"redaction_failure\"} 2"));
        assert!(rendered.contains("event=\"panel_opened\"} 1"));
    }
}
