//! Correlation-stamped telemetry emission.

use crate::collaborators::EventSink;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use wayfarer_core::CorrelationId;

/// Delivers telemetry through a reader-writer-protected sink slot.
/// Every emitted event carries the session's correlation identifier.
pub struct EventEmitter {
    sink: RwLock<Arc<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink: RwLock::new(sink),
        }
    }

    /// Replace the sink. Writes are serialized; concurrent emits see
    /// either the old or the new sink, never a torn slot.
    pub fn set_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub fn emit(&self, correlation_id: CorrelationId, name: &str, mut attributes: Value) {
        if let Some(map) = attributes.as_object_mut() {
            map.insert(
                "correlationId".to_string(),
                Value::String(correlation_id.to_string()),
            );
        }
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sink.emit(name, &attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl EventSink for Recorder {
        fn emit(&self, name: &str, attributes: &Value) {
            self.events
                .lock()
                .unwrap()
                .push((name.to_string(), attributes.clone()));
        }
    }

    #[test]
    fn emits_carry_the_correlation_id() {
        let recorder = Arc::new(Recorder::default());
        let emitter = EventEmitter::new(recorder.clone());
        let correlation = CorrelationId::generate();

        emitter.emit(correlation, "journey_start", json!({ "journeyId": "j-1" }));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "journey_start");
        assert_eq!(events[0].1["journeyId"], "j-1");
        assert_eq!(events[0].1["correlationId"], correlation.to_string());
    }

    #[test]
    fn sink_can_be_swapped() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let emitter = EventEmitter::new(first.clone());
        let correlation = CorrelationId::generate();

        emitter.emit(correlation, "a", json!({}));
        emitter.set_sink(second.clone());
        emitter.emit(correlation, "b", json!({}));

        assert_eq!(first.events.lock().unwrap().len(), 1);
        assert_eq!(second.events.lock().unwrap().len(), 1);
    }
}
