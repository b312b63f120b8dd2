use std::{fmt, path::PathBuf, sync::Arc, thread};

use anyhow::{anyhow, Result};
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Builder, Handle};

/// Builder for pipeline telemetry sinks.
pub struct PipelineTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    echo_to_stderr: bool,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PipelineTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            echo_to_stderr: false,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the log path when one is configured.
    #[must_use]
    pub fn log_path_opt(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    /// Mirrors records to stderr.
    #[must_use]
    pub fn echo_to_stderr(mut self, echo: bool) -> Self {
        self.echo_to_stderr = echo;
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<PipelineTelemetry> {
        let logger = match (self.log_path, self.echo_to_stderr) {
            (Some(path), echo) => Some(
                JsonLogger::new(path)?
                    .echo_to_stderr(echo)
                    .min_level(self.min_level),
            ),
            (None, true) => Some(JsonLogger::console().min_level(self.min_level)),
            (None, false) => None,
        };
        let event = self.event_publisher.map(|publisher| EventHandle { publisher });
        Ok(PipelineTelemetry {
            module: self.module,
            sinks: Arc::new(Sinks { logger, event }),
        })
    }
}

/// Telemetry handle shared across pipeline stages; clones share the same sinks.
#[derive(Clone)]
pub struct PipelineTelemetry {
    module: String,
    sinks: Arc<Sinks>,
}

impl fmt::Debug for PipelineTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTelemetry")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

struct Sinks {
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    /// Blocks until the publisher has accepted `record`.
    fn publish(&self, record: EventRecord) -> Result<()> {
        let deliver = move || -> Result<()> {
            Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(self.publisher.publish(record))
        };
        if Handle::try_current().is_ok() {
            // A runtime thread cannot block_on; deliver from a scoped thread.
            thread::scope(|scope| scope.spawn(deliver).join())
                .map_err(|_| anyhow!("event publisher panicked"))?
        } else {
            deliver()
        }
    }
}

impl PipelineTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PipelineTelemetryBuilder {
        PipelineTelemetryBuilder::new(module)
    }

    /// Handle with no sinks; every call is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            module: "disabled".into(),
            sinks: Arc::new(Sinks {
                logger: None,
                event: None,
            }),
        }
    }

    /// Same sinks, different module name.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            sinks: Arc::clone(&self.sinks),
        }
    }

    /// Module name stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.sinks.logger {
            let record = LogRecord::new(&self.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.sinks.event {
            handle.publish(EventRecord::new(&self.module, event_type, payload))?;
        }
        Ok(())
    }

    /// Logs without surfacing sink failures to the caller.
    pub fn note(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Err(err) = self.log(level, message, metadata) {
            eprintln!("telemetry log failed: {err:?}");
        }
    }

    /// Publishes without surfacing sink failures to the caller.
    pub fn signal(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.event(event_type, payload) {
            eprintln!("telemetry event failed: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pipeline.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PipelineTelemetry::builder("pipeline")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let ingestion = telemetry.scoped("ingestion");
        ingestion
            .log(LogLevel::Info, "ingestion.start", json!({ "rows": 3 }))
            .unwrap();
        ingestion
            .event("pipeline.ingestion.completed", json!({ "train_rows": 2 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("ingestion.start"));
        assert!(content.contains("\"module\":\"ingestion\""));
        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "ingestion");
    }

    #[tokio::test]
    async fn events_inside_a_runtime_are_delivered_before_returning() {
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = PipelineTelemetry::builder("serving")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        for value in [61.5, 70.25] {
            telemetry
                .event("serving.predicted", json!({ "prediction": value }))
                .unwrap();
        }
        assert_eq!(bus.events_of("serving.predicted").len(), 2);
        drop(telemetry);
    }

    #[test]
    fn disabled_handle_is_silent() {
        let telemetry = PipelineTelemetry::disabled();
        telemetry.note(LogLevel::Error, "ignored", json!({}));
        telemetry.signal("ignored", json!({}));
        assert_eq!(telemetry.module(), "disabled");
    }
}
