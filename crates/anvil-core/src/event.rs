//! Ordered, typed progress notifications.
//!
//! The pipeline emits [`Event`]s through an [`EventBus`]. Subscribers are
//! registered per [`EventKind`] and invoked synchronously, in registration
//! order, on the emitting task. Subscribers must not fail; they report by
//! logging or printing only.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    DiffStart,
    UploadsStart,
    UploadsEnd,
    BuildOutputLine,
    ReleaseStart,
    ReleaseEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::DiffStart,
        EventKind::UploadsStart,
        EventKind::UploadsEnd,
        EventKind::BuildOutputLine,
        EventKind::ReleaseStart,
        EventKind::ReleaseEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DiffStart => "diff-start",
            EventKind::UploadsStart => "uploads-start",
            EventKind::UploadsEnd => "uploads-end",
            EventKind::BuildOutputLine => "build-output-line",
            EventKind::ReleaseStart => "release-start",
            EventKind::ReleaseEnd => "release-end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// Files matched by the scan, emitted before fingerprinting.
    DiffStart { total_files: usize },
    /// Distinct contents about to be uploaded.
    UploadsStart { count: usize },
    UploadsEnd { count: usize },
    BuildOutputLine { line: String },
    ReleaseStart { app_name: String },
    ReleaseEnd { version: String, web_url: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DiffStart { .. } => EventKind::DiffStart,
            Event::UploadsStart { .. } => EventKind::UploadsStart,
            Event::UploadsEnd { .. } => EventKind::UploadsEnd,
            Event::BuildOutputLine { .. } => EventKind::BuildOutputLine,
            Event::ReleaseStart { .. } => EventKind::ReleaseStart,
            Event::ReleaseEnd { .. } => EventKind::ReleaseEnd,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Dispatch table from event kind to its ordered subscribers.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: BTreeMap<EventKind, Vec<Handler>>,
    error_handlers: Vec<ErrorHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one event kind.
    pub fn subscribe<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
        self
    }

    /// Register one subscriber for every event kind.
    pub fn subscribe_all<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        for kind in EventKind::ALL {
            self.handlers
                .entry(kind)
                .or_default()
                .push(Arc::clone(&handler));
        }
        self
    }

    /// Register a subscriber for pipeline failure messages.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.error_handlers.push(Arc::new(handler));
        self
    }

    pub fn emit(&self, event: Event) {
        tracing::trace!(kind = %event.kind(), "emitting event");
        if let Some(handlers) = self.handlers.get(&event.kind()) {
            for handler in handlers {
                handler(&event);
            }
        }
    }

    /// Deliver a failure message through the same channel as progress events.
    pub fn error(&self, message: &str) {
        for handler in &self.error_handlers {
            handler(message);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind.as_str(), handlers.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("handlers", &counts)
            .field("error_handlers", &self.error_handlers.len())
            .finish()
    }
}
