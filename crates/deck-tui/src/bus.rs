//! EventBus — process-wide topic fan-out.
//!
//! One bus is built in `main` and handed to every component as `Rc<EventBus>`.
//! Delivery is synchronous: `publish` runs every subscriber of the event's
//! topic to completion, in subscription order, before it returns.  A handler
//! that returns `Err` or panics is reported and the remaining handlers still
//! run; nothing is propagated back to the publisher.
//!
//! Subscriptions are registered while components are being wired up.  The
//! subscriber list is snapshotted at the start of each publish, so a handler
//! may itself publish without tripping the `RefCell`.

use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use deck_proto::protocol::{Command, SearchResults, StateUpdate};
use tokio::sync::mpsc;
use tracing::{error, trace};

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// User intent, consumed by the sequencer.
    Command,
    /// The local clock ran past the known duration.
    TrackEnded,
    /// A fresh authoritative snapshot is ready for display.
    StateUpdated,
    SearchResults,
    /// Operator-visible message (toast + log).
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl From<&HandlerFailure> for Notice {
    fn from(failure: &HandlerFailure) -> Self {
        Notice::error(failure.message.clone())
    }
}

/// Payloads are `Rc`-shared: every subscriber sees the same allocation.
#[derive(Debug, Clone)]
pub enum Event {
    Command(Command),
    TrackEnded,
    StateUpdated(Rc<StateUpdate>),
    SearchResults(Rc<SearchResults>),
    Notice(Notice),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Command(_) => Topic::Command,
            Event::TrackEnded => Topic::TrackEnded,
            Event::StateUpdated(_) => Topic::StateUpdated,
            Event::SearchResults(_) => Topic::SearchResults,
            Event::Notice(_) => Topic::Notice,
        }
    }
}

/// A handler (or task started by one) failed.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub source: String,
    pub message: String,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

// ── EventBus ──────────────────────────────────────────────────────────────────

type Handler = Rc<dyn Fn(&Event) -> anyhow::Result<()>>;

struct Subscription {
    topic: Topic,
    name: &'static str,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RefCell<Vec<Subscription>>,
    /// Where failures go besides the log (the App turns them into toasts).
    failure_tx: RefCell<Option<mpsc::UnboundedSender<HandlerFailure>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure_sink(&self, tx: mpsc::UnboundedSender<HandlerFailure>) {
        *self.failure_tx.borrow_mut() = Some(tx);
    }

    /// Register `handler` for `topic`.  `name` identifies the subscriber in
    /// failure reports.
    pub fn subscribe<F>(&self, topic: Topic, name: &'static str, handler: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + 'static,
    {
        self.subscriptions.borrow_mut().push(Subscription {
            topic,
            name,
            handler: Rc::new(handler),
        });
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscriptions
            .borrow()
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Deliver `event` to every subscriber of its topic.  Returns how many
    /// handlers were invoked, failed ones included.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let handlers: Vec<(&'static str, Handler)> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| (s.name, Rc::clone(&s.handler)))
            .collect();

        trace!("bus: {:?} → {} subscriber(s)", topic, handlers.len());

        for (name, handler) in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.report(name, format!("{:#}", e)),
                Err(payload) => self.report(name, panic_message(payload.as_ref())),
            }
        }

        handlers.len()
    }

    /// Surface a failure: always logged, forwarded to the sink if one is set.
    pub fn report(&self, source: &str, message: impl fmt::Display) {
        let failure = HandlerFailure {
            source: source.to_string(),
            message: message.to_string(),
        };
        error!("bus: {}", failure);
        if let Some(tx) = self.failure_tx.borrow().as_ref() {
            let _ = tx.send(failure);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
