//! Event bus for coordination outcomes
//!
//! Provides pub/sub messaging using Tokio broadcast channels with an
//! optional bounded history for inspection.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use super::history::{EventHistory, EventStats};
use super::types::CoordinationEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event history lock poisoned")]
    HistoryPoisoned,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels and optional history
pub struct EventBus {
    /// Broadcast sender for publishing events
    sender: broadcast::Sender<CoordinationEvent>,

    /// Recent events, when history is enabled
    history: Option<Mutex<EventHistory>>,
}

impl EventBus {
    /// Create a new event bus without history
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: None,
        }
    }

    /// Create an event bus that retains the last `capacity` events
    pub fn with_history(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Some(Mutex::new(EventHistory::new(capacity))),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CoordinationEvent) -> EventBusResult<()> {
        let event_type = event.event_type();

        if let Some(history) = &self.history {
            let mut history = history.lock().map_err(|_| EventBusError::HistoryPoisoned)?;
            let event_id = history.record(event.clone());
            debug!(event_type, event_id, "Event recorded");
        }

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
        Ok(())
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Snapshot of the retained history (empty when history is disabled)
    pub fn history(&self) -> Vec<CoordinationEvent> {
        self.with_history_ref(|h| h.events()).unwrap_or_default()
    }

    /// Retained events for one task
    pub fn task_history(&self, task_id: &str) -> Vec<CoordinationEvent> {
        self.with_history_ref(|h| h.task_events(task_id))
            .unwrap_or_default()
    }

    /// Retained events for one proposal
    pub fn proposal_history(&self, proposal_id: &str) -> Vec<CoordinationEvent> {
        self.with_history_ref(|h| h.proposal_events(proposal_id))
            .unwrap_or_default()
    }

    /// Per-type counts over the retained history
    pub fn stats(&self) -> EventStats {
        self.with_history_ref(|h| h.stats()).unwrap_or_default()
    }

    fn with_history_ref<R>(&self, f: impl FnOnce(&EventHistory) -> R) -> Option<R> {
        let history = self.history.as_ref()?;
        let guard = history.lock().ok()?;
        Some(f(&guard))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
pub struct EventFilter {
    /// Filter by proposal ID
    pub proposal_id: Option<String>,
    /// Filter by task ID
    pub task_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self {
            proposal_id: None,
            task_id: None,
            event_types: None,
        }
    }

    /// Filter by proposal ID
    pub fn proposal(mut self, proposal_id: &str) -> Self {
        self.proposal_id = Some(proposal_id.to_string());
        self
    }

    /// Filter by task ID
    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &CoordinationEvent) -> bool {
        if let Some(ref pid) = self.proposal_id {
            if event.proposal_id() != Some(pid.as_str()) {
                return false;
            }
        }

        if let Some(ref tid) = self.task_id {
            if event.task_id() != Some(tid.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<CoordinationEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<CoordinationEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}
