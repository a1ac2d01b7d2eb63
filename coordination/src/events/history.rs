//! Bounded in-memory event history
//!
//! Keeps the most recent events so callers can inspect what the core did
//! without wiring up their own subscriber.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CoordinationEvent, EventId};

/// An event with its assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: EventId,
    pub event: CoordinationEvent,
}

/// Ring buffer of recent events. The oldest event is dropped once full.
#[derive(Debug, Clone)]
pub struct EventHistory {
    capacity: usize,
    events: VecDeque<RecordedEvent>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    /// Append an event and return its id.
    pub fn record(&mut self, event: CoordinationEvent) -> EventId {
        let id = CoordinationEvent::new_id();
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(RecordedEvent {
            id: id.clone(),
            event,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<CoordinationEvent> {
        self.events.iter().map(|r| r.event.clone()).collect()
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CoordinationEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events
            .iter()
            .skip(skip)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Events at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<CoordinationEvent> {
        self.events
            .iter()
            .filter(|r| r.event.timestamp() >= since)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Events concerning one task.
    pub fn task_events(&self, task_id: &str) -> Vec<CoordinationEvent> {
        self.events
            .iter()
            .filter(|r| r.event.task_id() == Some(task_id))
            .map(|r| r.event.clone())
            .collect()
    }

    /// Events concerning one proposal.
    pub fn proposal_events(&self, proposal_id: &str) -> Vec<CoordinationEvent> {
        self.events
            .iter()
            .filter(|r| r.event.proposal_id() == Some(proposal_id))
            .map(|r| r.event.clone())
            .collect()
    }

    /// Per-type counts over the retained window.
    pub fn stats(&self) -> EventStats {
        let mut stats = EventStats::default();
        for recorded in &self.events {
            stats.total_events += 1;
            *stats
                .event_types
                .entry(recorded.event.event_type().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

/// Statistics over retained events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStats {
    pub total_events: usize,
    pub event_types: HashMap<String, usize>,
}
