//! Coordination events
//!
//! The pub/sub hand-off between the coordination core and whatever
//! persists or observes its outcomes.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): proposal, consensus, negotiation and
//!    task lifecycle events.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with an
//!    optional bounded history.
//!
//! 3. **Event History** (`history.rs`): the bounded ring buffer and its
//!    queries.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Components  │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │  (persist)   │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │   History    │
//!                      │ (ring buffer)│
//!                      └──────────────┘
//! ```
//!
//! Publishing never fails a coordination operation: components discard
//! the publish result.

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use history::{EventHistory, EventStats, RecordedEvent};
pub use types::{CoordinationEvent, EventId};
