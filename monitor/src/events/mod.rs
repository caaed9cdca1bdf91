//! Event model, bus, and history ring
//!
//! The vocabulary of the monitor: typed events with a common envelope, the
//! in-process pub/sub fabric that fans them out, and the bounded ring that
//! retains recent history for late-joining viewers.

pub mod bus;
pub mod emitter;
pub mod ring;
pub mod types;

pub use bus::{BusStats, DEFAULT_QUEUE_CAPACITY, EventBus, EventStream, KindFilter, SubscriptionId, create_event_bus};
pub use emitter::TaskEmitter;
pub use ring::{DEFAULT_RING_CAPACITY, EventRing};
pub use types::{EventKind, EventPayload, IngestError, MonitorEvent, ProducerId, clamp_progress, next_event_id};
