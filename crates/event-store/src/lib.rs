//! Append-only event storage for the storefront aggregates.
//!
//! Events are stored per aggregate with a monotonically increasing
//! [`Version`]. Appends carry an expected version, which makes every write a
//! conditional write: two writers that decided on the same state cannot both
//! succeed.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
