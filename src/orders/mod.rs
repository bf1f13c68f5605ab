//! Order intake: snapshots from the commerce system and the idempotent
//! processor that credits them.

pub mod processor;
pub mod snapshot;

pub use processor::{AppliedOrder, OrderProcessor, ProcessOutcome};
pub use snapshot::{LineItem, OrderSnapshot, OrderSnapshotAdapter};
