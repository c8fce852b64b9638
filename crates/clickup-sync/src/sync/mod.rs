//! The work-queue engine: enqueue on change, dispatch on a schedule.

pub mod dispatcher;
pub mod enqueuer;
pub mod payload;
pub mod scheduler;
pub mod trigger;

pub use dispatcher::Dispatcher;
pub use enqueuer::{Enqueuer, BULK_SYNC_PRIORITY};
pub use payload::{PayloadCache, PayloadField, TaskPayload};
pub use scheduler::SyncScheduler;
