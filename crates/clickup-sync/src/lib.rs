pub mod clickup;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod sync;

pub use clickup::{ApiRequest, ApiResponse, FieldValue, HttpClient, Method, Query, Transport};
pub use config::{load_config, SyncConfig};
pub use db::queue_repo::{PurgeSelect, QueueBucket, QueueStatus};
pub use db::Database;
pub use entity::{EntityProvider, EntityRef, EntitySnapshot, EntityType};
pub use error::{ConfigError, Result, SyncError};
pub use sync::{Dispatcher, Enqueuer, PayloadCache, SyncScheduler};
