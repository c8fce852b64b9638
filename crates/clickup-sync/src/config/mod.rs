mod loader;
mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{DropdownOption, FieldMapping, FieldType, ListMapping, SyncConfig};
