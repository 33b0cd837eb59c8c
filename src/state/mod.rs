// State management module
// SQLite alert mirror and file system locations

pub mod db;
pub mod queries;
pub mod storage;

pub use db::{init_db, DbConnection, DbError, DbResult};
pub use queries::{
    count_alerts, insert_alert, latest_alert_marker, list_recent_alerts, prune_older_than,
};
pub use storage::{
    default_config_path, default_database_path, get_app_data_dir, StorageError,
};
