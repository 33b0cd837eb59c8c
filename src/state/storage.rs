// File system locations for the alert database and config
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
    #[error("Failed to get config directory")]
    NoConfigDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

const APP_DIR: &str = "hearo";

/// App data directory, created on first use
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

pub fn default_database_path() -> StorageResult<PathBuf> {
    Ok(get_app_data_dir()?.join("hearo.db"))
}

/// `<config dir>/hearo/config.json`; the file itself may not exist
pub fn default_config_path() -> StorageResult<PathBuf> {
    let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
    Ok(config_dir.join(APP_DIR).join("config.json"))
}
