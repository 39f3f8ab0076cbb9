use std::path::PathBuf;

use hasharchive_core::AppError;

const DEFAULT_DB_PATH: &str = "hasharchive.redb";

/// Location of the archive database file.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read configuration from environment variables.
    ///
    /// - `HASHARCHIVE_DB_PATH` (optional, defaults to `hasharchive.redb`)
    pub fn from_env() -> Result<Self, AppError> {
        let path = match std::env::var("HASHARCHIVE_DB_PATH") {
            Err(_) => PathBuf::from(DEFAULT_DB_PATH),
            Ok(raw) if raw.trim().is_empty() => {
                return Err(AppError::ConfigError(
                    "HASHARCHIVE_DB_PATH is set but empty".into(),
                ));
            }
            Ok(raw) => PathBuf::from(raw),
        };
        Ok(Self { path })
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}
