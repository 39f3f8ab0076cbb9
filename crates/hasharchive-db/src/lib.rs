pub mod config;
pub mod database;
pub mod keys;
pub mod record;

pub use config::DatabaseConfig;
pub use database::ArchiveDb;
