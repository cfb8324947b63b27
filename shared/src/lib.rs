// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error("unknown storage backend: {0}")]
    UnknownStorage(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub mod config;
