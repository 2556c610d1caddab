use thiserror::Error;

use crate::config::ConfigurationError;
use crate::database::DatabaseError;
use crate::messaging::BrokerError;

/// Failures that stop the service from starting or running
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
