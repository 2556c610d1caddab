//! Configuration Errors
//!
//! Failures while locating, parsing or validating the venue service
//! configuration. Each variant names the file or field at fault.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No configuration file at any probed location
    #[error("No venue service configuration found (searched: {searched_paths:?})")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Unreadable file, or file and `VENUE__*` overrides that do not deserialize
    #[error("Could not load configuration from {file_path}: {reason}")]
    ParseError { file_path: String, reason: String },

    #[error("'{field}' is required in {context}")]
    MissingRequiredField { field: String, context: String },

    #[error("'{field}' = '{value}' is invalid: {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, reason: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
