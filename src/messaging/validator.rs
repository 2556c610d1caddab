//! # Message Validators
//!
//! Validators are asynchronous predicates over arbitrary JSON. The handler takes
//! one for inbound envelopes and an independent one for outbound replies.
//!
//! A validator may also fail outright (`Err`) or panic. Callers treat both
//! exactly like a `false` verdict.

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Error raised by a validator that could not reach a verdict
#[derive(Debug, Clone, thiserror::Error)]
#[error("Validation failed to run: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Asynchronous predicate over a structured value
#[async_trait]
pub trait MessageValidator: Send + Sync {
    /// Decide whether the candidate conforms
    async fn validate(&self, candidate: &Value) -> Result<bool, ValidationError>;

    /// Name used in log lines
    fn validator_name(&self) -> &str {
        "unnamed_validator"
    }
}

/// Shared validator handle injected into the handler
pub type SharedValidator = Arc<dyn MessageValidator>;

/// Run a validator, folding validator failures and panics into a negative verdict
pub async fn is_valid(validator: &dyn MessageValidator, candidate: &Value) -> bool {
    match AssertUnwindSafe(validator.validate(candidate))
        .catch_unwind()
        .await
    {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(
                validator = validator.validator_name(),
                error = %e,
                "⚠️ Validator raised an error, treating candidate as invalid"
            );
            false
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(
                validator = validator.validator_name(),
                panic = %reason,
                "❌ Validator panicked, treating candidate as invalid"
            );
            false
        }
    }
}

/// Accepts every candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl MessageValidator for AcceptAll {
    async fn validate(&self, _candidate: &Value) -> Result<bool, ValidationError> {
        Ok(true)
    }

    fn validator_name(&self) -> &str {
        "accept_all"
    }
}

/// Wraps a synchronous predicate closure
pub struct FnValidator<F> {
    name: String,
    predicate: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> Result<bool, ValidationError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> MessageValidator for FnValidator<F>
where
    F: Fn(&Value) -> Result<bool, ValidationError> + Send + Sync + 'static,
{
    async fn validate(&self, candidate: &Value) -> Result<bool, ValidationError> {
        (self.predicate)(candidate)
    }

    fn validator_name(&self) -> &str {
        &self.name
    }
}

/// Build a validator from a plain boolean predicate
pub fn predicate<F>(name: impl Into<String>, f: F) -> SharedValidator
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(FnValidator::new(name, move |candidate: &Value| Ok(f(candidate))))
}

/// Passes iff the candidate deserializes into `T`
pub struct SerdeValidator<T> {
    name: String,
    _schema: PhantomData<fn() -> T>,
}

impl<T> SerdeValidator<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _schema: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SerdeValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeValidator")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T> MessageValidator for SerdeValidator<T>
where
    T: DeserializeOwned + 'static,
{
    async fn validate(&self, candidate: &Value) -> Result<bool, ValidationError> {
        match T::deserialize(candidate) {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(
                    validator = %self.name,
                    reason = %e,
                    "Candidate does not match schema"
                );
                Ok(false)
            }
        }
    }

    fn validator_name(&self) -> &str {
        &self.name
    }
}
