//! Edge Value is a client for Edge remote-configuration values.
//!
//! A [`model::Value`] is a feature-flag-like entity: typed variants, ordered
//! targeting rules written in CEL or JSON-logic, per-variant transforms and
//! self-check tests. The crate covers the local side of that entity and the
//! client that stores it remotely.
//!
//! ## Core Components
//! - [`model`]: The value entity, validation and declarative builder inputs.
//! - [`codec`]: The JSON wire format, tolerant of older encodings.
//! - [`eval`]: Targeting rule selection, transform pipeline and test runner.
//! - [`engine`]: An in-memory store with server semantics.
//! - [`sdk`]: The HTTP client, its configuration and the write session.

pub mod codec;
pub mod engine;
pub mod eval;
pub mod model;
pub mod sdk;

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::DecodeError;
use crate::eval::{EvaluationError, ResolveError, TestFailure, TransformError};
use crate::model::{ConfigError, ValidationError, Value};

/// Errors returned by Edge Value.
#[derive(Error, Debug)]
pub enum Error {
    /// No value with this id exists.
    #[error("value not found: {0}")]
    NotFound(String),
    /// A value with this id already exists.
    #[error("value already exists: {0}")]
    AlreadyExists(String),
    /// An update carried server timestamps that no longer match the stored value.
    #[error("stale update for value {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// An evaluation test blocked a write.
    #[error(transparent)]
    TestFailure(#[from] TestFailure),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The server answered with an error status.
    #[error("unexpected status code {status}: {body}")]
    Status { status: u16, body: String },
    /// The HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Edge Value operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Read access to stored values.
#[async_trait]
pub trait ValueReader: Send + Sync {
    /// Retrieves a value, including its server timestamps.
    async fn get(&self, id: &str) -> Result<Value>;
}

/// Write access to stored values.
///
/// Implementations perform single calls. Sequencing (read-modify-write on update,
/// one writer per id) is the job of [`sdk::Session`].
#[async_trait]
pub trait ValueWriter: Send + Sync {
    /// Stores a new value.
    async fn create(&self, value: &Value) -> Result<()>;
    /// Replaces a stored value. `value` must carry the current server timestamps.
    async fn update(&self, value: &Value) -> Result<()>;
    /// Removes a value.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// A complete value store: the contract between the core and its transport.
pub trait ValueStore: ValueReader + ValueWriter {}

impl<T: ValueReader + ValueWriter> ValueStore for T {}
