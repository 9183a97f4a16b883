//! Error types shared by the pipeline engine and the bundled stages.

use std::error::Error as StdError;

use thiserror::Error;

use crate::data::{DataType, TypeSet};

/// Boxed error raised by a stage for failures the engine does not model.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Data reached a stage that does not accept its type.
    #[error("Stage '{stage}' cannot process {data_type} data (accepts {accepted})")]
    TypeMismatch {
        stage: String,
        data_type: DataType,
        accepted: TypeSet,
    },

    /// A router slot was connected to a stage that does not accept the slot type.
    #[error("Cannot route {slot} data to stage '{stage}' (accepts {accepted})")]
    RouteRejected {
        slot: DataType,
        stage: String,
        accepted: TypeSet,
    },

    /// A stage appended to a chain can never receive what the chain produces.
    #[error("Stage '{stage}' accepts {accepted} but the chain produces {produced}")]
    IncompatibleStage {
        stage: String,
        produced: TypeSet,
        accepted: TypeSet,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A stage observed the cancel token and stopped.
    #[error("Operation canceled")]
    Canceled,

    #[error("Stage failed: {0}")]
    Failed(#[source] BoxError),

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clipboard operation failed: {0}")]
    Clipboard(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl PipelineError {
    /// Wraps an arbitrary error as a stage failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PipelineError::Failed(Box::new(err))
    }

    /// Whether this error came from a stage honouring cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, PipelineError::Canceled)
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
