//! Shared types and errors for the modpipe pipeline engine.
//!
//! This crate provides the foundational types used by `modpipe-pipeline`:
//! - `ModpipeError`: unified fault taxonomy
//! - `Payload` / `Args`: values threaded between stages
//! - `Signature`: the declared call shape of a stage

pub mod signature;
pub mod value;

pub use signature::{Param, ParamKind, Signature};
pub use value::{Args, Payload};

/// Unified error type for every modpipe operation.
#[derive(Debug, thiserror::Error)]
pub enum ModpipeError {
    // === Configuration faults ===
    #[error("No elements in pipeline '{namespace}'")]
    EmptyPipeline { namespace: String },

    #[error("Signature for {stage} is {signature} which doesn't match {expected}")]
    SignatureMismatch {
        stage: String,
        signature: Signature,
        expected: Signature,
    },

    #[error("Stage '{name}' is defined more than once")]
    DuplicateStage { name: String },

    // === Resolution faults ===
    #[error("Unable to resolve: {}", .names.join(", "))]
    Unresolved { names: Vec<String> },

    // === Lookup faults ===
    #[error("No stage named '{name}'")]
    StageNotFound { name: String },

    #[error("No namespace named '{namespace}'")]
    NamespaceNotFound { namespace: String },

    // === Protocol faults ===
    #[error("Cannot apply stage '{stage}' to a terminated result")]
    AdvanceTerminated { stage: String },

    #[error("Pipeline ended before encountering {target}")]
    SkipTargetNotReached { target: String },

    // === Stage faults ===
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<ModpipeError>,
    },

    #[error("Missing positional argument {index} (got {count})")]
    MissingArgument { index: usize, count: usize },

    #[error("Argument {index} has the wrong shape: {message}")]
    InvalidArgument { index: usize, message: String },

    /// Raised by a stage body that gives up on its input.
    #[error("{0}")]
    Rejected(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Broad classification of a [`ModpipeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The pipeline cannot be built as configured.
    Configuration,
    /// Source order could not be determined for some entries.
    Resolution,
    /// A named stage or namespace does not exist.
    Lookup,
    /// The running-result protocol was violated.
    Protocol,
    /// A stage raised while being called.
    Stage,
    /// Environment failures (I/O, encoding) and everything else.
    Environment,
}

impl ModpipeError {
    /// Classify the error into its fault family.
    pub fn kind(&self) -> FaultKind {
        match self {
            ModpipeError::EmptyPipeline { .. }
            | ModpipeError::SignatureMismatch { .. }
            | ModpipeError::DuplicateStage { .. } => FaultKind::Configuration,
            ModpipeError::Unresolved { .. } => FaultKind::Resolution,
            ModpipeError::StageNotFound { .. } | ModpipeError::NamespaceNotFound { .. } => {
                FaultKind::Lookup
            }
            ModpipeError::AdvanceTerminated { .. } | ModpipeError::SkipTargetNotReached { .. } => {
                FaultKind::Protocol
            }
            ModpipeError::StageFailed { .. }
            | ModpipeError::MissingArgument { .. }
            | ModpipeError::InvalidArgument { .. }
            | ModpipeError::Rejected(_) => FaultKind::Stage,
            ModpipeError::Io(_) | ModpipeError::Json(_) | ModpipeError::Other(_) => {
                FaultKind::Environment
            }
        }
    }

    /// Returns `true` for faults raised while loading a pipeline.
    pub fn is_load_fault(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::Configuration | FaultKind::Resolution
        )
    }

    /// Shorthand for a free-form stage failure, for use inside stage bodies.
    pub fn stage(message: impl Into<String>) -> Self {
        ModpipeError::Rejected(message.into())
    }
}

/// A convenience alias for `Result<T, ModpipeError>`.
pub type Result<T> = std::result::Result<T, ModpipeError>;
