//! The running-result protocol threaded through every stage call.
//!
//! A [`RunningResult`] is either still going, finished early, or waiting for a
//! named stage. [`RunningResult::apply_to`] advances it by one stage.

use modpipe_types::{ModpipeError, Payload, Result};
use serde_json::Value;

use crate::stage::Stage;

// ---------------------------------------------------------------------------
// RunningResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RunningResult {
    /// Feed the payload to the next stage.
    Continuing(Payload),
    /// Stop now; the payload is final.
    Terminated(Payload),
    /// Suppress calls until the stage named `target` is reached, then resume
    /// with `args`.
    SkipRequested { target: String, args: Payload },
}

impl RunningResult {
    /// Start a run from the initial call arguments.
    pub fn new(values: Vec<Value>) -> Self {
        RunningResult::Continuing(Payload::from_values(values))
    }

    /// Terminate the pipeline with `values` as the final result.
    pub fn done(values: Vec<Value>) -> Self {
        RunningResult::Terminated(Payload::from_values(values))
    }

    /// Jump ahead to `target`, which will be called with `values`.
    pub fn skip_to(target: impl Into<String>, values: Vec<Value>) -> Self {
        RunningResult::SkipRequested {
            target: target.into(),
            args: Payload::from_values(values),
        }
    }

    pub fn payload(&self) -> &Payload {
        match self {
            RunningResult::Continuing(p) | RunningResult::Terminated(p) => p,
            RunningResult::SkipRequested { args, .. } => args,
        }
    }

    pub fn into_payload(self) -> Payload {
        match self {
            RunningResult::Continuing(p) | RunningResult::Terminated(p) => p,
            RunningResult::SkipRequested { args, .. } => args,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, RunningResult::Terminated(_))
    }

    pub fn skip_target(&self) -> Option<&str> {
        match self {
            RunningResult::SkipRequested { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Advance the result through `stage`.
    ///
    /// - `Continuing` calls the stage with its payload reconciled against
    ///   `arity`.
    /// - `SkipRequested` passes through untouched unless `stage` is its
    ///   target, in which case the carried arguments are applied.
    /// - `Terminated` is a protocol fault.
    pub fn apply_to(self, stage: &Stage, arity: usize) -> Result<RunningResult> {
        match self {
            RunningResult::Terminated(_) => Err(ModpipeError::AdvanceTerminated {
                stage: stage.name().to_string(),
            }),
            RunningResult::SkipRequested { target, args } if target != stage.name() => {
                tracing::trace!(stage = %stage.name(), target = %target, "Skipping stage");
                Ok(RunningResult::SkipRequested { target, args })
            }
            RunningResult::SkipRequested { args, .. } | RunningResult::Continuing(args) => {
                call_reconciled(args, stage, arity)
            }
        }
    }
}

fn call_reconciled(payload: Payload, stage: &Stage, arity: usize) -> Result<RunningResult> {
    let args = payload.clone().into_args(arity);
    tracing::trace!(stage = %stage.name(), arity, argc = args.len(), "Applying stage");

    let emitted = stage.call(args).map_err(|source| {
        tracing::warn!(stage = %stage.name(), error = %source, "Stage failed");
        ModpipeError::StageFailed {
            stage: stage.name().to_string(),
            source: Box::new(source),
        }
    })?;

    Ok(match emitted {
        Emit::Control(next) => next,
        Emit::Value(next) => RunningResult::Continuing(next),
        Emit::Nothing => RunningResult::Continuing(payload),
    })
}

// ---------------------------------------------------------------------------
// Emit: what a stage hands back
// ---------------------------------------------------------------------------

/// Return value of a stage call.
///
/// `Nothing` leaves the payload unchanged, so side-effecting stages can sit in
/// the middle of a pipeline. JSON `null` is an ordinary value, not `Nothing`.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    Nothing,
    Value(Payload),
    Control(RunningResult),
}

impl Emit {
    /// Emit several positional values for the next stage.
    pub fn values(values: Vec<Value>) -> Self {
        Emit::Value(Payload::from_values(values))
    }
}

impl From<()> for Emit {
    fn from(_: ()) -> Self {
        Emit::Nothing
    }
}

impl From<Value> for Emit {
    fn from(value: Value) -> Self {
        Emit::Value(Payload::Single(value))
    }
}

impl From<Payload> for Emit {
    fn from(payload: Payload) -> Self {
        Emit::Value(payload)
    }
}

impl From<RunningResult> for Emit {
    fn from(result: RunningResult) -> Self {
        Emit::Control(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
