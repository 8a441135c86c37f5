//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel. The
//! engine itself never awaits: sending is synchronous, and subscribers in
//! synchronous code can drain their receiver with `try_recv`.

use serde::{Deserialize, Serialize};

/// Events emitted while loading and invoking a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineLoaded {
        namespace: String,
        stage_count: usize,
    },
    StageApplied {
        stage: String,
    },
    StageSkipped {
        stage: String,
        target: String,
    },
    PipelineTerminated {
        stage: String,
    },
    InvocationCompleted {
        namespace: String,
        stages_run: usize,
    },
    StageRemoved {
        stage: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
