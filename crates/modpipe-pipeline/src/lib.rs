//! Pipeline engine built from an ordered namespace of callables.
//!
//! This crate implements the core modpipe runner: stage discovery and
//! source-order sequencing, signature reconciliation, the running-result
//! control protocol (terminate / skip-to), reloadable namespace providers,
//! and broadcast events for observability.

pub mod discovery;
pub mod engine;
pub mod events;
pub mod protocol;
pub mod signatures;
pub mod source;
pub mod stage;

pub use discovery::{
    defined_in, discover, is_pseudo_private, is_simple_callable, remove_matching, sequence,
    DiscoveryOptions, Exclusion,
};
pub use engine::{ModPipe, ModPipeBuilder, PipelineConfig, PipelineSnapshot};
pub use events::{EventEmitter, PipelineEvent};
pub use protocol::{Emit, RunningResult};
pub use signatures::{compile_signatures, ArityTable, SignatureMatch};
pub use source::{
    Binding, Entry, Namespace, NamespaceBuilder, Origin, Registry, SourceProvider, StaticProvider,
};
pub use stage::{SharedCallable, Stage, StageCallable, StageKind};

pub use modpipe_types::{
    Args, FaultKind, ModpipeError, Param, ParamKind, Payload, Result, Signature,
};
