//! Pipeline engine: owns the loaded stage list and drives invocations.
//!
//! Lifecycle: a `ModPipe` is only handed out after its first successful load,
//! and every reload either replaces the stage list and arity table together
//! or leaves both untouched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modpipe_types::{ModpipeError, Payload, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::discovery::{discover, DiscoveryOptions, Exclusion};
use crate::events::{EventEmitter, PipelineEvent};
use crate::protocol::RunningResult;
use crate::signatures::{compile_signatures, ArityTable, SignatureMatch};
use crate::source::{Binding, Namespace, SourceProvider, StaticProvider};
use crate::stage::Stage;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load-time options for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Require every stage to share the call shape of its predecessor.
    pub uniform_signatures: bool,
    /// Compare only parameter kinds when checking uniformity.
    pub ignore_param_names: bool,
    /// Leave names with a leading underscore out of the pipeline.
    pub elide_helpers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            uniform_signatures: false,
            ignore_param_names: true,
            elide_helpers: true,
        }
    }
}

impl PipelineConfig {
    pub fn signature_match(&self) -> SignatureMatch {
        if self.ignore_param_names {
            SignatureMatch::IgnoreNames
        } else {
            SignatureMatch::Exact
        }
    }
}

/// The persisted form of a pipeline: identity and flags, never callables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub namespace: String,
    pub config: PipelineConfig,
}

impl PipelineSnapshot {
    /// Rebuild a live pipeline by loading the namespace again.
    pub fn restore(self, provider: impl SourceProvider + 'static) -> Result<ModPipe> {
        ModPipe::builder(provider, self.namespace)
            .config(self.config)
            .build()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ModPipeBuilder {
    provider: Arc<dyn SourceProvider>,
    namespace: String,
    config: PipelineConfig,
    exclusions: Vec<Exclusion>,
    events: Option<EventEmitter>,
}

impl ModPipeBuilder {
    pub fn uniform_signatures(mut self, enforce: bool) -> Self {
        self.config.uniform_signatures = enforce;
        self
    }

    pub fn ignore_param_names(mut self, ignore: bool) -> Self {
        self.config.ignore_param_names = ignore;
        self
    }

    pub fn elide_helpers(mut self, elide: bool) -> Self {
        self.config.elide_helpers = elide;
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Exclude entries for which `predicate(name, binding)` is true. Applied
    /// on every reload.
    pub fn exclude<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, &Binding) -> bool + Send + Sync + 'static,
    {
        self.exclusions.push(Arc::new(predicate));
        self
    }

    pub fn events(mut self, emitter: EventEmitter) -> Self {
        self.events = Some(emitter);
        self
    }

    /// Load the namespace and return a ready pipeline.
    pub fn build(self) -> Result<ModPipe> {
        let mut pipe = ModPipe {
            provider: self.provider,
            namespace: self.namespace,
            location: None,
            config: self.config,
            exclusions: self.exclusions,
            stages: Vec::new(),
            arities: ArityTable::default(),
            events: self.events.unwrap_or_default(),
        };
        pipe.reload()?;
        Ok(pipe)
    }
}

// ---------------------------------------------------------------------------
// ModPipe
// ---------------------------------------------------------------------------

/// An ordered, reloadable pipeline built from a namespace.
///
/// Not internally synchronized: reloading or removing stages while another
/// thread invokes the same instance needs an external lock.
pub struct ModPipe {
    provider: Arc<dyn SourceProvider>,
    namespace: String,
    location: Option<PathBuf>,
    config: PipelineConfig,
    exclusions: Vec<Exclusion>,
    stages: Vec<Stage>,
    arities: ArityTable,
    events: EventEmitter,
}

impl ModPipe {
    /// Load `namespace` with default options.
    pub fn on(
        provider: impl SourceProvider + 'static,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(provider, namespace).build()
    }

    pub fn builder(
        provider: impl SourceProvider + 'static,
        namespace: impl Into<String>,
    ) -> ModPipeBuilder {
        ModPipeBuilder {
            provider: Arc::new(provider),
            namespace: namespace.into(),
            config: PipelineConfig::default(),
            exclusions: Vec::new(),
            events: None,
        }
    }

    /// Build from an already-resolved namespace handle. Reloads see the same
    /// snapshot.
    pub fn from_namespace(namespace: Namespace, config: PipelineConfig) -> Result<Self> {
        let name = namespace.name.clone();
        Self::builder(StaticProvider::new(namespace), name)
            .config(config)
            .build()
    }

    /// Restore from [`to_bytes`](ModPipe::to_bytes) output. Triggers a fresh load.
    pub fn from_bytes(bytes: &[u8], provider: impl SourceProvider + 'static) -> Result<Self> {
        let snapshot: PipelineSnapshot = serde_json::from_slice(bytes)?;
        snapshot.restore(provider)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            namespace: self.namespace.clone(),
            config: self.config,
        }
    }

    /// Re-fetch the namespace and rebuild stages and arities as a unit.
    ///
    /// On failure the previously loaded stages stay in place.
    pub fn reload(&mut self) -> Result<()> {
        let namespace = self.provider.fetch(&self.namespace)?;
        let location = namespace.location.clone();

        let options = DiscoveryOptions {
            elide_helpers: self.config.elide_helpers,
            exclusions: self.exclusions.clone(),
        };
        let stages = discover(namespace, &options)?;
        if stages.is_empty() {
            return Err(ModpipeError::EmptyPipeline {
                namespace: self.namespace.clone(),
            });
        }
        let arities = compile_signatures(
            &stages,
            self.config.uniform_signatures,
            self.config.signature_match(),
        )?;

        self.location = location;
        self.stages = stages;
        self.arities = arities;

        tracing::debug!(
            namespace = %self.namespace,
            stages = self.stages.len(),
            "Pipeline loaded"
        );
        self.events.emit(PipelineEvent::PipelineLoaded {
            namespace: self.namespace.clone(),
            stage_count: self.stages.len(),
        });
        Ok(())
    }

    /// Scoped use: reload, then run `f`. Whatever `f` returns, errors
    /// included, is passed straight back.
    pub fn with_reloaded<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut ModPipe) -> std::result::Result<T, E>,
        E: From<ModpipeError>,
    {
        self.reload()?;
        f(self)
    }

    /// Run the pipeline on `args`.
    ///
    /// Stages run in order until one terminates the run. A skip request that
    /// is still pending once the stages run out is a protocol fault.
    ///
    /// Per-stage events are only built while someone is subscribed.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Payload> {
        let observed = self.events.has_subscribers();
        let mut state = RunningResult::new(args);
        let mut stages_run = 0usize;

        for stage in &self.stages {
            let arity = self
                .arities
                .get(stage.name())
                .ok_or_else(|| ModpipeError::StageNotFound {
                    name: stage.name().to_string(),
                })?;
            let passed_over = state
                .skip_target()
                .filter(|target| *target != stage.name())
                .map(str::to_string);

            state = state.apply_to(stage, arity)?;

            match passed_over {
                Some(target) if observed => self.events.emit(PipelineEvent::StageSkipped {
                    stage: stage.name().to_string(),
                    target,
                }),
                Some(_) => {}
                None => {
                    stages_run += 1;
                    if observed {
                        self.events.emit(PipelineEvent::StageApplied {
                            stage: stage.name().to_string(),
                        });
                    }
                }
            }

            if state.is_terminated() {
                tracing::debug!(
                    namespace = %self.namespace,
                    stage = %stage.name(),
                    "Pipeline terminated early"
                );
                self.events.emit(PipelineEvent::PipelineTerminated {
                    stage: stage.name().to_string(),
                });
                break;
            }
        }

        if let Some(target) = state.skip_target() {
            tracing::warn!(
                namespace = %self.namespace,
                target = %target,
                "Skip target never reached"
            );
            return Err(ModpipeError::SkipTargetNotReached {
                target: target.to_string(),
            });
        }

        self.events.emit(PipelineEvent::InvocationCompleted {
            namespace: self.namespace.clone(),
            stages_run,
        });
        Ok(state.into_payload())
    }

    /// Run the pipeline on a single value.
    pub fn invoke_one(&self, value: impl Into<Value>) -> Result<Payload> {
        self.invoke(vec![value.into()])
    }

    /// Remove a stage and its arity entry.
    pub fn remove_stage(&mut self, name: &str) -> Result<Stage> {
        let idx = self
            .stages
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| ModpipeError::StageNotFound {
                name: name.to_string(),
            })?;
        let stage = self.stages.remove(idx);
        self.arities.remove(name);

        tracing::debug!(namespace = %self.namespace, stage = %name, "Stage removed");
        self.events.emit(PipelineEvent::StageRemoved {
            stage: name.to_string(),
        });
        Ok(stage)
    }

    pub fn stage(&self, name: &str) -> Result<&Stage> {
        self.stages
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ModpipeError::StageNotFound {
                name: name.to_string(),
            })
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn arities(&self) -> &ArityTable {
        &self.arities
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }
}

impl fmt::Display for ModPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModPipe({})", self.namespace)
    }
}

impl fmt::Debug for ModPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModPipe")
            .field("namespace", &self.namespace)
            .field("location", &self.location)
            .field("config", &self.config)
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Serialize for ModPipe {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
