//! Namespaces of named callables and the providers that hand them out.
//!
//! A [`SourceProvider`] returns a fresh [`Namespace`] snapshot every time it is
//! asked, which is what makes a pipeline reloadable. Namespaces are assembled
//! through [`NamespaceBuilder`]. Source text, when present, decides the
//! definition order; otherwise registration order does.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modpipe_types::{Args, ModpipeError, Result, Signature};
use parking_lot::RwLock;
use serde_json::Value;

use crate::protocol::Emit;
use crate::stage::{SharedCallable, StageCallable};

// ---------------------------------------------------------------------------
// Bindings and entries
// ---------------------------------------------------------------------------

/// What a name in a namespace is bound to.
#[derive(Clone)]
pub enum Binding {
    /// A plain function.
    Function {
        signature: Signature,
        callable: SharedCallable,
    },
    /// A pre-built callable object.
    Instance {
        signature: Signature,
        callable: SharedCallable,
    },
    /// A type used as a constructor. Never a stage.
    Type,
    /// Plain data. Never a stage.
    Constant(Value),
}

impl Binding {
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Binding::Function { signature, .. } | Binding::Instance { signature, .. } => {
                Some(signature)
            }
            Binding::Type | Binding::Constant(_) => None,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Function { signature, .. } => write!(f, "Function{signature}"),
            Binding::Instance { signature, .. } => write!(f, "Instance{signature}"),
            Binding::Type => write!(f, "Type"),
            Binding::Constant(v) => write!(f, "Constant({v})"),
        }
    }
}

/// Whether a name was defined in the namespace or merely imported into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Defined,
    Imported,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub binding: Binding,
    pub origin: Origin,
    /// Line of the namespace's source text the definition starts on
    /// (1-based), when known.
    pub line: Option<usize>,
    /// Registration position assigned by [`NamespaceBuilder`]. Only consulted
    /// when the namespace carries no source text.
    pub ordinal: Option<usize>,
}

impl Entry {
    pub fn new(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            binding,
            origin: Origin::Defined,
            line: None,
            ordinal: None,
        }
    }

    pub fn function<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Args) -> Result<Emit> + Send + Sync + 'static,
    {
        Self::new(
            name,
            Binding::Function {
                signature,
                callable: Arc::new(f),
            },
        )
    }

    pub fn instance(
        name: impl Into<String>,
        signature: Signature,
        callable: impl StageCallable + 'static,
    ) -> Self {
        Self::new(
            name,
            Binding::Instance {
                signature,
                callable: Arc::new(callable),
            },
        )
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn imported(mut self) -> Self {
        self.origin = Origin::Imported;
        self
    }
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// One snapshot of everything bound in a namespace.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    /// Where the namespace lives, for diagnostics.
    pub location: Option<PathBuf>,
    /// Raw source text, scanned for entries with no known line.
    pub source: Option<String>,
    pub entries: Vec<Entry>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            source: None,
            entries: Vec::new(),
        }
    }

    pub fn builder(name: impl Into<String>) -> NamespaceBuilder {
        NamespaceBuilder::new(name)
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Collects definitions in order.
///
/// Each placed registration takes the next ordinal, so without source text
/// the order of builder calls is the order stages run in. With source text
/// the text decides, and every stage must be findable in it.
pub struct NamespaceBuilder {
    namespace: Namespace,
    next_ordinal: usize,
}

impl NamespaceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::new(name),
            next_ordinal: 1,
        }
    }

    pub fn location(mut self, path: impl Into<PathBuf>) -> Self {
        self.namespace.location = Some(path.into());
        self
    }

    pub fn source(mut self, text: impl Into<String>) -> Self {
        self.namespace.source = Some(text.into());
        self
    }

    /// Read the namespace's source text from `path` and record it as the
    /// location.
    pub fn source_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        self.namespace.source = Some(text);
        self.namespace.location = Some(path.to_path_buf());
        Ok(self)
    }

    pub fn function<F>(self, name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Args) -> Result<Emit> + Send + Sync + 'static,
    {
        self.placed(Entry::function(name, signature, f))
    }

    pub fn instance(
        self,
        name: impl Into<String>,
        signature: Signature,
        callable: impl StageCallable + 'static,
    ) -> Self {
        self.placed(Entry::instance(name, signature, callable))
    }

    /// Register an instance whose position must be found in the source text.
    pub fn unplaced_instance(
        self,
        name: impl Into<String>,
        signature: Signature,
        callable: impl StageCallable + 'static,
    ) -> Self {
        self.entry(Entry::instance(name, signature, callable))
    }

    pub fn class(self, name: impl Into<String>) -> Self {
        self.placed(Entry::new(name, Binding::Type))
    }

    pub fn constant(self, name: impl Into<String>, value: Value) -> Self {
        self.placed(Entry::new(name, Binding::Constant(value)))
    }

    /// Bring in a binding from elsewhere. Imported names are never stages.
    pub fn import(self, name: impl Into<String>, binding: Binding) -> Self {
        self.entry(Entry::new(name, binding).imported())
    }

    /// Add a prepared entry as-is, keeping whatever line it carries. An
    /// explicit line also moves the ordinal cursor past it.
    pub fn entry(mut self, entry: Entry) -> Self {
        if let Some(line) = entry.line {
            self.next_ordinal = self.next_ordinal.max(line + 1);
        }
        self.namespace.entries.push(entry);
        self
    }

    pub fn build(self) -> Namespace {
        self.namespace
    }

    fn placed(mut self, mut entry: Entry) -> Self {
        entry.ordinal = Some(self.next_ordinal);
        self.next_ordinal += 1;
        self.namespace.entries.push(entry);
        self
    }
}

// ---------------------------------------------------------------------------
// SourceProvider
// ---------------------------------------------------------------------------

/// Supplies fresh namespace snapshots by identifier.
pub trait SourceProvider: Send + Sync {
    fn fetch(&self, namespace: &str) -> Result<Namespace>;
}

impl<F> SourceProvider for F
where
    F: Fn(&str) -> Result<Namespace> + Send + Sync,
{
    fn fetch(&self, namespace: &str) -> Result<Namespace> {
        self(namespace)
    }
}

type Factory = Arc<dyn Fn() -> Result<Namespace> + Send + Sync>;

/// Named namespace factories.
///
/// Every fetch re-runs the factory, so a factory that reads files or rebuilds
/// closures yields new code on reload. Re-registering a name swaps the code
/// that the next reload will see.
#[derive(Clone, Default)]
pub struct Registry {
    factories: Arc<RwLock<HashMap<String, Factory>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, namespace: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Namespace> + Send + Sync + 'static,
    {
        let namespace = namespace.into();
        tracing::debug!(namespace = %namespace, "Namespace registered");
        self.factories.write().insert(namespace, Arc::new(factory));
    }

    pub fn unregister(&self, namespace: &str) -> bool {
        self.factories.write().remove(namespace).is_some()
    }

    pub fn has(&self, namespace: &str) -> bool {
        self.factories.read().contains_key(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SourceProvider for Registry {
    fn fetch(&self, namespace: &str) -> Result<Namespace> {
        // Release the lock before running user code.
        let factory = self
            .factories
            .read()
            .get(namespace)
            .cloned()
            .ok_or_else(|| ModpipeError::NamespaceNotFound {
                namespace: namespace.to_string(),
            })?;
        factory()
    }
}

/// Serves one already-resolved namespace.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    namespace: Namespace,
}

impl StaticProvider {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }
}

impl SourceProvider for StaticProvider {
    fn fetch(&self, namespace: &str) -> Result<Namespace> {
        if namespace == self.namespace.name {
            Ok(self.namespace.clone())
        } else {
            Err(ModpipeError::NamespaceNotFound {
                namespace: namespace.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
