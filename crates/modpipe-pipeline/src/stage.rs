//! Stage callable trait and the resolved `Stage` wrapper.

use std::fmt;
use std::sync::Arc;

use modpipe_types::{Args, Result, Signature};

use crate::protocol::Emit;

// ---------------------------------------------------------------------------
// StageCallable trait
// ---------------------------------------------------------------------------

/// Anything that can be invoked as a pipeline step.
///
/// Closures of the shape `Fn(Args) -> Result<Emit>` implement this
/// automatically. Structs implement it to act as callable instances that
/// carry their own state (a pre-built scaler, a lookup table, ...).
pub trait StageCallable: Send + Sync {
    fn call(&self, args: Args) -> Result<Emit>;
}

impl<F> StageCallable for F
where
    F: Fn(Args) -> Result<Emit> + Send + Sync,
{
    fn call(&self, args: Args) -> Result<Emit> {
        self(args)
    }
}

/// Shared handle to a stage callable.
pub type SharedCallable = Arc<dyn StageCallable>;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Whether a stage came from a plain function or a callable instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Function,
    Instance,
}

/// A named, positioned, callable unit of work inside a pipeline.
#[derive(Clone)]
pub struct Stage {
    name: String,
    signature: Signature,
    callable: SharedCallable,
    kind: StageKind,
    line: usize,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        callable: SharedCallable,
        kind: StageKind,
        line: usize,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            callable,
            kind,
            line,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Source position the stage was sequenced by (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn callable(&self) -> &SharedCallable {
        &self.callable
    }

    /// Call the stage directly, bypassing the pipeline.
    pub fn call(&self, args: Args) -> Result<Emit> {
        self.callable.call(args)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("kind", &self.kind)
            .field("line", &self.line)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Offset(i64);

    impl StageCallable for Offset {
        fn call(&self, args: Args) -> Result<Emit> {
            let x: i64 = args.parse(0)?;
            Ok(json!(x + self.0).into())
        }
    }

    #[test]
    fn closures_are_callables() {
        let stage = Stage::new(
            "double",
            Signature::positional(["x"]),
            Arc::new(|args: Args| -> Result<Emit> {
                let x: i64 = args.parse(0)?;
                Ok(json!(x * 2).into())
            }),
            StageKind::Function,
            1,
        );
        let out = stage.call(Args::new(vec![json!(4)])).unwrap();
        assert!(matches!(out, Emit::Value(p) if p.as_single() == Some(&json!(8))));
    }

    #[test]
    fn structs_are_callable_instances() {
        let stage = Stage::new(
            "plus_three",
            Signature::positional(["x"]),
            Arc::new(Offset(3)),
            StageKind::Instance,
            7,
        );
        assert_eq!(stage.arity(), 1);
        assert_eq!(stage.line(), 7);
        assert_eq!(stage.kind(), StageKind::Instance);
        let out = stage.call(Args::new(vec![json!(1)])).unwrap();
        assert!(matches!(out, Emit::Value(p) if p.as_single() == Some(&json!(4))));
    }

    #[test]
    fn debug_shows_signature() {
        let stage = Stage::new(
            "noop",
            Signature::positional(["a", "b"]),
            Arc::new(|_args: Args| -> Result<Emit> { Ok(Emit::Nothing) }),
            StageKind::Function,
            2,
        );
        let rendered = format!("{stage:?}");
        assert!(rendered.contains("noop"));
        assert!(rendered.contains("(a, b)"));
    }
}
