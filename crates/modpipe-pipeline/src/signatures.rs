//! Signature reconciliation: arity table and optional uniformity check.

use std::collections::HashMap;

use modpipe_types::{ModpipeError, Result, Signature};
use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// How two neighbouring signatures are compared under uniformity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMatch {
    /// Parameter kinds must line up; names are ignored.
    #[default]
    IgnoreNames,
    /// Kinds, names, and order must all match.
    Exact,
}

impl SignatureMatch {
    pub fn equivalent(self, a: &Signature, b: &Signature) -> bool {
        match self {
            SignatureMatch::IgnoreNames => a.same_kinds(b),
            SignatureMatch::Exact => a == b,
        }
    }
}

/// Stage name to effective arity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArityTable {
    arities: HashMap<String, usize>,
}

impl ArityTable {
    pub fn get(&self, stage: &str) -> Option<usize> {
        self.arities.get(stage).copied()
    }

    pub fn insert(&mut self, stage: impl Into<String>, arity: usize) {
        self.arities.insert(stage.into(), arity);
    }

    pub fn remove(&mut self, stage: &str) -> Option<usize> {
        self.arities.remove(stage)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.arities.contains_key(stage)
    }

    pub fn len(&self) -> usize {
        self.arities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.arities.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Build the arity table for `stages`.
///
/// With `uniform` set, each signature is compared to the one immediately
/// before it, so the error names the first point of divergence.
pub fn compile_signatures(
    stages: &[Stage],
    uniform: bool,
    matching: SignatureMatch,
) -> Result<ArityTable> {
    if uniform {
        for pair in stages.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if !matching.equivalent(prev.signature(), next.signature()) {
                return Err(ModpipeError::SignatureMismatch {
                    stage: next.name().to_string(),
                    signature: next.signature().clone(),
                    expected: prev.signature().clone(),
                });
            }
        }
    }

    let mut table = ArityTable::default();
    for stage in stages {
        table.insert(stage.name(), stage.arity());
    }
    Ok(table)
}
