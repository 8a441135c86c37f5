//! Declared call shapes for pipeline stages.
//!
//! Stages state their parameters when they are registered; nothing is
//! introspected at runtime. A [`Signature`] is used for two things: its
//! [`arity`](Signature::arity) drives argument unpacking, and equality between
//! neighbouring signatures is checked when uniform signatures are enforced.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a parameter may be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// An ordinary named positional parameter.
    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::PositionalOrKeyword)
    }
}

/// Ordered parameter list of a stage.
///
/// `==` is exact equivalence (kinds, names, and order). Use
/// [`same_kinds`](Signature::same_kinds) to ignore parameter names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Signature made only of ordinary positional parameters.
    pub fn positional<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: names.into_iter().map(Param::positional).collect(),
        }
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Arity-only equivalence: parameter kinds match position by position.
    pub fn same_kinds(&self, other: &Signature) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.kind == b.kind)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(self.params.len() + 2);
        let mut pending_slash = false;
        let mut needs_star = true;

        for param in &self.params {
            if param.kind == ParamKind::PositionalOnly {
                pending_slash = true;
            } else if pending_slash {
                parts.push("/".into());
                pending_slash = false;
            }

            match param.kind {
                ParamKind::VarPositional => {
                    needs_star = false;
                    parts.push(format!("*{}", param.name));
                }
                ParamKind::KeywordOnly => {
                    if needs_star {
                        parts.push("*".into());
                        needs_star = false;
                    }
                    parts.push(param.name.clone());
                }
                ParamKind::VarKeyword => parts.push(format!("**{}", param.name)),
                ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                    parts.push(param.name.clone())
                }
            }
        }
        if pending_slash {
            parts.push("/".into());
        }

        write!(f, "({})", parts.join(", "))
    }
}
