//! Values threaded between pipeline stages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ModpipeError, Result};

/// The current payload of a running pipeline.
///
/// A `Tuple` holds several positional values and is unpacked when the next
/// stage declares exactly that many parameters. A `Single` value is always
/// passed whole, even when it is a JSON array: lists are data, tuples are
/// argument packs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Single(Value),
    Tuple(Vec<Value>),
}

impl Payload {
    /// Build a payload from positional values. Exactly one value is stored
    /// bare; zero or several become a tuple.
    pub fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Payload::Single(values.remove(0))
        } else {
            Payload::Tuple(values)
        }
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Payload::Single(value.into())
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Payload::Single(v) => Some(v),
            Payload::Tuple(_) => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Payload::Single(_) => None,
            Payload::Tuple(vs) => Some(vs),
        }
    }

    /// Reconcile the payload against a stage arity.
    ///
    /// A tuple whose length equals `arity` is unpacked into separate
    /// arguments; anything else is handed over as a single argument.
    pub fn into_args(self, arity: usize) -> Args {
        match self {
            Payload::Tuple(values) if values.len() == arity => Args(values),
            other => Args(vec![other.into_value()]),
        }
    }

    /// Collapse into one JSON value; tuples become arrays.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Single(v) => v,
            Payload::Tuple(vs) => Value::Array(vs),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Single(value)
    }
}

impl From<Vec<Value>> for Payload {
    fn from(values: Vec<Value>) -> Self {
        Payload::from_values(values)
    }
}

/// Positional arguments handed to a stage call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Borrow argument `index`, failing when the caller supplied fewer.
    pub fn value(&self, index: usize) -> Result<&Value> {
        self.0.get(index).ok_or(ModpipeError::MissingArgument {
            index,
            count: self.0.len(),
        })
    }

    /// Decode argument `index` into `T`.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        T::deserialize(self.value(index)?).map_err(|e| ModpipeError::InvalidArgument {
            index,
            message: e.to_string(),
        })
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// Repackage the arguments as a payload (one value stays bare).
    pub fn into_payload(self) -> Payload {
        Payload::from_values(self.0)
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl IntoIterator for Args {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
