//! Dynamically-typed component state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A component's state: string keys to heterogeneous values.
///
/// Ordered so that snapshots serialize and iterate deterministically.
pub type StateMap = BTreeMap<String, StateValue>;

/// A single state value.
///
/// Serialized untagged, so a state map round-trips through plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<StateValue>),
    Map(StateMap),
}

/// Conversion failure from an arbitrary JSON value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueConversionError {
    #[error("null has no state representation")]
    Null,

    #[error("number {0} is out of range")]
    NumberOutOfRange(String),
}

impl StateValue {
    /// Human-readable name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            StateValue::Bool(_) => "bool",
            StateValue::Int(_) => "int",
            StateValue::Float(_) => "float",
            StateValue::String(_) => "string",
            StateValue::List(_) => "list",
            StateValue::Map(_) => "map",
        }
    }

    /// Truthiness used by template conditionals: zero values are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            StateValue::Bool(b) => *b,
            StateValue::Int(n) => *n != 0,
            StateValue::Float(f) => *f != 0.0,
            StateValue::String(s) => !s.is_empty(),
            StateValue::List(items) => !items.is_empty(),
            StateValue::Map(map) => !map.is_empty(),
        }
    }

    /// Whether the value has a scalar text form.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, StateValue::List(_) | StateValue::Map(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Int(n) => Some(*n as f64),
            StateValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<StateValue>> {
        match self {
            StateValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&StateMap> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut StateMap> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    /// Scalars print their plain text form; collections print as JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Int(n) => write!(f, "{}", n),
            StateValue::Float(x) => write!(f, "{}", x),
            StateValue::String(s) => f.write_str(s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::Int(value.into())
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::Int(value.into())
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::String(value)
    }
}

impl<T: Into<StateValue>> From<Vec<T>> for StateValue {
    fn from(value: Vec<T>) -> Self {
        StateValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<StateMap> for StateValue {
    fn from(value: StateMap) -> Self {
        StateValue::Map(value)
    }
}

impl TryFrom<serde_json::Value> for StateValue {
    type Error = ValueConversionError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => return Err(ValueConversionError::Null),
            Value::Bool(b) => StateValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    StateValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    StateValue::Float(f)
                } else {
                    return Err(ValueConversionError::NumberOutOfRange(n.to_string()));
                }
            }
            Value::String(s) => StateValue::String(s),
            Value::Array(items) => StateValue::List(
                items
                    .into_iter()
                    .map(StateValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => StateValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, StateValue::try_from(v)?)))
                    .collect::<Result<_, ValueConversionError>>()?,
            ),
        })
    }
}

/// Build a [`StateMap`] from key/value pairs.
///
/// ```
/// use sigma_types::{state_map, StateValue};
///
/// let state = state_map([("Count", StateValue::from(0))]);
/// assert_eq!(state["Count"], StateValue::Int(0));
/// ```
pub fn state_map<K, V, I>(entries: I) -> StateMap
where
    K: Into<String>,
    V: Into<StateValue>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
