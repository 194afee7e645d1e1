//! Erased-typed values for capability negotiation.
//!
//! Capability maps carry values whose types are only known to the peers that
//! understand the capability. [`DynValue`] is the tagged sum that crosses
//! the handshake; [`FromDynValue`] is the explicit conversion used by typed
//! reads. Conversion failure is an `Option::None`, never an error — the
//! backward-compatibility contract requires callers to fall back to their
//! defaults instead of propagating.

use serde::{Deserialize, Serialize};

/// A dynamically-typed capability value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynValue {
    /// A boolean flag, the most common capability shape.
    Bool(bool),
    /// A signed integer parameter.
    Int(i64),
    /// A free-form string parameter, stored verbatim.
    Str(String),
}

impl DynValue {
    /// Convert to a concrete type, if the value is convertible.
    pub fn to<T: FromDynValue>(&self) -> Option<T> {
        T::from_dyn(self)
    }
}

impl From<bool> for DynValue {
    fn from(value: bool) -> Self {
        DynValue::Bool(value)
    }
}

impl From<i64> for DynValue {
    fn from(value: i64) -> Self {
        DynValue::Int(value)
    }
}

impl From<&str> for DynValue {
    fn from(value: &str) -> Self {
        DynValue::Str(value.to_owned())
    }
}

impl From<String> for DynValue {
    fn from(value: String) -> Self {
        DynValue::Str(value)
    }
}

impl std::fmt::Display for DynValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DynValue::Bool(value) => write!(f, "{value}"),
            DynValue::Int(value) => write!(f, "{value}"),
            DynValue::Str(value) => write!(f, "{value}"),
        }
    }
}

/// Conversion out of a [`DynValue`].
///
/// Implementations return `None` on a type mismatch; they never panic and
/// never invent a value.
pub trait FromDynValue: Sized {
    /// Try to read `value` as `Self`.
    fn from_dyn(value: &DynValue) -> Option<Self>;
}

impl FromDynValue for bool {
    fn from_dyn(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Bool(flag) => Some(*flag),
            DynValue::Int(int) => Some(*int != 0),
            DynValue::Str(text) => text.parse().ok(),
        }
    }
}

impl FromDynValue for i64 {
    fn from_dyn(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Int(int) => Some(*int),
            DynValue::Bool(flag) => Some(i64::from(*flag)),
            DynValue::Str(text) => text.parse().ok(),
        }
    }
}

// Strings convert only from strings. Implicit stringification would make a
// peer's `Bool(true)` and `Str("true")` indistinguishable downstream.
impl FromDynValue for String {
    fn from_dyn(value: &DynValue) -> Option<Self> {
        match value {
            DynValue::Str(text) => Some(text.clone()),
            DynValue::Bool(_) | DynValue::Int(_) => None,
        }
    }
}
