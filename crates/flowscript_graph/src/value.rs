// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime values and declared port types.

use serde::{Deserialize, Serialize};

/// A value flowing through value ports at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    String(String),
}

impl Value {
    /// Get the declared type of this value
    pub fn type_of(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
        }
    }

    /// Read as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read as integer, truncating floats
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Read as float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Read as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check whether this value is assignable to a declared type
    pub fn conforms_to(&self, ty: &ValueType) -> bool {
        self.type_of().can_connect_to(ty)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl TryFrom<Value> for bool {
    type Error = Value;

    fn try_from(v: Value) -> Result<Self, Value> {
        v.as_bool().ok_or(v)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Value;

    fn try_from(v: Value) -> Result<Self, Value> {
        v.as_int().ok_or(v)
    }
}

impl TryFrom<Value> for f64 {
    type Error = Value;

    fn try_from(v: Value) -> Result<Self, Value> {
        v.as_float().ok_or(v)
    }
}

impl TryFrom<Value> for String {
    type Error = Value;

    fn try_from(v: Value) -> Result<Self, Value> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(other),
        }
    }
}

/// Declared type of a value port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Absent value
    Null,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// String value
    String,
    /// Any type (for generic nodes)
    Any,
    /// Custom type, matched by name
    Custom(String),
}

impl ValueType {
    /// Check if a port of this type can connect to a port of another type.
    ///
    /// `Any` bridges everything, `Int` and `Float` convert both ways,
    /// everything else requires equality.
    pub fn can_connect_to(&self, other: &ValueType) -> bool {
        if matches!(self, Self::Any) || matches!(other, Self::Any) {
            return true;
        }

        if self == other {
            return true;
        }

        matches!(
            (self, other),
            (Self::Int, Self::Float) | (Self::Float, Self::Int)
        )
    }
}
