//! RESP reply model.
//!
//! Replies surface to the routing engine as `Value`s. Server-side error
//! replies travel as `Value::Error` rather than `Err`: redirection markers
//! (`MOVED`, `ASK`, `CLUSTERDOWN`) are ordinary error replies that the
//! engine must inspect, and inside a pipeline they arrive interleaved with
//! successful results. Transport failures are real `Err`s at the session
//! layer and never take this shape.

use std::fmt;

/// A single RESP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null bulk string / null array.
    Nil,
    /// RESP integer.
    Int(i64),
    /// Bulk string payload (binary safe).
    Bulk(Vec<u8>),
    /// Simple status string, e.g. `OK`.
    Status(String),
    /// Server error reply, without the leading `-`.
    Error(String),
    /// Array of nested replies.
    Array(Vec<Value>),
}

impl Value {
    /// Shorthand for an `OK` status reply.
    pub fn ok() -> Value {
        Value::Status("OK".to_string())
    }

    /// Bulk string built from text.
    pub fn bulk(data: impl Into<Vec<u8>>) -> Value {
        Value::Bulk(data.into())
    }

    /// The error text, if this reply is a server error.
    pub fn error_str(&self) -> Option<&str> {
        match self {
            Value::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Whether this reply is a server error starting with `prefix`.
    pub fn is_error_with_prefix(&self, prefix: &str) -> bool {
        self.error_str().is_some_and(|msg| msg.starts_with(prefix))
    }

    /// Bulk or status payload as UTF-8 text, when applicable.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bulk(data) => std::str::from_utf8(data).ok(),
            Value::Status(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bulk(data) => write!(f, "{}", String::from_utf8_lossy(data)),
            Value::Status(s) => write!(f, "{s}"),
            Value::Error(msg) => write!(f, "(error) {msg}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
