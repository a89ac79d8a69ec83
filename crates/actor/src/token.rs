//! Tokens: the discrete data items carried on ports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item on a port queue: a data value or a control marker.
///
/// Tokens are immutable once enqueued; ports hand out clones or move them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Token {
    /// An opaque data value.
    Data(Value),
    /// The channel is closed or exhausted.
    EndOfStream,
    /// An error value flowed where data was expected.
    Exception(String),
}

/// Discriminant of a [`Token`], for logging and matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Data,
    EndOfStream,
    Exception,
}

impl Token {
    /// Create a data token from anything convertible to a JSON value.
    pub fn data(value: impl Into<Value>) -> Self {
        Self::Data(value.into())
    }

    /// Create an exception token.
    pub fn exception(reason: impl Into<String>) -> Self {
        Self::Exception(reason.into())
    }

    /// Get the kind of this token.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Data(_) => TokenKind::Data,
            Self::EndOfStream => TokenKind::EndOfStream,
            Self::Exception(_) => TokenKind::Exception,
        }
    }

    /// Whether this is a control token (end-of-stream or exception).
    #[must_use]
    pub const fn is_control(&self) -> bool {
        !matches!(self, Self::Data(_))
    }

    /// Borrow the data value, if this is a data token.
    #[must_use]
    pub const fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::EndOfStream | Self::Exception(_) => None,
        }
    }

    /// Borrow the data value as a string slice, if it is a JSON string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Value::as_str)
    }

    /// Consume the token and return its data value.
    #[must_use]
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::EndOfStream | Self::Exception(_) => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::EndOfStream => write!(f, "end_of_stream"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

impl From<Value> for Token {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}
