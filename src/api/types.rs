//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Any JSON number, as clients send it.
    pub age: Number,
    pub hobbies: String,
}

/// Body of create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInput {
    pub username: String,
    pub age: Number,
    pub hobbies: String,
}

/// Response envelope: `{data, message}`, or just `{message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` with a success message.
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: message.into(),
        }
    }
}

impl ApiResponse<()> {
    /// A response carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
        }
    }
}
