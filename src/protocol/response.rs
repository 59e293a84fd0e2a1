//! Response definitions
//!
//! Responses travel as a JSON object `{"status": "OK"|"ERROR", "data": ...}`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Confirmation text returned by a successful PUT
pub const UPLOADED: &str = "uploaded";

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

/// Response body: a name list for LIST, text for everything else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Data {
    Files(Vec<String>),
    Text(String),
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub data: Data,
}

impl Response {
    /// OK carrying a sorted listing
    pub fn files(names: Vec<String>) -> Self {
        Self {
            status: Status::Ok,
            data: Data::Files(names),
        }
    }

    /// OK carrying text (base64 content or a confirmation)
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            data: Data::Text(text.into()),
        }
    }

    /// Create an ERROR response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: Data::Text(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            Data::Text(text) => Some(text),
            Data::Files(_) => None,
        }
    }

    /// Human-readable description of the data, used for error reporting
    pub fn describe(&self) -> String {
        match &self.data {
            Data::Text(text) => text.clone(),
            Data::Files(names) => names.join(", "),
        }
    }

    /// Serialize to the JSON body of a response frame
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse the JSON body of a response frame
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
