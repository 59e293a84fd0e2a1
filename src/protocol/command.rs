//! Command definitions
//!
//! A command line is `VERB[ FILENAME[ PAYLOAD]]`. The line is split on the
//! first two spaces only, so the PUT payload is never re-split.

use std::fmt;

use crate::error::{PoolError, Result};

/// Message returned for unknown verbs and missing arguments
pub const INVALID_COMMAND: &str = "invalid command";

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    List,
    Get,
    Put,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::List => "LIST",
            Verb::Get => "GET",
            Verb::Put => "PUT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enumerate the store
    List,

    /// Fetch a whole file
    Get { filename: String },

    /// Create or overwrite a whole file; `payload` is base64 text
    Put { filename: String, payload: String },
}

impl Command {
    /// Get the command verb
    pub fn verb(&self) -> Verb {
        match self {
            Command::List => Verb::List,
            Command::Get { .. } => Verb::Get,
            Command::Put { .. } => Verb::Put,
        }
    }

    /// Filename argument, if the verb takes one
    pub fn filename(&self) -> Option<&str> {
        match self {
            Command::List => None,
            Command::Get { filename } | Command::Put { filename, .. } => Some(filename),
        }
    }

    /// Parse a decoded command line
    ///
    /// The verb is case-insensitive. GET and PUT need a non-empty filename,
    /// PUT also needs a payload field (which may be empty).
    pub fn parse(line: &str) -> Result<Command> {
        let mut parts = line.splitn(3, ' ');
        let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
        let filename = parts.next().filter(|name| !name.is_empty());
        let rest = parts.next();

        match (verb.as_str(), filename, rest) {
            ("LIST", _, _) => Ok(Command::List),
            ("GET", Some(filename), _) => Ok(Command::Get {
                filename: filename.to_string(),
            }),
            ("PUT", Some(filename), Some(payload)) => Ok(Command::Put {
                filename: filename.to_string(),
                payload: payload.to_string(),
            }),
            _ => Err(PoolError::Command(INVALID_COMMAND.to_string())),
        }
    }

    /// Render the command line (without the delimiter)
    pub fn to_line(&self) -> String {
        match self {
            Command::List => Verb::List.to_string(),
            Command::Get { filename } => format!("{} {}", Verb::Get, filename),
            Command::Put { filename, payload } => {
                format!("{} {} {}", Verb::Put, filename, payload)
            }
        }
    }
}
