//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format (line commands, JSON responses)
//!
//! ### Request Format
//! ```text
//! VERB[ FILENAME[ PAYLOAD]]\r\n\r\n
//! ```
//!
//! ### Commands
//! - LIST                  - enumerate the store
//! - GET <name>            - fetch a whole file
//! - PUT <name> <base64>   - create or overwrite a whole file
//!
//! ### Response Format
//! ```text
//! {"status": "OK"|"ERROR", "data": <names|base64|text>}\r\n\r\n
//! ```
//!
//! One frame per direction per connection.

mod command;
mod frame;
mod response;

pub use command::{Command, Verb, INVALID_COMMAND};
pub use frame::{
    discard_frame, encode_frame, find_delimiter, read_frame, write_frame, DELIMITER,
    READ_CHUNK_SIZE,
};
pub use response::{Data, Response, Status, UPLOADED};
