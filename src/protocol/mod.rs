//! RESP Protocol Implementation
//!
//! Converts raw bytes to and from protocol frames.
//!
//! - `types`: the `RespValue` frame and its serialization
//! - `parser`: incremental parser for incoming bytes
//!
//! ## Example
//!
//! ```
//! use respite::protocol::{parse_message, RespValue};
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert_eq!(value.serialize(), data);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser, MAX_BULK_SIZE};
pub use types::{line_text, RespValue};
