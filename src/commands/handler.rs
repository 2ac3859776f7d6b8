//! Command Dispatcher
//!
//! Turns a validated [`Command`] into a reply frame.
//!
//! ## Supported Commands
//!
//! - `PING` - replies `+PONG`
//! - `ECHO message` - replies with `message` as a bulk string
//! - `SET key value [PX milliseconds]` - stores a value, optionally expiring
//! - `GET key` - returns the value, or a null bulk string
//!
//! Command names match case-insensitively. The `PX` keyword is matched
//! exactly.
//!
//! ## Validation
//!
//! Each handler checks argument count before argument contents, and returns
//! before touching the store if either check fails. Failures become `-ERR`
//! replies and never close the connection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │   execute() ──> dispatch by name ──> cmd_*() ──> validate   │
//! │                                                    │        │
//! │                                                    ▼        │
//! │                                             StorageEngine   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::command::Command;
use crate::commands::error::{CommandError, CommandResult};
use crate::protocol::{line_text, RespValue};
use crate::storage::{SetOptions, StorageEngine};
use bytes::Bytes;
use std::sync::Arc;

/// Executes commands against a shared store.
///
/// Cheap to clone; every connection gets its own handle to the same store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply frame.
    ///
    /// # Example
    ///
    /// ```
    /// use respite::commands::{Command, CommandHandler};
    /// use respite::protocol::RespValue;
    /// use respite::storage::StorageEngine;
    /// use std::sync::Arc;
    ///
    /// let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    /// let reply = handler.execute(&Command::new("ping", vec![]));
    /// assert_eq!(reply, RespValue::pong());
    /// ```
    pub fn execute(&self, command: &Command) -> RespValue {
        self.dispatch(command).unwrap_or_else(RespValue::from)
    }

    fn dispatch(&self, command: &Command) -> CommandResult {
        let name = command.name().as_ref();
        let args = command.args();

        if name.eq_ignore_ascii_case(b"PING") {
            self.cmd_ping(args)
        } else if name.eq_ignore_ascii_case(b"ECHO") {
            self.cmd_echo(args)
        } else if name.eq_ignore_ascii_case(b"SET") {
            self.cmd_set(args)
        } else if name.eq_ignore_ascii_case(b"GET") {
            self.cmd_get(args)
        } else {
            Err(CommandError::UnknownCommand(line_text(name)))
        }
    }

    /// PING
    fn cmd_ping(&self, args: &[Option<Bytes>]) -> CommandResult {
        if !args.is_empty() {
            return Err(CommandError::WrongArity);
        }
        Ok(RespValue::pong())
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Option<Bytes>]) -> CommandResult {
        let [message] = args else {
            return Err(CommandError::Syntax);
        };
        let message = non_null(message, "message")?;
        Ok(RespValue::bulk_string(message.clone()))
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Option<Bytes>]) -> CommandResult {
        let (key, value, options) = match args {
            [key, value] => (key, value, None),
            [key, value, keyword, ttl] => (key, value, Some((keyword, ttl))),
            [] | [_] => return Err(CommandError::WrongArity),
            // Anything else is an option this server does not speak
            // (EX, NX, XX, KEEPTTL, ...).
            _ => return Err(CommandError::Syntax),
        };

        let key = non_null(key, "key")?;
        let value = non_null(value, "value")?;

        let options = match options {
            None => SetOptions::default(),
            Some((keyword, ttl)) => {
                if keyword.as_deref() != Some(b"PX".as_slice()) {
                    return Err(CommandError::Syntax);
                }
                let ms = ttl
                    .as_deref()
                    .and_then(parse_milliseconds)
                    .ok_or(CommandError::InvalidPx)?;
                SetOptions::px(ms)
            }
        };

        self.storage.set(key.clone(), value.clone(), options);
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Option<Bytes>]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity);
        };
        let key = non_null(key, "key")?;

        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }
}

fn non_null<'a>(arg: &'a Option<Bytes>, field: &'static str) -> Result<&'a Bytes, CommandError> {
    arg.as_ref().ok_or(CommandError::NullValue(field))
}

/// Parses a non-negative decimal integer made only of ASCII digits.
fn parse_milliseconds(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}
