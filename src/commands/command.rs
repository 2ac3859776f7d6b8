//! Request frames as commands.
//!
//! A client request must be a non-empty array of bulk strings whose first
//! element (the command name) is not null. Anything else is a protocol
//! error: the connection handler replies with an error and closes the
//! connection, and the dispatcher never sees the frame.

use crate::protocol::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// Ways a decoded frame can fail to be a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("expected an array of bulk strings, got {0}")]
    NotAnArray(&'static str),

    #[error("empty command")]
    EmptyCommand,

    #[error("command name must be a non-null bulk string")]
    InvalidCommandName,

    #[error("argument {0} is not a bulk string")]
    InvalidArgument(usize),
}

/// A validated request: a command name plus its arguments.
///
/// Arguments that arrived as null bulk strings are `None`, so handlers can
/// tell a null apart from an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: Bytes,
    args: Vec<Option<Bytes>>,
}

impl Command {
    /// Builds a command from parts. Mostly useful in tests and benchmarks.
    pub fn new(name: impl Into<Bytes>, args: Vec<Option<Bytes>>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The command name exactly as received.
    pub fn name(&self) -> &Bytes {
        &self.name
    }

    /// Arguments after the name.
    pub fn args(&self) -> &[Option<Bytes>] {
        &self.args
    }

    /// Number of elements in the request, counting the name.
    pub fn arity(&self) -> usize {
        self.args.len() + 1
    }
}

fn kind(value: &RespValue) -> &'static str {
    match value {
        RespValue::SimpleString(_) => "simple string",
        RespValue::Error(_) => "error",
        RespValue::Integer(_) => "integer",
        RespValue::BulkString(_) => "bulk string",
        RespValue::Null => "null",
        RespValue::Array(_) => "array",
    }
}

impl TryFrom<RespValue> for Command {
    type Error = ProtocolError;

    fn try_from(frame: RespValue) -> Result<Self, Self::Error> {
        let items = match frame {
            RespValue::Array(items) => items,
            other => return Err(ProtocolError::NotAnArray(kind(&other))),
        };

        let mut items = items.into_iter();
        let name = match items.next() {
            Some(RespValue::BulkString(name)) => name,
            Some(_) => return Err(ProtocolError::InvalidCommandName),
            None => return Err(ProtocolError::EmptyCommand),
        };

        let args = items
            .enumerate()
            .map(|(i, item)| match item {
                RespValue::BulkString(arg) => Ok(Some(arg)),
                RespValue::Null => Ok(None),
                _ => Err(ProtocolError::InvalidArgument(i + 1)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Command { name, args })
    }
}
