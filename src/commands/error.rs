use crate::protocol::RespValue;

/// Per-request failures. The connection stays open after any of these.
///
/// The `Display` text is the exact error line sent to the client. Clients
/// match on it, so the wording (including "postive") is part of the wire
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("ERR Invalid command: \"{0}\"")]
    UnknownCommand(String),

    #[error("ERR Syntax error")]
    Syntax,

    #[error("ERR Wrong number of arguments")]
    WrongArity,

    #[error("ERR Invalid value for \"{0}\": Value cannot be null")]
    NullValue(&'static str),

    #[error("ERR Invalid value for \"PX\": Value must be a postive integer")]
    InvalidPx,
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::Error(err.to_string())
    }
}

pub type CommandResult = Result<RespValue, CommandError>;
