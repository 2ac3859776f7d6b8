//! Command Processing
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ RespValue
//!          ▼
//! ┌─────────────────┐
//! │ Command::try_from│  protocol errors close the connection
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  command errors become -ERR replies
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod command;
pub mod error;
pub mod handler;

pub use command::{Command, ProtocolError};
pub use error::{CommandError, CommandResult};
pub use handler::CommandHandler;
