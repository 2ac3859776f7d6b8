//! Client Connections
//!
//! One task per accepted client, each owning its socket and its
//! accumulation buffer. The only state shared between connections is the
//! store (behind `CommandHandler`) and the `ConnectionStats` counters.
//!
//! ## Example
//!
//! ```ignore
//! use respite::connection::{handle_connection, ConnectionStats};
//! use respite::commands::CommandHandler;
//! use respite::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage));
//! tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
