//! # respite - an in-memory key-value server speaking RESP
//!
//! A single-process key-value store with per-key expiry, reachable with any
//! Redis client. Values are byte strings; nothing is persisted.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (server.rs) │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌──────────────────────┐  │
//! │                     │ RESP Parser │    │    StorageEngine     │  │
//! │                     └─────────────┘    │ RwLock<HashMap>+Clock│  │
//! │                                        └──────────▲───────────┘  │
//! │                                                   │              │
//! │                                        ┌──────────┴───────────┐  │
//! │                                        │    ExpirySweeper     │  │
//! │                                        │ (optional Tokio task)│  │
//! │                                        └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flow: bytes → [`RespParser`] → [`Command`] → [`CommandHandler`] →
//! reply [`RespValue`] → bytes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use respite::{server, ConnectionStats, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!
//!     server::run(listener, storage, stats, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//!
//! ## Modules
//!
//! - [`protocol`]: RESP frames and parser
//! - [`storage`]: the shared store, its clock, and the expiry sweeper
//! - [`commands`]: request validation and dispatch
//! - [`connection`]: per-client read/execute/reply loop
//! - [`server`]: accept loop
//! - [`config`]: command-line options

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{Command, CommandError, CommandHandler};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
