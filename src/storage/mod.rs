//! Storage Engine Module
//!
//! The in-memory keyspace shared by every connection.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              StorageEngine                │
//! │   RwLock<HashMap<Bytes, Entry>>  + Clock  │
//! └───────────────────────────────────────────┘
//!                      ▲
//!                      │ cleanup_expired()
//!        ┌─────────────┴─────────────┐
//!        │      ExpirySweeper        │
//!        │  (optional Tokio task)    │
//!        └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use respite::storage::{ManualClock, SetOptions, StorageEngine};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(ManualClock::new());
//! let engine = StorageEngine::with_clock(clock.clone());
//!
//! engine.set(Bytes::from("hello"), Bytes::from("world"), SetOptions::px(100));
//! assert_eq!(engine.get(b"hello"), Some(Bytes::from("world")));
//!
//! clock.advance(Duration::from_millis(100));
//! assert_eq!(engine.get(b"hello"), None);
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Entry, SetOptions, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
