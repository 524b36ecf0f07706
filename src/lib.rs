//! REVENANT - In-Memory Key-Value Engine with Append-Only Durability
//!
//! A Redis-family data engine: sharded concurrent key maps, per-key TTL,
//! skip-list sorted sets, optimistic transactions and an append-only log
//! with replay and online rewrite.
//!
//! ## Features
//! - **Sharded key map**: Per-shard mutexes for concurrent access
//! - **Logical partitions**: SELECT-able databases over one log
//! - **Sorted sets**: Arena-backed skip lists (ZADD/ZRANGE/ZRANK family)
//! - **TTL Support**: Redis-like key expiration, lazy on access
//! - **Transactions**: MULTI/WATCH/EXEC with optimistic validation
//! - **AOF**: Append-only durability with replay and online rewrite
//! - **Metrics**: Lock-free atomic counters for observability
//!
//! ## Example
//! ```no_run
//! use revenant::{config::Config, engine::{session::Session, Store}, types::Request};
//!
//! let store = Store::open(Config::new("./data")).unwrap();
//! let mut session = Session::new();
//!
//! let set = Request::new("1", "SET", vec!["key".into(), "value".into()]);
//! store.handle(&set, &mut session).unwrap();
//!
//! let get = Request::new("2", "GET", vec!["key".into()]);
//! let resp = store.handle(&get, &mut session).unwrap();
//! assert_eq!(resp.args, vec!["value"]);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod types;
