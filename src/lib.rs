//! Persistent IP blacklist: a JSON-backed set of banned addresses, each
//! optionally time-limited, safe to query from many threads.

pub mod blacklist;
pub mod config;
pub mod duration;
pub mod error;

pub use blacklist::{BlackList, Entry};
pub use error::{Error, Result};
