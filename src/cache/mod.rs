//! In-memory response cache with age-based expiry
//!
//! This module provides a concurrency-safe store of raw HTTP response bodies keyed
//! by request URL. A background reaper task sweeps the store on a fixed interval and
//! drops every entry older than that same interval, so memory stays bounded without
//! per-entry timers. Entries are never evicted by count.

mod reaper;
mod store;

pub use store::{CacheError, ResponseCache};
