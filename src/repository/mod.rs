//! Repository Layer
//!
//! Store and change-feed abstractions plus the in-memory implementation.

mod memory;
mod traits;


pub use memory::MemoryStore;
pub use traits::{ChangeFeed, FeedSink, Store, SubscriptionId};
