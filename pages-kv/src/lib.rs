pub mod cache;
pub mod client;
pub mod error;
pub mod pool;
pub mod resp;

pub use cache::{Cache, CacheEntry};
pub use client::KvConnection;
pub use error::KvError;
pub use pool::KvPool;
