//! # Tether Core
//!
//! Allocation-reusing collections for the Tether resource runtime.
//!
//! - [`pool`]: [`ObjectPool`](pool::ObjectPool) and [`ArrayPool`](pool::ArrayPool)
//! - [`vector`]: [`PooledVec`](vector::PooledVec)
//! - [`map`]: [`PooledMap`](map::PooledMap)
//! - [`byte_buffer`]: [`FixedByteBufferPool`](byte_buffer::FixedByteBufferPool)
//! - [`string_pool`]: [`StringPool`](string_pool::StringPool)
//!
//! All containers carry a version counter (see [`version`]) so positional
//! reads through an outdated [`Snapshot`](version::Snapshot) fail instead of
//! returning shifted data.

pub mod byte_buffer;
pub mod error;
pub mod map;
pub mod pool;
pub mod string_pool;
pub mod vector;
pub mod version;

pub use byte_buffer::{FixedByteBuffer, FixedByteBufferPool};
pub use error::CollectionError;
pub use map::PooledMap;
pub use pool::{ArrayPool, ObjectPool, Poolable};
pub use string_pool::{PooledString, StringPool};
pub use vector::PooledVec;
pub use version::{Snapshot, Versioned};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
