//! Token cache trait and the in-memory backend.

pub mod inmemory;
pub mod traits;

pub use inmemory::MemoryTokenCache;
pub use traits::TokenCache;
