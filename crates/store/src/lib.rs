//! Token cache storage backends and refresh credential extraction.
//!
//! Provides a file store for production, an in-memory store for testing, and
//! the extractor that finds a usable refresh token in a loaded cache.

pub mod extract;
pub mod file;
pub mod memory;

pub use extract::RefreshExtractor;
pub use file::FileCacheStore;
pub use memory::InMemoryCacheStore;
