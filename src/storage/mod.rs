//! Persistence of the upstream credential record.
//!
//! A single [`TokenPair`] is stored per process. [`FileTokenStore`] is the
//! durable implementation; [`MemoryTokenStore`] keeps the record in-process.

mod token_store;
mod types;

pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{TokenPair, TokenStoreError};
