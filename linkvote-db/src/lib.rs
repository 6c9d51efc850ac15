pub mod client;
pub mod memory;
mod record;

pub use client::{ContentStore, DbClient, DbError, Result};
pub use memory::MemoryStore;

#[cfg(test)]
mod tests;
