//! Store backends

pub mod in_memory;
pub mod redis;

pub use in_memory::InMemoryStore;
pub use self::redis::RedisStore;
