/// 计数器存储实现
mod memory_counter;
mod postgres_counter;
mod redis_counter;

pub use memory_counter::MemoryCounterStore;
pub use postgres_counter::PostgresCounterStore;
pub use redis_counter::RedisCounterStore;
