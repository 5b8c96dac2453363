//! In-memory implementations of the engine's contracts: a mutex-based lock service, a hash-map job queue, a
//! vector-backed order store and a scriptable gateway. They back the unit and integration tests, and the lock and
//! queue are adequate for a real single-process deployment.

mod database;
mod gateway;
mod lock;
mod queue;

pub use database::MemoryDatabase;
pub use gateway::MemoryGateway;
pub use lock::MemoryLockService;
pub use queue::MemoryJobQueue;
