//! `db` crate: pure persistence layer.
//!
//! Provides a connection pool, typed row structs, the storage ports the
//! services depend on, and two implementations of them: Postgres and
//! in-memory.  No versioning rules live here.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;
pub mod postgres;
pub mod memory;

pub use pool::{DbPool, PoolConfig};
pub use error::DbError;
pub use models::{FunctionUnitAccess, FunctionUnitVersion, ProcessInstance, ProcessStatus, Variables};
pub use repository::{Store, StoreTx};
pub use postgres::PgStore;
pub use memory::MemoryStore;
