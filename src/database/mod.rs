pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::Store;
