pub mod memory;
pub mod postgres;
pub mod transaction;

pub use memory::MemoryTransactionManager;
pub use postgres::{PgTransactionManager, StorageInitError};
pub use transaction::{transactional, TransactionError, TransactionManager, UnitOfWork};
