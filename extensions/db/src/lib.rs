//! # Strand Database Integration
//!
//! Request-scoped SQL transactions for Strand pipelines.
//!
//! [`with_db`] wraps a handler so that the first [`get_transaction`] call
//! begins a transaction, later calls reuse it, and the middleware commits or
//! rolls it back depending on how the handler finished.

pub mod config;
pub mod error;
pub mod middleware;
pub mod transaction;

pub use config::DbSettings;
pub use error::DbError;
pub use middleware::{TxConfig, get_database, get_transaction, get_tx, with_db};
pub use transaction::{IsolationLevel, Tx, TxOptions};

pub mod prelude {
    pub use crate::config::DbSettings;
    pub use crate::error::DbError;
    pub use crate::middleware::{TxConfig, get_database, get_transaction, get_tx, with_db};
    pub use crate::transaction::{IsolationLevel, Tx, TxOptions};
}
