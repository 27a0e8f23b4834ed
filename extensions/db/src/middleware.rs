//! # Transactional Middleware
//!
//! [`with_db`] attaches a lazily-begun transaction slot to every request it
//! wraps and resolves it when the inner handler finishes:
//!
//! - handler returned `Ok` → commit (a commit failure becomes the result)
//! - handler returned `Err` (handled or not) → rollback
//! - handler panicked → rollback, then the panic resumes
//!
//! A handler that never calls [`get_transaction`] never opens one.

use crate::error::DbError;
use crate::transaction::{Exit, Slot, Tx, TxOptions};
use futures_util::FutureExt;
use sqlx::{Database, Executor, Pool};
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use strand_core::{ContextKey, Handler, HandlerResult, Middleware, MissingContextValue, Request, Response};

/// Configuration captured once by [`with_db`] and shared by every request.
pub struct TxConfig<DB: Database> {
    pool: Pool<DB>,
    options: TxOptions,
    begin_statement: Option<String>,
    index: usize,
}

impl<DB: Database> TxConfig<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self {
            pool,
            options: TxOptions::default(),
            begin_statement: None,
            index: 0,
        }
    }

    /// Set the options every transaction begins with.
    ///
    /// Fails with [`DbError::Config`] when the backend cannot apply them.
    pub fn options(mut self, options: TxOptions) -> Result<Self, DbError> {
        self.begin_statement = options.begin_statement(DB::NAME)?;
        self.options = options;
        Ok(self)
    }

    /// Which logical database this configuration manages.
    ///
    /// Only needed when several databases are wrapped around the same handler.
    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    pub fn tx_options(&self) -> TxOptions {
        self.options
    }

    pub fn db_index(&self) -> usize {
        self.index
    }
}

impl<DB: Database> Clone for TxConfig<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            options: self.options,
            begin_statement: self.begin_statement.clone(),
            index: self.index,
        }
    }
}

impl<DB: Database> fmt::Debug for TxConfig<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxConfig")
            .field("database", &DB::NAME)
            .field("options", &self.options)
            .field("index", &self.index)
            .finish()
    }
}

// Keyed by database type and index, so it cannot collide with other concerns.
struct TxKey<DB> {
    index: usize,
    _db: PhantomData<fn() -> DB>,
}

impl<DB> TxKey<DB> {
    fn new(index: usize) -> Self {
        Self {
            index,
            _db: PhantomData,
        }
    }
}

impl<DB> PartialEq for TxKey<DB> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<DB> Eq for TxKey<DB> {}

impl<DB> fmt::Debug for TxKey<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TxKey").field(&self.index).finish()
    }
}

impl<DB: Database> ContextKey for TxKey<DB> {
    type Value = Arc<Slot<DB>>;

    fn name(&self) -> String {
        format!("strand-db/Tx[{}]", self.index)
    }
}

/// Returns a middleware which provides the request with a transaction and a
/// database pool.
///
/// ```rust,ignore
/// let app = chain([
///     traced("orders"),
///     with_db(TxConfig::new(pool)),
/// ])
/// .apply(create_order);
/// ```
pub fn with_db<DB: Database>(config: TxConfig<DB>) -> Middleware {
    let config = Arc::new(config);
    Middleware::from_fn(move |req, resp, next| Box::pin(handle(Arc::clone(&config), req, resp, next)))
}

async fn handle<DB: Database>(
    config: Arc<TxConfig<DB>>,
    req: Request,
    resp: &mut Response,
    next: Handler,
) -> HandlerResult {
    let slot = Arc::new(Slot::new(
        config.pool.clone(),
        config.begin_statement.clone(),
        req.scope().clone(),
        config.index,
    ));
    let req = req.with_context_value(TxKey::<DB>::new(config.index), Arc::clone(&slot));

    let outcome = AssertUnwindSafe(next.call(req, resp)).catch_unwind().await;
    let exit = match &outcome {
        Ok(Ok(())) => Exit::Completed,
        Ok(Err(_)) => Exit::Failed,
        Err(_) => Exit::Unwound,
    };

    // Must finish before a panic is allowed to continue.
    let resolved = slot.resolve(exit).await;

    match outcome {
        Err(panic) => std::panic::resume_unwind(panic),
        Ok(Err(err)) => Err(err),
        Ok(Ok(())) => resolved.map_err(strand_core::Error::from),
    }
}

/// Returns the transaction for database `index`, beginning it on first use.
///
/// Successive calls within the same request return handles to the same
/// transaction. A failed begin is recorded on the handle.
pub async fn get_transaction<DB>(req: &Request, index: usize) -> Result<Tx<DB>, MissingContextValue>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
{
    let slot = Arc::clone(req.context_value(&TxKey::<DB>::new(index))?);
    slot.begin().await;
    Ok(Tx::new(slot))
}

/// Shorthand for [`get_transaction`] with index 0.
pub async fn get_tx<DB>(req: &Request) -> Result<Tx<DB>, MissingContextValue>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
{
    get_transaction(req, 0).await
}

/// Returns the raw pool for database `index` without starting a transaction.
/// Prefer [`get_transaction`] when you can.
pub fn get_database<DB: Database>(req: &Request, index: usize) -> Result<Pool<DB>, MissingContextValue> {
    req.context_value(&TxKey::<DB>::new(index))
        .map(|slot| slot.pool().clone())
        .map_err(|_| MissingContextValue::new(format!("strand-db/Pool[{}]", index)))
}
