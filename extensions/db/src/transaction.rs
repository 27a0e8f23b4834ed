//! Transaction Support for Strand Database Operations
//!
//! A [`Slot`] holds at most one transaction per request execution and
//! database index. It begins lazily, records a failed begin so that every
//! later operation reports the same failure, and is resolved exactly once
//! when the owning middleware returns.
//!
//! [`Tx`] is the handle handed out to handlers.

use crate::error::DbError;
use serde::Deserialize;
use sqlx::query::{Query, QueryAs};
use sqlx::{Database, Executor, FromRow, IntoArguments, Pool};
use std::fmt;
use std::sync::Arc;
use strand_core::CancelScope;
use tokio::sync::Mutex;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted (lowest isolation)
    ReadUncommitted,
    /// Read committed
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable (highest isolation)
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options applied to every transaction a slot begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// The statement that opens a transaction with these options on the
    /// backend named `database` (a `sqlx::Database::NAME`).
    ///
    /// `None` means the driver's plain `BEGIN`. Backends without a way to
    /// set transaction characteristics reject non-default options.
    pub fn begin_statement(&self, database: &str) -> Result<Option<String>, DbError> {
        if *self == TxOptions::default() {
            return Ok(None);
        }
        let mut modes = Vec::new();
        if let Some(level) = self.isolation {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if self.read_only {
            modes.push("READ ONLY".to_string());
        }

        match database {
            "PostgreSQL" => Ok(Some(format!("BEGIN {}", modes.join(", ")))),
            // MySQL only accepts SET TRANSACTION before the transaction starts,
            // and START TRANSACTION takes the access mode but not the isolation.
            "MySQL" => {
                let start = if self.read_only {
                    "START TRANSACTION READ ONLY"
                } else {
                    "START TRANSACTION"
                };
                Ok(Some(match self.isolation {
                    Some(level) => format!(
                        "SET TRANSACTION ISOLATION LEVEL {}; {}",
                        level.as_sql(),
                        start
                    ),
                    None => start.to_string(),
                }))
            }
            other => Err(DbError::Config(format!(
                "transaction options ({}) are not supported by {}",
                modes.join(", "),
                other
            ))),
        }
    }
}

pub(crate) enum SlotState<DB: Database> {
    Idle,
    Active(sqlx::Transaction<'static, DB>),
    Failed(DbError),
    Finished,
}

/// How the wrapped handler finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Completed,
    Failed,
    Unwound,
}

pub(crate) struct Slot<DB: Database> {
    pool: Pool<DB>,
    begin_statement: Option<String>,
    scope: CancelScope,
    index: usize,
    state: Mutex<SlotState<DB>>,
}

impl<DB: Database> Slot<DB> {
    pub(crate) fn new(
        pool: Pool<DB>,
        begin_statement: Option<String>,
        scope: CancelScope,
        index: usize,
    ) -> Self {
        Self {
            pool,
            begin_statement,
            scope,
            index,
            state: Mutex::new(SlotState::Idle),
        }
    }

    pub(crate) fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    /// Commit or roll back, depending on how the handler exited.
    ///
    /// Runs outside the request's cancel scope. Only a commit failure is
    /// reported; a rollback failure is logged and swallowed.
    pub(crate) async fn resolve(&self, exit: Exit) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, SlotState::Finished) {
            SlotState::Idle | SlotState::Finished => Ok(()),
            SlotState::Failed(err) => {
                *state = SlotState::Failed(err);
                Ok(())
            }
            SlotState::Active(tx) => match exit {
                Exit::Completed => match tx.commit().await {
                    Ok(()) => {
                        tracing::debug!(index = self.index, "Transaction committed");
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!(index = self.index, error = %err, "Transaction commit failed");
                        Err(DbError::commit(err))
                    }
                },
                Exit::Failed | Exit::Unwound => {
                    match tx.rollback().await {
                        Ok(()) => {
                            tracing::debug!(index = self.index, ?exit, "Transaction rolled back");
                        }
                        Err(err) => {
                            tracing::warn!(index = self.index, ?exit, error = %err, "Transaction rollback failed");
                        }
                    }
                    Ok(())
                }
            },
        }
    }
}

impl<DB> Slot<DB>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
{
    /// Begin the transaction if this is the first access.
    pub(crate) async fn begin(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, SlotState::Idle) {
            return;
        }
        *state = match self.open().await {
            Ok(tx) => {
                tracing::debug!(index = self.index, "Transaction begun");
                SlotState::Active(tx)
            }
            Err(err) => {
                tracing::warn!(index = self.index, error = %err, "Transaction failed to begin");
                SlotState::Failed(err)
            }
        };
    }

    async fn open(&self) -> Result<sqlx::Transaction<'static, DB>, DbError> {
        let begin = match &self.begin_statement {
            Some(statement) => self.scope.run(self.pool.begin_with(statement.clone())).await?,
            None => self.scope.run(self.pool.begin()).await?,
        };
        begin.map_err(DbError::begin)
    }
}

impl<DB: Database> Drop for Slot<DB> {
    fn drop(&mut self) {
        // Reached when the request future is dropped mid-flight. The driver
        // rolls back a transaction that is dropped unresolved.
        if let SlotState::Active(_) = self.state.get_mut() {
            tracing::warn!(
                index = self.index,
                "Transaction dropped before resolution; rolling back"
            );
        }
    }
}

fn active<DB: Database>(
    state: &mut SlotState<DB>,
) -> Result<&mut sqlx::Transaction<'static, DB>, DbError> {
    match state {
        SlotState::Active(tx) => Ok(tx),
        SlotState::Failed(err) => Err(err.clone()),
        SlotState::Idle | SlotState::Finished => Err(DbError::AlreadyCompleted),
    }
}

/// A request-bound transaction.
///
/// Every clone refers to the same underlying transaction. Operations run
/// inside the request's cancel scope. If the transaction failed to begin,
/// each operation returns that same failure.
///
/// Example:
/// ```rust,ignore
/// let tx = strand_db::get_tx::<sqlx::Postgres>(&req).await?;
/// tx.execute(sqlx::query("INSERT INTO users (name) VALUES ($1)").bind("alice"))
///     .await?;
/// ```
pub struct Tx<DB: Database> {
    slot: Arc<Slot<DB>>,
}

impl<DB: Database> Clone for Tx<DB> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<DB: Database> fmt::Debug for Tx<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("database", &DB::NAME)
            .field("index", &self.slot.index)
            .finish()
    }
}

impl<DB: Database> Tx<DB> {
    pub(crate) fn new(slot: Arc<Slot<DB>>) -> Self {
        Self { slot }
    }

    pub fn index(&self) -> usize {
        self.slot.index
    }

    /// True while the transaction is open and usable.
    pub async fn is_active(&self) -> bool {
        matches!(*self.slot.state.lock().await, SlotState::Active(_))
    }

    /// The failure recorded when the transaction could not begin.
    pub async fn init_error(&self) -> Option<DbError> {
        match &*self.slot.state.lock().await {
            SlotState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Commit now instead of at the end of the request.
    pub async fn commit(&self) -> Result<(), DbError> {
        let mut state = self.slot.state.lock().await;
        match std::mem::replace(&mut *state, SlotState::Finished) {
            SlotState::Active(tx) => tx.commit().await.map_err(DbError::commit),
            SlotState::Failed(err) => {
                *state = SlotState::Failed(err.clone());
                Err(err)
            }
            SlotState::Idle | SlotState::Finished => Err(DbError::AlreadyCompleted),
        }
    }

    /// Roll back now instead of at the end of the request.
    pub async fn rollback(&self) -> Result<(), DbError> {
        let mut state = self.slot.state.lock().await;
        match std::mem::replace(&mut *state, SlotState::Finished) {
            SlotState::Active(tx) => tx.rollback().await.map_err(DbError::rollback),
            SlotState::Failed(err) => {
                *state = SlotState::Failed(err.clone());
                Err(err)
            }
            SlotState::Idle | SlotState::Finished => Err(DbError::AlreadyCompleted),
        }
    }
}

impl<DB> Tx<DB>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
{
    pub async fn execute<'q, A>(&self, query: Query<'q, DB, A>) -> Result<DB::QueryResult, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.execute(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    pub async fn fetch_all<'q, A>(&self, query: Query<'q, DB, A>) -> Result<Vec<DB::Row>, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.fetch_all(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    pub async fn fetch_one<'q, A>(&self, query: Query<'q, DB, A>) -> Result<DB::Row, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.fetch_one(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    pub async fn fetch_optional<'q, A>(
        &self,
        query: Query<'q, DB, A>,
    ) -> Result<Option<DB::Row>, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.fetch_optional(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    pub async fn fetch_all_as<'q, O, A>(
        &self,
        query: QueryAs<'q, DB, O, A>,
    ) -> Result<Vec<O>, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.fetch_all(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    pub async fn fetch_one_as<'q, O, A>(&self, query: QueryAs<'q, DB, O, A>) -> Result<O, DbError>
    where
        A: 'q + Send + IntoArguments<'q, DB>,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row>,
    {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run(query.fetch_one(&mut **tx))
            .await?
            .map_err(DbError::query)
    }

    /// Prepare a statement on the transaction's connection.
    pub async fn prepare<'q>(&self, sql: &'q str) -> Result<DB::Statement<'q>, DbError> {
        let mut state = self.slot.state.lock().await;
        let tx = active(&mut *state)?;
        self.slot
            .scope
            .run((&mut **tx).prepare(sql))
            .await?
            .map_err(DbError::query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSTGRES: &str = <sqlx::Postgres as Database>::NAME;
    const MYSQL: &str = <sqlx::MySql as Database>::NAME;
    const SQLITE: &str = <sqlx::Sqlite as Database>::NAME;

    #[test]
    fn test_default_options_use_plain_begin() {
        for database in [POSTGRES, MYSQL, SQLITE] {
            assert_eq!(TxOptions::new().begin_statement(database).unwrap(), None);
        }
    }

    #[test]
    fn test_postgres_begin_statement() {
        let opts = TxOptions::new()
            .isolation(IsolationLevel::Serializable)
            .read_only(true);
        assert_eq!(
            opts.begin_statement(POSTGRES).unwrap().as_deref(),
            Some("BEGIN ISOLATION LEVEL SERIALIZABLE, READ ONLY")
        );

        let opts = TxOptions::new().isolation(IsolationLevel::RepeatableRead);
        assert_eq!(
            opts.begin_statement(POSTGRES).unwrap().as_deref(),
            Some("BEGIN ISOLATION LEVEL REPEATABLE READ")
        );
    }

    #[test]
    fn test_mysql_sets_characteristics_before_start() {
        let opts = TxOptions::new()
            .isolation(IsolationLevel::ReadCommitted)
            .read_only(true);
        assert_eq!(
            opts.begin_statement(MYSQL).unwrap().as_deref(),
            Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED; START TRANSACTION READ ONLY")
        );

        let opts = TxOptions::new().read_only(true);
        assert_eq!(
            opts.begin_statement(MYSQL).unwrap().as_deref(),
            Some("START TRANSACTION READ ONLY")
        );

        let opts = TxOptions::new().isolation(IsolationLevel::Serializable);
        assert_eq!(
            opts.begin_statement(MYSQL).unwrap().as_deref(),
            Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; START TRANSACTION")
        );
    }

    #[test]
    fn test_sqlite_rejects_options() {
        let err = TxOptions::new()
            .read_only(true)
            .begin_statement(SQLITE)
            .unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
        assert!(err.to_string().contains("SQLite"));
    }

    #[test]
    fn test_isolation_level_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: IsolationLevel,
        }
        let parsed: Wrapper = serde_json::from_str(r#"{"level": "read_committed"}"#).unwrap();
        assert_eq!(parsed.level, IsolationLevel::ReadCommitted);
    }
}
