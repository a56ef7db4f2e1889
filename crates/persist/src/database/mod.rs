//! The I/O boundary: a database capability that executes SQL with bound
//! values and reports rows, generated ids and affected counts.
//!
//! Built-in implementations cover SQLite (`rusqlite`) and PostgreSQL
//! (`tokio-postgres`, optionally pooled through `deadpool-postgres`). Other
//! back ends implement [`Database`] and plug in through
//! [`Connection::new`](crate::Connection::new).

#[cfg(feature = "sqlite")]
mod sqlite;
mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use postgres::PostgresDatabase;

use crate::driver::Dialect;
use crate::error::OrmResult;
use crate::value::{Row, Value};

/// Outcome of one executed statement.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub rows: Vec<Row>,
    /// Generated key reported by the database, if any.
    pub inserted_id: Option<Value>,
    pub affected: u64,
}

impl ExecResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let affected = rows.len() as u64;
        Self {
            rows,
            inserted_id: None,
            affected,
        }
    }
}

/// Row callback for streamed execution.
pub type RowSink<'a> = &'a mut (dyn FnMut(Row) -> OrmResult<()> + Send);

/// A single database session.
///
/// Statements arrive with placeholders already in the syntax of
/// [`Database::dialect`]. Implementations must not retry or reorder
/// statements; the connection sequences them.
#[async_trait::async_trait]
pub trait Database: Send {
    fn dialect(&self) -> Dialect;

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<ExecResult>;

    /// Execute a query and hand each row to `sink` as it arrives.
    ///
    /// The default buffers the whole result first.
    async fn execute_each(
        &mut self,
        sql: &str,
        params: &[Value],
        sink: RowSink<'_>,
    ) -> OrmResult<()> {
        let result = self.execute(sql, params).await?;
        for row in result.rows {
            sink(row)?;
        }
        Ok(())
    }

    async fn begin(&mut self) -> OrmResult<()> {
        match self.dialect().begin_sql() {
            Some(sql) => self.execute(sql, &[]).await.map(drop),
            None => Ok(()),
        }
    }

    async fn commit(&mut self) -> OrmResult<()> {
        let sql = self.dialect().commit_sql();
        self.execute(sql, &[]).await.map(drop)
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        let sql = self.dialect().rollback_sql();
        self.execute(sql, &[]).await.map(drop)
    }

    /// Release the session. Pooled sessions return to their pool.
    async fn close(&mut self) -> OrmResult<()> {
        Ok(())
    }
}
