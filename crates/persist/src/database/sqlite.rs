use super::{Database, ExecResult, RowSink};
use crate::driver::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::path::Path;
use std::sync::Arc;

/// SQLite session over `rusqlite`.
///
/// Date-times are stored as epoch milliseconds and JSON as text; both are
/// restored by column-type coercion on read.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        let conn = Connection::open(path).map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> OrmResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Open `filename`, treating `:memory:` as a private in-memory database.
    pub fn open_target(filename: &str) -> OrmResult<Self> {
        if filename == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(filename)
        }
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Run one statement. Rows go to `sink` when one is given; a sink
    /// error stops the iteration and is returned as is.
    fn run(
        &mut self,
        sql: &str,
        params: &[Value],
        mut sink: Option<RowSink<'_>>,
    ) -> OrmResult<ExecResult> {
        let failed = |e: rusqlite::Error| OrmError::execution(sql, params, e);
        let mut stmt = self.conn.prepare_cached(sql).map_err(failed)?;
        if stmt.column_count() == 0 {
            let affected = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(failed)? as u64;
            drop(stmt);
            return Ok(ExecResult {
                rows: Vec::new(),
                inserted_id: Some(Value::Integer(self.conn.last_insert_rowid())),
                affected,
            });
        }

        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(failed)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(failed)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i).map_err(failed)?));
            }
            let row = Row::new(columns.clone(), values);
            match sink.as_deref_mut() {
                Some(sink) => sink(row)?,
                None => out.push(row),
            }
        }
        Ok(ExecResult::from_rows(out))
    }
}

#[async_trait::async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        self.run(sql, params, None)
    }

    async fn execute_each(
        &mut self,
        sql: &str,
        params: &[Value],
        sink: RowSink<'_>,
    ) -> OrmResult<()> {
        self.run(sql, params, Some(sink)).map(drop)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sv;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sv::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sv::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(Sv::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(Sv::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::DateTime(d) => ToSqlOutput::Owned(Sv::Integer(d.timestamp_millis())),
            Value::Json(j) => ToSqlOutput::Owned(Sv::Text(j.to_string())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}
