use super::{Database, ExecResult, RowSink};
use crate::driver::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures_util::{TryStreamExt, pin_mut};
use std::error::Error;
use std::sync::Arc;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};

enum Session {
    Direct(Client),
    #[cfg(feature = "pool")]
    Pooled(deadpool_postgres::Object),
}

/// PostgreSQL session over `tokio-postgres`, direct or borrowed from a pool.
///
/// A pooled session goes back to its pool when closed or dropped.
pub struct PostgresDatabase {
    session: Option<Session>,
}

impl PostgresDatabase {
    /// Connect without TLS and drive the connection on a background task.
    pub async fn connect(config: &tokio_postgres::Config) -> OrmResult<Self> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(target: "persist.connection", error = %err, "postgres connection error");
            }
        });
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            session: Some(Session::Direct(client)),
        }
    }

    #[cfg(feature = "pool")]
    pub fn from_pooled(object: deadpool_postgres::Object) -> Self {
        Self {
            session: Some(Session::Pooled(object)),
        }
    }

    fn client(&self) -> OrmResult<&Client> {
        match &self.session {
            Some(Session::Direct(client)) => Ok(client),
            #[cfg(feature = "pool")]
            Some(Session::Pooled(object)) => {
                let client: &Client = object;
                Ok(client)
            }
            None => Err(OrmError::Connection("postgres session is closed".into())),
        }
    }
}

fn bind(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<ExecResult> {
        let client = self.client()?;
        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| OrmError::execution(sql, params, e))?;
        let refs = bind(params);

        if stmt.columns().is_empty() {
            let affected = client
                .execute(&stmt, &refs)
                .await
                .map_err(|e| OrmError::execution(sql, params, e))?;
            return Ok(ExecResult {
                rows: Vec::new(),
                inserted_id: None,
                affected,
            });
        }

        let columns = column_names(&stmt);
        let rows = client
            .query(&stmt, &refs)
            .await
            .map_err(|e| OrmError::execution(sql, params, e))?;
        let rows = rows
            .iter()
            .map(|row| decode_row(row, &columns))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(ExecResult::from_rows(rows))
    }

    async fn execute_each(
        &mut self,
        sql: &str,
        params: &[Value],
        sink: RowSink<'_>,
    ) -> OrmResult<()> {
        let client = self.client()?;
        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| OrmError::execution(sql, params, e))?;
        let columns = column_names(&stmt);
        let stream = client
            .query_raw(&stmt, bind(params))
            .await
            .map_err(|e| OrmError::execution(sql, params, e))?;
        pin_mut!(stream);
        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| OrmError::execution(sql, params, e))?
        {
            sink(decode_row(&row, &columns)?)?;
        }
        Ok(())
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.batch("ROLLBACK").await
    }

    async fn close(&mut self) -> OrmResult<()> {
        self.session = None;
        Ok(())
    }
}

impl PostgresDatabase {
    async fn batch(&self, sql: &str) -> OrmResult<()> {
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| OrmError::execution(sql, &[], e))
    }
}

fn column_names(stmt: &tokio_postgres::Statement) -> Arc<[String]> {
    stmt.columns().iter().map(|c| c.name().to_string()).collect()
}

fn decode_row(row: &tokio_postgres::Row, columns: &Arc<[String]>) -> OrmResult<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(decode_value(row, i, column.type_(), column.name())?);
    }
    Ok(Row::new(columns.clone(), values))
}

fn decode_value(row: &tokio_postgres::Row, i: usize, ty: &Type, name: &str) -> OrmResult<Value> {
    fn get<'r, T: FromSql<'r>>(row: &'r tokio_postgres::Row, i: usize, name: &str) -> OrmResult<Option<T>> {
        row.try_get::<_, Option<T>>(i)
            .map_err(|e| OrmError::decode(name, e.to_string()))
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, i, name)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, i, name)?.map(|v| Value::Integer(v.into())),
        Type::INT4 => get::<i32>(row, i, name)?.map(|v| Value::Integer(v.into())),
        Type::INT8 => get::<i64>(row, i, name)?.map(Value::Integer),
        Type::FLOAT4 => get::<f32>(row, i, name)?.map(|v| Value::Real(v.into())),
        Type::FLOAT8 => get::<f64>(row, i, name)?.map(Value::Real),
        Type::NUMERIC => get::<Numeric>(row, i, name)?.map(|n| n.0),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, i, name)?.map(Value::Text)
        }
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, i, name)?.map(Value::DateTime),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, i, name)?.map(Value::from),
        Type::DATE => get::<NaiveDate>(row, i, name)?.map(Value::from),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, i, name)?.map(Value::Json),
        ref other => {
            return Err(OrmError::decode(
                name,
                format!("unsupported postgres type {other}"),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Binary NUMERIC, read as an integer when it has no fractional digits.
struct Numeric(Value);

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let word = |at: usize| -> Result<u16, Box<dyn Error + Sync + Send>> {
            raw.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "truncated numeric".into())
        };
        let ndigits = word(0)? as usize;
        let weight = word(2)? as i16 as i32;
        let sign = word(4)?;
        let dscale = word(6)?;
        if sign == 0xC000 {
            return Ok(Numeric(Value::Real(f64::NAN)));
        }

        let mut digits = Vec::with_capacity(ndigits);
        for d in 0..ndigits {
            digits.push(word(8 + d * 2)? as i64);
        }
        let negative = sign == 0x4000;

        if dscale == 0 {
            let mut acc: i128 = 0;
            for (d, digit) in digits.iter().enumerate() {
                let exp = weight - d as i32;
                if exp < 0 {
                    break;
                }
                acc += *digit as i128 * 10_000i128.pow(exp as u32);
            }
            let acc = if negative { -acc } else { acc };
            if let Ok(n) = i64::try_from(acc) {
                return Ok(Numeric(Value::Integer(n)));
            }
        }

        let mut acc = 0f64;
        for (d, digit) in digits.iter().enumerate() {
            acc += *digit as f64 * 10_000f64.powi(weight - d as i32);
        }
        Ok(Numeric(Value::Real(if negative { -acc } else { acc })))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

type BoxedError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    Value::Integer(i64::from(*b)).to_sql(ty, out)
                }
                _ => b.to_sql(ty, out),
            },
            Value::Integer(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => i.to_string().to_sql(ty, out),
                Type::TIMESTAMPTZ | Type::TIMESTAMP | Type::DATE => {
                    let dt = Utc
                        .timestamp_millis_opt(*i)
                        .single()
                        .ok_or("timestamp out of range")?;
                    Value::DateTime(dt).to_sql(ty, out)
                }
                _ => i.to_sql(ty, out),
            },
            Value::Real(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 => {
                    Value::Integer(*f as i64).to_sql(ty, out)
                }
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::JSON | Type::JSONB => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json) => json.to_sql(ty, out),
                    Err(_) => serde_json::Value::String(s.clone()).to_sql(ty, out),
                },
                Type::TIMESTAMPTZ | Type::TIMESTAMP | Type::DATE => {
                    let dt = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
                    Value::DateTime(dt).to_sql(ty, out)
                }
                _ => s.as_str().to_sql(ty, out),
            },
            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                Type::DATE => dt.date_naive().to_sql(ty, out),
                Type::INT8 => dt.timestamp_millis().to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => dt.to_rfc3339().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            Value::Json(json) => match *ty {
                Type::TEXT | Type::VARCHAR => json.to_string().to_sql(ty, out),
                _ => json.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}
