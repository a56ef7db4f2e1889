use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::model::Instance;
use crate::value::{Row, Value};
use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Result of a [`Deferred`] operation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Instance(Option<Instance>),
    Instances(Vec<Instance>),
    Scalar(Value),
    Count(u64),
    Affected(u64),
    Rows(Vec<Row>),
    Saved(Instance),
    Unit,
}

impl Outcome {
    pub fn into_instance(self) -> Option<Instance> {
        match self {
            Outcome::Instance(i) => i,
            Outcome::Saved(i) => Some(i),
            _ => None,
        }
    }

    pub fn into_instances(self) -> Option<Vec<Instance>> {
        match self {
            Outcome::Instances(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Outcome::Count(n) | Outcome::Affected(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_scalar(self) -> Option<Value> {
        match self {
            Outcome::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

type DeferredFn = Box<dyn FnOnce(Connection) -> BoxFuture<'static, OrmResult<Outcome>> + Send>;

/// An operation described now and bound to a connection later.
///
/// Deferred operations are what [`Connection::chain`] sequences. Each query
/// terminal has a `defer_*` twin that produces one, carrying the query's
/// connection when it has one.
#[must_use]
pub struct Deferred {
    op: DeferredFn,
    connection: Option<Connection>,
}

impl Deferred {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Connection) -> Fut + Send + 'static,
        Fut: Future<Output = OrmResult<Outcome>> + Send + 'static,
    {
        Self {
            op: Box::new(move |conn| Box::pin(f(conn))),
            connection: None,
        }
    }

    /// Capture `conn` for [`run_bound`](Self::run_bound).
    pub fn using(self, conn: &Connection) -> Self {
        self.bind(Some(conn.clone()))
    }

    pub(crate) fn bind(mut self, conn: Option<Connection>) -> Self {
        self.connection = conn;
        self
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Save `instance`; yields the saved copy.
    pub fn save(instance: Instance) -> Self {
        Self::new(move |conn| async move {
            let mut instance = instance;
            conn.save(&mut instance).await?;
            Ok(Outcome::Saved(instance))
        })
    }

    pub fn delete(instance: Instance) -> Self {
        Self::new(move |conn| async move {
            let mut instance = instance;
            conn.delete(&mut instance).await?;
            Ok(Outcome::Unit)
        })
    }

    /// Run caller SQL with `?` placeholders; yields the rows.
    pub fn run_sql(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let sql = sql.into();
        Self::new(move |conn| async move {
            conn.run_sql(&sql, &params).await.map(Outcome::Rows)
        })
    }

    /// Bind to `conn` and execute. A captured connection is ignored.
    pub async fn run(self, conn: &Connection) -> OrmResult<Outcome> {
        (self.op)(conn.clone()).await
    }

    /// Execute on the captured connection.
    pub async fn run_bound(self) -> OrmResult<Outcome> {
        let conn = self.connection.ok_or_else(|| {
            OrmError::mapping("deferred operation is not bound to a connection; pass one to run()")
        })?;
        (self.op)(conn).await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("bound", &self.connection.is_some())
            .finish()
    }
}
