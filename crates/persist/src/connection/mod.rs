//! Persistence orchestration.
//!
//! A [`Connection`] wraps one database session. It compiles statements with
//! its [`Driver`], logs them, executes them one at a time and turns results
//! back into instances. Saves run the full lifecycle:
//!
//! 1. instance and model validators
//! 2. the `on_save` callback, then `BeforeSave` and `BeforeCreate`/`BeforeUpdate`
//! 3. INSERT or UPDATE, reading back a generated key after an insert
//! 4. rewrite of many-to-many link rows for held collections
//! 5. `AfterCreate`/`AfterUpdate`, then `AfterSave`
//!
//! Nothing is retried and nothing is rolled back implicitly.

mod transaction;

pub use transaction::Transaction;

use crate::database::{Database, ExecResult};
use crate::driver::{Dialect, Driver, IdRetrieval, Statement};
use crate::error::{OrmError, OrmResult};
use crate::model::{Event, Instance, Model, Related, Schema};
use crate::query::{Assignments, Deferred, Outcome};
use crate::sql::SqlTree;
use crate::trace::SqlTrace;
use crate::value::{Row, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

const TARGET: &str = "persist.connection";

struct Inner {
    db: Mutex<Option<Box<dyn Database>>>,
    driver: Driver,
    trace: SqlTrace,
    in_transaction: AtomicBool,
}

/// A handle to one database session, cheap to clone.
///
/// Clones share the session, so statements issued through any clone after
/// [`Connection::tx`] run inside that transaction.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// One or more caller-written statements with `?` placeholders.
#[derive(Debug, Clone, Default)]
pub struct SqlBatch {
    statements: Vec<(String, Vec<Value>)>,
}

impl SqlBatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.statements.push((sql.into(), params));
        self
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl From<&str> for SqlBatch {
    fn from(sql: &str) -> Self {
        SqlBatch::new().push(sql, Vec::new())
    }
}

impl From<String> for SqlBatch {
    fn from(sql: String) -> Self {
        SqlBatch::new().push(sql, Vec::new())
    }
}

impl<S: Into<String>> From<(S, Vec<Value>)> for SqlBatch {
    fn from((sql, params): (S, Vec<Value>)) -> Self {
        SqlBatch::new().push(sql, params)
    }
}

impl From<Vec<&str>> for SqlBatch {
    fn from(statements: Vec<&str>) -> Self {
        statements
            .into_iter()
            .fold(SqlBatch::new(), |b, sql| b.push(sql, Vec::new()))
    }
}

impl From<Vec<String>> for SqlBatch {
    fn from(statements: Vec<String>) -> Self {
        statements
            .into_iter()
            .fold(SqlBatch::new(), |b, sql| b.push(sql, Vec::new()))
    }
}

impl From<Vec<(String, Vec<Value>)>> for SqlBatch {
    fn from(statements: Vec<(String, Vec<Value>)>) -> Self {
        Self { statements }
    }
}

impl Connection {
    pub fn new(db: Box<dyn Database>) -> Self {
        Self::with_trace(db, SqlTrace::default())
    }

    pub fn with_trace(db: Box<dyn Database>, trace: SqlTrace) -> Self {
        let dialect = db.dialect();
        tracing::debug!(target: TARGET, dialect = dialect.as_str(), "connection opened");
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(Some(db)),
                driver: Driver::new(dialect),
                trace,
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.driver.dialect()
    }

    pub fn driver(&self) -> &Driver {
        &self.inner.driver
    }

    pub fn is_in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::SeqCst)
    }

    /// Log and execute one compiled statement.
    pub async fn execute(&self, stmt: &Statement) -> OrmResult<ExecResult> {
        self.inner.trace.emit(&stmt.sql, &stmt.params);
        let mut guard = self.inner.db.lock().await;
        let db = guard.as_mut().ok_or_else(closed)?;
        let mut result = db.execute(&stmt.sql, &stmt.params).await?;
        result.rows = self.inner.driver.normalize_rows(result.rows);
        Ok(result)
    }

    /// Insert or update `instance`, running validators, hooks and the
    /// many-to-many cascade.
    pub async fn save(&self, instance: &mut Instance) -> OrmResult<()> {
        instance.validate()?;
        let model = instance.model().clone();
        if let Some(on_save) = model.hooks().on_save.clone() {
            on_save(instance)?;
        }
        model.emit(Event::BeforeSave, instance);

        let creating = !instance.is_persisted();
        if creating {
            model.emit(Event::BeforeCreate, instance);
            self.insert(instance).await?;
        } else {
            model.emit(Event::BeforeUpdate, instance);
            let stmt = self.driver().update(instance)?;
            self.execute(&stmt).await?;
        }
        instance.mark_persisted();
        instance.attach(self);

        self.save_links(instance).await?;

        model.emit(
            if creating {
                Event::AfterCreate
            } else {
                Event::AfterUpdate
            },
            instance,
        );
        model.emit(Event::AfterSave, instance);
        Ok(())
    }

    async fn insert(&self, instance: &mut Instance) -> OrmResult<()> {
        let stmt = self.driver().insert(instance)?;
        let result = self.execute(&stmt).await?;
        let Some(retrieval) = stmt.id_retrieval else {
            return Ok(());
        };
        let id = match retrieval {
            IdRetrieval::LastInsertId => result.inserted_id,
            IdRetrieval::Returning | IdRetrieval::OutParam => result
                .rows
                .first()
                .and_then(|row| row.get_index(0))
                .cloned()
                .or(result.inserted_id),
        };
        let id = id.filter(|v| !v.is_null()).ok_or_else(|| {
            OrmError::mapping(format!(
                "database did not report the generated key of '{}'",
                instance.model().name()
            ))
        })?;
        let pk = instance.model().primary_key().clone();
        instance.set_value(pk.property(), pk.coerce(id));
        Ok(())
    }

    /// Rewrite link rows for every held many-to-many collection.
    async fn save_links(&self, instance: &Instance) -> OrmResult<()> {
        let Some(id) = instance.id().cloned() else {
            return Ok(());
        };
        let model = instance.model();
        for association in model.associations() {
            let (Some(table), Some(through_key)) = (association.through(), association.through_key())
            else {
                continue;
            };
            let Some(Related::Many(items)) = instance.related(association.name()) else {
                continue;
            };

            let stmt = self
                .driver()
                .delete_join_rows(table, association.foreign_key(), id.clone())?;
            self.execute(&stmt).await?;
            for item in items {
                let target_id = item.id().cloned().ok_or_else(|| {
                    OrmError::mapping(format!(
                        "'{}' items of '{}' must be saved before their owner",
                        item.model().name(),
                        association.name()
                    ))
                })?;
                let stmt = self.driver().insert_join_row(
                    table,
                    association.foreign_key(),
                    id.clone(),
                    through_key,
                    target_id,
                )?;
                self.execute(&stmt).await?;
            }
        }
        Ok(())
    }

    /// Save each instance in order, stopping at the first error.
    ///
    /// Earlier saves are not undone; wrap the call in a transaction for
    /// all-or-nothing behavior.
    pub async fn save_all(&self, instances: &mut [Instance]) -> OrmResult<()> {
        for instance in instances.iter_mut() {
            self.save(instance).await?;
        }
        Ok(())
    }

    /// Apply `assignments` to a persisted instance and write only those columns.
    pub async fn update(&self, instance: &mut Instance, assignments: Assignments) -> OrmResult<()> {
        let id = instance.id().cloned().ok_or_else(|| {
            OrmError::mapping(format!(
                "cannot update '{}' without a primary key value",
                instance.model().name()
            ))
        })?;
        assignments.apply(instance)?;
        instance.validate()?;
        let model = instance.model().clone();
        self.update_by_id(&model, id, &assignments).await?;
        instance.mark_persisted();
        instance.attach(self);
        Ok(())
    }

    /// Write `assignments` to the row of `model` with primary key `id`.
    pub async fn update_by_id(
        &self,
        model: &Model,
        id: Value,
        assignments: &Assignments,
    ) -> OrmResult<u64> {
        let stmt = self.driver().update_by_id(model, id, assignments)?;
        Ok(self.execute(&stmt).await?.affected)
    }

    /// Delete a persisted instance by primary key.
    ///
    /// Related rows and link rows are left alone.
    pub async fn delete(&self, instance: &mut Instance) -> OrmResult<()> {
        let stmt = self.driver().delete(instance)?;
        self.execute(&stmt).await?;
        instance.mark_deleted();
        Ok(())
    }

    pub(crate) async fn select(&self, tree: &SqlTree) -> OrmResult<Vec<Instance>> {
        let stmt = self.driver().compile(tree)?;
        let result = self.execute(&stmt).await?;
        let mut instances = tree.materialize(&result.rows)?;
        for instance in &mut instances {
            instance.attach(self);
        }
        Ok(instances)
    }

    pub(crate) async fn scalar(&self, tree: &SqlTree) -> OrmResult<Value> {
        let stmt = self.driver().compile(tree)?;
        let result = self.execute(&stmt).await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.get_index(0))
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub(crate) async fn affected(&self, tree: &SqlTree) -> OrmResult<u64> {
        let stmt = self.driver().compile(tree)?;
        Ok(self.execute(&stmt).await?.affected)
    }

    pub(crate) async fn each<F>(&self, tree: &SqlTree, mut f: F) -> OrmResult<()>
    where
        F: FnMut(Instance) -> OrmResult<()> + Send,
    {
        let stmt = self.driver().compile(tree)?;
        let normalize = self.dialect() == Dialect::Oracle;
        let mut sink = |row: Row| -> OrmResult<()> {
            let row = if normalize {
                self.inner
                    .driver
                    .normalize_rows(vec![row])
                    .pop()
                    .ok_or_else(|| OrmError::mapping("empty row"))?
            } else {
                row
            };
            for mut instance in tree.materialize(std::slice::from_ref(&row))? {
                instance.attach(self);
                f(instance)?;
            }
            Ok(())
        };
        self.inner.trace.emit(&stmt.sql, &stmt.params);
        let mut guard = self.inner.db.lock().await;
        let db = guard.as_mut().ok_or_else(closed)?;
        db.execute_each(&stmt.sql, &stmt.params, &mut sink).await
    }

    /// Run caller SQL with `?` placeholders and return its rows.
    pub async fn run_sql(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let stmt = Statement::new(self.driver().normalize_placeholders(sql), params.to_vec());
        Ok(self.execute(&stmt).await?.rows)
    }

    /// Run every statement of `batch` in order, stopping at the first error.
    /// Returns the rows of each statement.
    pub async fn run_sql_all(&self, batch: impl Into<SqlBatch>) -> OrmResult<Vec<Vec<Row>>> {
        let batch = batch.into();
        let mut results = Vec::with_capacity(batch.len());
        for (sql, params) in &batch.statements {
            results.push(self.run_sql(sql, params).await?);
        }
        Ok(results)
    }

    /// Run every statement of `batch` in order, streaming each result row to `f`.
    pub async fn run_sql_each<F>(&self, batch: impl Into<SqlBatch>, mut f: F) -> OrmResult<()>
    where
        F: FnMut(Row) -> OrmResult<()> + Send,
    {
        let batch = batch.into();
        for (sql, params) in &batch.statements {
            let sql = self.driver().normalize_placeholders(sql);
            self.inner.trace.emit(&sql, params);
            let mut guard = self.inner.db.lock().await;
            let db = guard.as_mut().ok_or_else(closed)?;
            let driver = self.inner.driver;
            let mut sink = |row: Row| -> OrmResult<()> {
                for row in driver.normalize_rows(vec![row]) {
                    f(row)?;
                }
                Ok(())
            };
            db.execute_each(&sql, params, &mut sink).await?;
        }
        Ok(())
    }

    /// Run deferred operations one after another on this connection.
    ///
    /// The first failure aborts the remaining steps.
    pub async fn chain(&self, steps: Vec<Deferred>) -> OrmResult<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            outcomes.push(step.run(self).await?);
        }
        Ok(outcomes)
    }

    /// Named form of [`Connection::chain`]; outcomes keep the step order.
    pub async fn chain_named<I, K>(&self, steps: I) -> OrmResult<IndexMap<String, Outcome>>
    where
        I: IntoIterator<Item = (K, Deferred)>,
        K: Into<String>,
    {
        let mut outcomes = IndexMap::new();
        for (name, step) in steps {
            let outcome = step.run(self).await?;
            outcomes.insert(name.into(), outcome);
        }
        Ok(outcomes)
    }

    /// Begin a transaction. Nesting is rejected.
    pub async fn tx(&self) -> OrmResult<Transaction> {
        if self
            .inner
            .in_transaction
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrmError::Transaction(
                "a transaction is already open on this connection".into(),
            ));
        }
        if let Err(err) = self.begin().await {
            self.inner.in_transaction.store(false, Ordering::SeqCst);
            return Err(err);
        }
        tracing::debug!(target: TARGET, "transaction started");
        Ok(Transaction::new(self.clone()))
    }

    async fn begin(&self) -> OrmResult<()> {
        if let Some(sql) = self.dialect().begin_sql() {
            self.inner.trace.emit(sql, &[]);
        }
        let mut guard = self.inner.db.lock().await;
        guard.as_mut().ok_or_else(closed)?.begin().await
    }

    pub(crate) async fn finish(&self, commit: bool) -> OrmResult<()> {
        let sql = if commit {
            self.dialect().commit_sql()
        } else {
            self.dialect().rollback_sql()
        };
        self.inner.trace.emit(sql, &[]);
        let result = {
            let mut guard = self.inner.db.lock().await;
            let db = guard.as_mut().ok_or_else(closed)?;
            if commit {
                db.commit().await
            } else {
                db.rollback().await
            }
        };
        self.inner.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    /// Create the tables of every model and every many-to-many link table.
    pub async fn create_tables(&self, schema: &Schema) -> OrmResult<()> {
        for model in schema.models() {
            self.create_table(&model).await?;
        }
        for table in schema.join_tables() {
            let stmt = self.driver().create_join_table(&table)?;
            self.execute(&stmt).await?;
        }
        Ok(())
    }

    pub async fn create_table(&self, model: &Model) -> OrmResult<()> {
        let stmt = self.driver().create_table(model)?;
        self.execute(&stmt).await.map(drop)
    }

    /// Release the session. Later calls on any clone fail.
    pub async fn close(&self) -> OrmResult<()> {
        let mut guard = self.inner.db.lock().await;
        if let Some(mut db) = guard.take() {
            db.close().await?;
            tracing::debug!(target: TARGET, "connection closed");
        }
        Ok(())
    }
}

fn closed() -> OrmError {
    OrmError::Connection("connection is closed".into())
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect())
            .field("in_transaction", &self.is_in_transaction())
            .finish()
    }
}

/// Runs the given block inside a transaction on a [`Connection`].
///
/// - Begins with `$conn.tx().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `persist::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($conn:expr, $body:block) => {{
        let __persist_tx = ($conn).tx().await?;
        let __persist_tx_result = async { $body }.await;
        match __persist_tx_result {
            Ok(value) => {
                __persist_tx.commit().await?;
                Ok(value)
            }
            Err(error) => match __persist_tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
