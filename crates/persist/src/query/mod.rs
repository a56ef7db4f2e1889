//! Fluent query builder.
//!
//! A [`Query`] owns a [`SqlTree`] and refines it through consuming builder
//! methods. Nothing touches the database until a terminal method runs with
//! a [`Connection`], or until a `defer_*` operation is bound to one by
//! [`Connection::chain`].
//!
//! A query built with [`Query::using`] (or [`Model::using`]) carries its
//! connection; the `load*` terminals and [`Deferred::run_bound`] run on it.
//!
//! Builder methods never fail on the spot: the first error (an unknown
//! association, a missing scope) is kept and reported by the terminal.

mod assign;
mod deferred;


pub use assign::Assignments;
pub use deferred::{Deferred, Outcome};

pub use crate::sql::{Direction, JoinKind};

use crate::connection::Connection;
use crate::driver::{Dialect, Driver, Statement};
use crate::error::{OrmError, OrmResult};
use crate::model::{Instance, Model};
use crate::sql::{Action, OrderBy, Predicate, SqlTree};
use crate::value::Value;
use std::future::Future;

#[derive(Debug, Clone)]
#[must_use]
pub struct Query {
    tree: SqlTree,
    error: Option<String>,
    connection: Option<Connection>,
}

impl Query {
    pub fn new(model: &Model) -> Self {
        Self {
            tree: SqlTree::new(model),
            error: None,
            connection: None,
        }
    }

    /// Capture `conn` for the `load*` terminals and deferred operations.
    pub fn using(mut self, conn: &Connection) -> Self {
        self.connection = Some(conn.clone());
        self
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    fn bound(&self) -> OrmResult<Connection> {
        self.connection.clone().ok_or_else(|| {
            OrmError::mapping(format!(
                "query on '{}' is not bound to a connection; pass one or call using()",
                self.model().name()
            ))
        })
    }

    pub fn model(&self) -> &Model {
        self.tree.model()
    }

    pub fn tree(&self) -> &SqlTree {
        &self.tree
    }

    fn record(mut self, result: OrmResult<()>) -> Self {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err.into_detail());
            }
        }
        self
    }

    fn check(&self) -> OrmResult<()> {
        match &self.error {
            Some(message) => Err(OrmError::mapping(message.clone())),
            None => Ok(()),
        }
    }

    /// Add a SQL predicate with `?` placeholders.
    ///
    /// Property names (`age`, `phones.number`) are rewritten to aliased
    /// column references; everything else is passed through.
    pub fn where_sql(mut self, expr: impl Into<String>, params: Vec<Value>) -> Self {
        self.tree.wheres.push(Predicate::Raw {
            expr: expr.into(),
            params,
        });
        self
    }

    /// `name = value`, or `name IS NULL` for a null value.
    pub fn where_eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tree.wheres.push(Predicate::Eq {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// One equality predicate per pair, ANDed.
    pub fn where_values<I, K>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in pairs {
            self = self.where_eq(name, value);
        }
        self
    }

    /// `name IN (...)`. An empty list matches no rows.
    pub fn where_in<I>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.tree.wheres.push(Predicate::In {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Inner join an association of the root model.
    pub fn join(mut self, association: &str) -> Self {
        let result = self
            .tree
            .join_association(association, JoinKind::Inner)
            .map(drop);
        self.record(result)
    }

    /// Left join an association of the root model.
    pub fn left_join(mut self, association: &str) -> Self {
        let result = self
            .tree
            .join_association(association, JoinKind::Left)
            .map(drop);
        self.record(result)
    }

    /// Join a table by name on `table.column = root.root_property`.
    pub fn join_table(
        mut self,
        kind: JoinKind,
        table: &str,
        column: &str,
        root_property: &str,
    ) -> Self {
        let result = self
            .tree
            .join_table(kind, table, column, root_property)
            .map(drop);
        self.record(result)
    }

    /// Eagerly load an association into each result.
    pub fn include(mut self, association: &str) -> Self {
        let result = self.tree.include(association);
        self.record(result)
    }

    pub fn include_many<'a>(mut self, associations: impl IntoIterator<Item = &'a str>) -> Self {
        for name in associations {
            self = self.include(name);
        }
        self
    }

    /// Include the first association of the root model that targets `model`.
    pub fn include_model(self, model: &Model) -> Self {
        let name = self
            .model()
            .associations()
            .find(|a| a.target() == model.id())
            .map(|a| a.name().to_string());
        match name {
            Some(name) => self.include(&name),
            None => {
                let err = OrmError::mapping(format!(
                    "model '{}' has no association to '{}'",
                    self.model().name(),
                    model.name()
                ));
                self.record(Err(err))
            }
        }
    }

    /// Order by a root property or `association.property`.
    pub fn order_by(mut self, name: &str, direction: Direction) -> Self {
        let result = self.push_order(name, direction);
        self.record(result)
    }

    fn push_order(&mut self, name: &str, direction: Direction) -> OrmResult<()> {
        let (table_alias, db_column) = self.tree.resolve(name).ok_or_else(|| {
            OrmError::mapping(format!(
                "cannot order by '{name}': not a column of '{}' or its joins",
                self.model().name()
            ))
        })?;
        let existing = self
            .tree
            .columns()
            .iter()
            .find(|c| c.table_alias == table_alias && c.db_column == db_column)
            .map(|c| c.alias.clone());
        let alias = match existing {
            Some(alias) => alias,
            None => {
                let join_model = self
                    .tree
                    .joins()
                    .iter()
                    .find(|j| j.alias == table_alias)
                    .and_then(|j| j.model.clone())
                    .ok_or_else(|| {
                        OrmError::mapping(format!("cannot order by '{name}' of a raw table join"))
                    })?;
                let property = join_model
                    .find_column(&db_column)
                    .map(|c| c.property().to_string())
                    .unwrap_or(db_column);
                self.tree
                    .add_column(&join_model, &property, &table_alias)?
                    .alias
                    .clone()
            }
        };
        self.tree.order_by.push(OrderBy { alias, direction });
        Ok(())
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.tree.limit = Some(count);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.tree.offset = Some(offset);
        self
    }

    /// `limit(count)` starting at row `offset`.
    pub fn limit_offset(self, count: u64, offset: u64) -> Self {
        self.limit(count).offset(offset)
    }

    /// Apply a named scope declared on the model.
    pub fn scope(self, name: &str) -> Self {
        match self.model().scope_fn(name).cloned() {
            Some(f) => f(self),
            None => {
                let err = OrmError::mapping(format!(
                    "model '{}' has no scope named '{name}'",
                    self.model().name()
                ));
                self.record(Err(err))
            }
        }
    }

    /// Compile the current tree without executing it.
    pub fn to_statement(&self, dialect: Dialect) -> OrmResult<Statement> {
        self.check()?;
        Driver::new(dialect).compile(&self.tree)
    }

    fn with_action(mut self, action: Action) -> OrmResult<Self> {
        self.check()?;
        self.tree.action = action;
        Ok(self)
    }

    pub async fn all(self, conn: &Connection) -> OrmResult<Vec<Instance>> {
        self.check()?;
        conn.select(&self.tree).await
    }

    /// First matching instance. With includes the limit applies to root
    /// keys, so the instance carries all of its related rows.
    pub async fn first(mut self, conn: &Connection) -> OrmResult<Option<Instance>> {
        self.check()?;
        self.tree.limit = Some(1);
        Ok(conn.select(&self.tree).await?.into_iter().next())
    }

    /// Last matching instance: the ordering is reversed (primary key
    /// descending when unordered) and the first result taken.
    pub async fn last(mut self, conn: &Connection) -> OrmResult<Option<Instance>> {
        self.check()?;
        if self.tree.order_by.is_empty() {
            if let Some(alias) = self.tree.primary_key_alias().map(str::to_string) {
                self.tree.order_by.push(OrderBy {
                    alias,
                    direction: Direction::Desc,
                });
            }
        } else {
            for order in &mut self.tree.order_by {
                order.direction = order.direction.flip();
            }
        }
        self.tree.limit = Some(1);
        Ok(conn.select(&self.tree).await?.into_iter().next())
    }

    pub async fn count(self, conn: &Connection) -> OrmResult<u64> {
        let query = self.with_action(Action::Count)?;
        let value = conn.scalar(&query.tree).await?;
        Ok(value.as_i64().map(|n| n.max(0) as u64).unwrap_or(0))
    }

    /// Smallest value of `field`; null when no rows match.
    pub async fn min(self, conn: &Connection, field: &str) -> OrmResult<Value> {
        self.aggregate(conn, Action::Min(field.to_string()), field).await
    }

    /// Largest value of `field`; null when no rows match.
    pub async fn max(self, conn: &Connection, field: &str) -> OrmResult<Value> {
        self.aggregate(conn, Action::Max(field.to_string()), field).await
    }

    /// Sum of `field`; zero when no rows match.
    pub async fn sum(self, conn: &Connection, field: &str) -> OrmResult<Value> {
        let value = self.aggregate(conn, Action::Sum(field.to_string()), field).await?;
        Ok(if value.is_null() { Value::Integer(0) } else { value })
    }

    async fn aggregate(self, conn: &Connection, action: Action, field: &str) -> OrmResult<Value> {
        let query = self.with_action(action)?;
        let value = conn.scalar(&query.tree).await?;
        Ok(match query.model().find_column(field) {
            Some(column) => column.coerce(value),
            None => value,
        })
    }

    /// Delete every matching row; returns the affected count.
    pub async fn delete_all(self, conn: &Connection) -> OrmResult<u64> {
        let query = self.with_action(Action::Delete)?;
        conn.affected(&query.tree).await
    }

    /// Apply `assignments` to every matching row; returns the affected count.
    pub async fn update_all(self, conn: &Connection, assignments: Assignments) -> OrmResult<u64> {
        if assignments.is_empty() {
            return Err(OrmError::mapping(format!(
                "update_all on '{}' has no assignments",
                self.model().name()
            )));
        }
        let query = self.with_action(Action::Update(assignments))?;
        conn.affected(&query.tree).await
    }

    /// Stream matching instances one at a time.
    ///
    /// Includes need whole row groups and are rejected here.
    pub async fn each<F>(self, conn: &Connection, f: F) -> OrmResult<()>
    where
        F: FnMut(Instance) -> OrmResult<()> + Send,
    {
        self.check()?;
        if !self.tree.includes().is_empty() {
            return Err(OrmError::mapping("each() cannot be combined with include()"));
        }
        conn.each(&self.tree, f).await
    }

    pub async fn get_by_id(
        self,
        conn: &Connection,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Instance>> {
        let pk = self.model().primary_key().property().to_string();
        self.where_eq(pk, id).first(conn).await
    }

    /// [`all`](Self::all) on the captured connection.
    pub async fn load(self) -> OrmResult<Vec<Instance>> {
        let conn = self.bound()?;
        self.all(&conn).await
    }

    pub async fn load_first(self) -> OrmResult<Option<Instance>> {
        let conn = self.bound()?;
        self.first(&conn).await
    }

    pub async fn load_last(self) -> OrmResult<Option<Instance>> {
        let conn = self.bound()?;
        self.last(&conn).await
    }

    pub async fn load_count(self) -> OrmResult<u64> {
        let conn = self.bound()?;
        self.count(&conn).await
    }

    pub async fn load_min(self, field: &str) -> OrmResult<Value> {
        let conn = self.bound()?;
        self.min(&conn, field).await
    }

    pub async fn load_max(self, field: &str) -> OrmResult<Value> {
        let conn = self.bound()?;
        self.max(&conn, field).await
    }

    pub async fn load_sum(self, field: &str) -> OrmResult<Value> {
        let conn = self.bound()?;
        self.sum(&conn, field).await
    }

    pub async fn load_by_id(self, id: impl Into<Value>) -> OrmResult<Option<Instance>> {
        let conn = self.bound()?;
        self.get_by_id(&conn, id).await
    }

    /// Wrap a terminal as a [`Deferred`] that keeps this query's connection.
    fn defer<F, Fut>(self, f: F) -> Deferred
    where
        F: FnOnce(Query, Connection) -> Fut + Send + 'static,
        Fut: Future<Output = OrmResult<Outcome>> + Send + 'static,
    {
        let bound = self.connection.clone();
        Deferred::new(move |conn| f(self, conn)).bind(bound)
    }

    pub fn defer_all(self) -> Deferred {
        self.defer(|q, conn| async move { q.all(&conn).await.map(Outcome::Instances) })
    }

    pub fn defer_first(self) -> Deferred {
        self.defer(|q, conn| async move { q.first(&conn).await.map(Outcome::Instance) })
    }

    pub fn defer_last(self) -> Deferred {
        self.defer(|q, conn| async move { q.last(&conn).await.map(Outcome::Instance) })
    }

    pub fn defer_count(self) -> Deferred {
        self.defer(|q, conn| async move { q.count(&conn).await.map(Outcome::Count) })
    }

    pub fn defer_min(self, field: impl Into<String>) -> Deferred {
        let field = field.into();
        self.defer(move |q, conn| async move { q.min(&conn, &field).await.map(Outcome::Scalar) })
    }

    pub fn defer_max(self, field: impl Into<String>) -> Deferred {
        let field = field.into();
        self.defer(move |q, conn| async move { q.max(&conn, &field).await.map(Outcome::Scalar) })
    }

    pub fn defer_sum(self, field: impl Into<String>) -> Deferred {
        let field = field.into();
        self.defer(move |q, conn| async move { q.sum(&conn, &field).await.map(Outcome::Scalar) })
    }

    pub fn defer_delete_all(self) -> Deferred {
        self.defer(|q, conn| async move { q.delete_all(&conn).await.map(Outcome::Affected) })
    }

    pub fn defer_update_all(self, assignments: Assignments) -> Deferred {
        self.defer(move |q, conn| async move {
            q.update_all(&conn, assignments).await.map(Outcome::Affected)
        })
    }

    pub fn defer_get_by_id(self, id: impl Into<Value>) -> Deferred {
        let id = id.into();
        self.defer(move |q, conn| async move {
            q.get_by_id(&conn, id).await.map(Outcome::Instance)
        })
    }
}
