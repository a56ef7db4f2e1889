//! Model descriptors, associations and instances.
//!
//! Models are declared on a [`SchemaBuilder`] and become read-only once the
//! schema is built. A [`Model`] is a cheap handle into the shared schema, so
//! queries and instances can carry it around without lifetimes.
//!
//! # Example
//!
//! ```ignore
//! use persist::{Column, ModelDef, SchemaBuilder};
//!
//! let mut b = SchemaBuilder::new();
//! let person = b.define("Person", ModelDef::new()
//!     .column("name", Column::string())
//!     .column("age", Column::integer()))?;
//! let phone = b.define("Phone", ModelDef::new().column("number", Column::string()))?;
//! b.has_many(person, phone)?;
//! let schema = b.build();
//!
//! let person = schema.get(person);
//! let bob = person.create(persist::values! { "name" => "Bob", "age" => 21 });
//! ```

mod accessor;
mod association;
mod builder;
mod column;
mod inflect;
mod instance;


pub use accessor::{HasManyAccessor, HasOneAccessor};
pub use association::{Association, AssociationKind, AssociationOptions};
pub use builder::{ModelDef, SchemaBuilder};
pub use column::{Column, ColumnType, DefaultFn};
pub use instance::{Instance, Related};

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult, ValidationError};
use crate::query::{Assignments, Query};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Event listener run during save.
pub type HookFn = Arc<dyn Fn(&mut Instance) + Send + Sync>;
/// Fallible `on_save` callback, run before the `BeforeSave` event.
pub type SaveHookFn = Arc<dyn Fn(&mut Instance) -> OrmResult<()> + Send + Sync>;
/// Instance validator.
pub type ValidatorFn = Arc<dyn Fn(&Instance) -> Result<(), ValidationError> + Send + Sync>;
/// Named query refinement.
pub type ScopeFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Lifecycle events emitted while saving an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    AfterCreate,
    AfterUpdate,
    AfterSave,
}

/// Index of a model inside its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub(crate) usize);

#[derive(Default, Clone)]
pub(crate) struct Hooks {
    pub(crate) listeners: Vec<(Event, HookFn)>,
    pub(crate) on_save: Option<SaveHookFn>,
    pub(crate) on_load: Option<HookFn>,
    pub(crate) validators: Vec<ValidatorFn>,
}

pub(crate) struct ModelDescriptor {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) columns: IndexMap<String, Column>,
    pub(crate) primary_key: String,
    pub(crate) associations: IndexMap<String, Association>,
    pub(crate) hooks: Hooks,
    pub(crate) scopes: HashMap<String, ScopeFn>,
}

pub(crate) struct SchemaInner {
    pub(crate) models: Vec<ModelDescriptor>,
    pub(crate) by_name: HashMap<String, ModelId>,
}

/// A built, immutable set of models.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

/// A join table required by a many-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
}

impl Schema {
    pub(crate) fn new(inner: SchemaInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Look up a model by its declared name.
    pub fn model(&self, name: &str) -> OrmResult<Model> {
        let id = self
            .inner
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| OrmError::mapping(format!("unknown model '{name}'")))?;
        Ok(self.get(id))
    }

    /// Handle for a model id returned by [`SchemaBuilder::define`].
    ///
    /// Panics if `id` came from a different builder.
    pub fn get(&self, id: ModelId) -> Model {
        assert!(id.0 < self.inner.models.len(), "model id out of range");
        Model {
            schema: self.inner.clone(),
            id,
        }
    }

    /// All models in definition order.
    pub fn models(&self) -> impl Iterator<Item = Model> + '_ {
        (0..self.inner.models.len()).map(|i| self.get(ModelId(i)))
    }

    /// Join tables declared by `through` associations, each listed once.
    pub fn join_tables(&self) -> Vec<JoinTable> {
        let mut tables: Vec<JoinTable> = Vec::new();
        for model in self.models() {
            for assoc in model.associations() {
                let (Some(table), Some(through_key)) = (&assoc.through, &assoc.through_key) else {
                    continue;
                };
                if tables.iter().any(|t| &t.name == table) {
                    continue;
                }
                let target = model.related(assoc);
                tables.push(JoinTable {
                    name: table.clone(),
                    columns: vec![
                        (assoc.foreign_key.clone(), model.primary_key().ty()),
                        (through_key.clone(), target.primary_key().ty()),
                    ],
                });
            }
        }
        tables
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.inner.models.iter().map(|m| &m.name))
            .finish()
    }
}

/// Handle to one model of a [`Schema`].
#[derive(Clone)]
pub struct Model {
    schema: Arc<SchemaInner>,
    id: ModelId,
}

impl Model {
    fn desc(&self) -> &ModelDescriptor {
        &self.schema.models[self.id.0]
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.desc().name
    }

    pub fn table_name(&self) -> &str {
        &self.desc().table
    }

    pub fn schema(&self) -> Schema {
        Schema {
            inner: self.schema.clone(),
        }
    }

    /// Columns in declaration order (`id` and foreign keys appended).
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.desc().columns.values()
    }

    /// Column by property name.
    pub fn column(&self, property: &str) -> Option<&Column> {
        self.desc().columns.get(property)
    }

    /// Column by property name, falling back to the database column name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.column(name)
            .or_else(|| self.columns().find(|c| c.name() == name))
    }

    pub fn primary_key(&self) -> &Column {
        &self.desc().columns[&self.desc().primary_key]
    }

    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.desc().associations.values()
    }

    pub fn association(&self, name: &str) -> OrmResult<&Association> {
        self.desc().associations.get(name).ok_or_else(|| {
            OrmError::mapping(format!(
                "model '{}' has no association named '{name}'",
                self.name()
            ))
        })
    }

    /// The model on the other end of `association`.
    pub fn related(&self, association: &Association) -> Model {
        Model {
            schema: self.schema.clone(),
            id: association.target,
        }
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.desc().hooks
    }

    pub(crate) fn emit(&self, event: Event, instance: &mut Instance) {
        for (e, f) in &self.desc().hooks.listeners {
            if *e == event {
                f(instance);
            }
        }
    }

    pub(crate) fn scope_fn(&self, name: &str) -> Option<&ScopeFn> {
        self.desc().scopes.get(name)
    }

    /// Create a free-standing instance; absent columns take their defaults.
    pub fn create<I, K>(&self, values: I) -> Instance
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Instance::new(self.clone(), values)
    }

    pub fn query(&self) -> Query {
        Query::new(self)
    }

    /// Start a query that carries `conn`; see [`Query::using`].
    pub fn using(&self, conn: &Connection) -> Query {
        self.query().using(conn)
    }

    /// Start a query from a named scope.
    pub fn scope(&self, name: &str) -> Query {
        self.query().scope(name)
    }

    pub fn where_sql(&self, expr: impl Into<String>, params: Vec<Value>) -> Query {
        self.query().where_sql(expr, params)
    }

    pub fn where_eq(&self, name: impl Into<String>, value: impl Into<Value>) -> Query {
        self.query().where_eq(name, value)
    }

    pub fn include(&self, name: &str) -> Query {
        self.query().include(name)
    }

    pub async fn all(&self, conn: &Connection) -> OrmResult<Vec<Instance>> {
        self.query().all(conn).await
    }

    pub async fn count(&self, conn: &Connection) -> OrmResult<u64> {
        self.query().count(conn).await
    }

    pub async fn get_by_id(
        &self,
        conn: &Connection,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Instance>> {
        self.query().get_by_id(conn, id).await
    }

    /// Write `assignments` to the row with primary key `id`.
    pub async fn update(
        &self,
        conn: &Connection,
        id: impl Into<Value>,
        assignments: Assignments,
    ) -> OrmResult<u64> {
        conn.update_by_id(self, id.into(), &assignments).await
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.id == other.id
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name())
            .field("table", &self.table_name())
            .finish()
    }
}
