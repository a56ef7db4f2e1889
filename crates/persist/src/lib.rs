//! # persist
//!
//! A model-first ORM: declare models and their associations once, then
//! query, include and save them against SQLite, PostgreSQL, MySQL or
//! Oracle through one API.
//!
//! ## Features
//!
//! - **Declared models**: typed columns, defaults, lifecycle hooks, validators and scopes
//! - **Associations**: has-one, has-many and many-to-many (`through` a join table)
//! - **Eager includes**: joined rows are regrouped into nested instances
//! - **Multi-dialect SQL**: placeholders, escaping, pagination and key retrieval per dialect
//! - **Deferred operations**: describe steps now, run them in order with `Connection::chain`
//! - **Statement tracing**: every statement is logged through `tracing` on `persist.sql`
//!
//! ## Example
//!
//! ```ignore
//! use persist::{Column, ConnectOptions, ConnectionFactory, Direction, ModelDef, SchemaBuilder};
//!
//! let mut b = SchemaBuilder::new();
//! let person = b.define("Person", ModelDef::new()
//!     .column("name", Column::string())
//!     .column("age", Column::integer()))?;
//! let phone = b.define("Phone", ModelDef::new().column("number", Column::string()))?;
//! b.has_many(person, phone)?;
//! let schema = b.build();
//! let person = schema.get(person);
//!
//! let conn = ConnectionFactory::new(ConnectOptions::sqlite_memory())?.connect().await?;
//! conn.create_tables(&schema).await?;
//!
//! let mut bob = person.create(persist::values! { "name" => "Bob", "age" => 21 });
//! bob.save(&conn).await?;
//!
//! let people = person
//!     .include("phones")
//!     .order_by("name", Direction::Asc)
//!     .all(&conn)
//!     .await?;
//! ```

pub mod config;
pub mod connection;
pub mod database;
pub mod driver;
pub mod error;
pub mod ident;
pub mod model;
pub mod pool;
pub mod query;
pub mod sql;
pub mod trace;
pub mod value;

pub use config::{ConnectOptions, DatabaseConfig, DriverKind, PoolOptions};
pub use connection::{Connection, SqlBatch, Transaction};
pub use database::{Database, ExecResult, PostgresDatabase};
#[cfg(feature = "sqlite")]
pub use database::SqliteDatabase;
pub use driver::{Dialect, Driver, IdRetrieval, Statement};
pub use error::{FieldError, OrmError, OrmResult, ValidationError};
pub use model::{
    Association, AssociationKind, AssociationOptions, Column, ColumnType, Event, HasManyAccessor,
    HasOneAccessor, Instance, JoinTable, Model, ModelDef, ModelId, Related, Schema, SchemaBuilder,
};
pub use pool::ConnectionFactory;
pub use query::{Assignments, Deferred, Direction, JoinKind, Outcome, Query};
pub use sql::{Sql, SqlTree};
pub use trace::SqlTrace;
pub use value::{Row, Value};
