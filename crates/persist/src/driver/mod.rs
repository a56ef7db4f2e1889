//! Dialect compiler.
//!
//! A [`Driver`] turns a [`SqlTree`](crate::sql::SqlTree) or a single
//! instance mutation into a [`Statement`]: SQL text for one dialect plus the
//! ordered parameter list. It never performs I/O.

mod compile;
mod ddl;

#[cfg(test)]
mod tests;

use crate::error::{OrmError, OrmResult};
use crate::model::{Instance, Model};
use crate::query::Assignments;
use crate::sql::Sql;
use crate::sql::lexer::{self, Token};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

/// SQL dialect of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Mysql,
    Postgres,
    Oracle,
}

impl Dialect {
    /// Write the placeholder for the 1-based parameter `index`.
    pub fn write_placeholder(self, out: &mut String, index: usize) {
        match self {
            Dialect::Sqlite | Dialect::Mysql => out.push('?'),
            Dialect::Postgres => {
                let _ = write!(out, "${index}");
            }
            Dialect::Oracle => {
                let _ = write!(out, ":{index}");
            }
        }
    }

    /// Quote an identifier when it is reserved or not a plain name.
    ///
    /// Oracle identifiers are never quoted: quoting there makes them
    /// case-sensitive.
    pub fn escape(self, ident: &str) -> Cow<'_, str> {
        let plain = crate::ident::is_simple(ident) && !crate::ident::is_reserved(ident);
        match self {
            Dialect::Oracle => Cow::Borrowed(ident),
            _ if plain => Cow::Borrowed(ident),
            Dialect::Mysql => Cow::Owned(format!("`{}`", ident.replace('`', "``"))),
            Dialect::Sqlite | Dialect::Postgres => {
                Cow::Owned(format!("\"{}\"", ident.replace('"', "\"\"")))
            }
        }
    }

    /// Separator between a table and its alias.
    pub(crate) fn table_alias_keyword(self) -> &'static str {
        match self {
            Dialect::Oracle => " ",
            _ => " AS ",
        }
    }

    /// Statement that opens a transaction; Oracle opens one implicitly.
    pub fn begin_sql(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some("BEGIN TRANSACTION"),
            Dialect::Postgres => Some("BEGIN"),
            Dialect::Mysql => Some("START TRANSACTION"),
            Dialect::Oracle => None,
        }
    }

    pub fn commit_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "COMMIT TRANSACTION",
            _ => "COMMIT",
        }
    }

    pub fn rollback_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => "ROLLBACK TRANSACTION",
            _ => "ROLLBACK",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Oracle => "oracle",
        }
    }
}

/// How the generated primary key of an INSERT is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRetrieval {
    /// Connection metadata (`last_insert_rowid`, `LAST_INSERT_ID()`).
    LastInsertId,
    /// First column of the first returned row (`RETURNING pk`).
    Returning,
    /// Trailing out parameter (`RETURNING pk INTO :n`).
    OutParam,
}

/// Compiled SQL plus its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub id_retrieval: Option<IdRetrieval>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            id_retrieval: None,
        }
    }

    fn with_id_retrieval(mut self, retrieval: IdRetrieval) -> Self {
        self.id_retrieval = Some(retrieval);
        self
    }
}

/// Compiles trees and instance mutations for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Driver {
    dialect: Dialect,
}

impl Driver {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn quote<'a>(&self, ident: &'a str) -> Cow<'a, str> {
        self.dialect.escape(ident)
    }

    /// INSERT for a new instance.
    ///
    /// An auto-increment primary key without a value is left out and read
    /// back after execution.
    pub fn insert(&self, instance: &Instance) -> OrmResult<Statement> {
        let model = instance.model();
        let pk = model.primary_key();
        let generated = pk.is_auto_increment() && instance.id().is_none();

        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in model.columns() {
            if generated && column.is_primary_key() {
                continue;
            }
            let value = instance.get(column.property()).cloned().unwrap_or(Value::Null);
            names.push(self.quote(column.name()).into_owned());
            values.push(column.coerce(value));
        }

        let table = self.quote(model.table_name());
        let mut sql = Sql::new(format!("INSERT INTO {table}"));
        if names.is_empty() {
            match self.dialect {
                Dialect::Mysql => sql.push(" () VALUES ()"),
                Dialect::Oracle => sql.push(&format!(" ({}) VALUES (DEFAULT)", pk.name())),
                Dialect::Sqlite | Dialect::Postgres => sql.push(" DEFAULT VALUES"),
            };
        } else {
            sql.push(&format!(" ({}) VALUES (", names.join(", ")));
            sql.push_bind_list(values);
            sql.push(")");
        }

        if !generated {
            return sql.into_statement(self.dialect);
        }
        let pk_name = self.quote(pk.name()).into_owned();
        match self.dialect {
            Dialect::Sqlite | Dialect::Mysql => Ok(sql
                .into_statement(self.dialect)?
                .with_id_retrieval(IdRetrieval::LastInsertId)),
            Dialect::Postgres => {
                sql.push(&format!(" RETURNING {pk_name}"));
                Ok(sql
                    .into_statement(self.dialect)?
                    .with_id_retrieval(IdRetrieval::Returning))
            }
            Dialect::Oracle => {
                let mut stmt = sql.into_statement(self.dialect)?;
                let out_index = stmt.params.len() + 1;
                let _ = write!(stmt.sql, " RETURNING {pk_name} INTO :{out_index}");
                Ok(stmt.with_id_retrieval(IdRetrieval::OutParam))
            }
        }
    }

    /// UPDATE of every non-key column of a persisted instance.
    pub fn update(&self, instance: &Instance) -> OrmResult<Statement> {
        let model = instance.model();
        let id = require_id(instance, "update")?;

        let mut sql = Sql::new(format!("UPDATE {} SET ", self.quote(model.table_name())));
        let mut first = true;
        for column in model.columns().filter(|c| !c.is_primary_key()) {
            if !first {
                sql.push(", ");
            }
            first = false;
            let value = instance.get(column.property()).cloned().unwrap_or(Value::Null);
            sql.push(&format!("{} = ", self.quote(column.name())));
            sql.push_bind(column.coerce(value));
        }
        if first {
            // Nothing but the key: rewrite the key onto itself.
            let pk = self.quote(model.primary_key().name()).into_owned();
            sql.push(&format!("{pk} = {pk}"));
        }
        self.push_pk_filter(&mut sql, model, id);
        sql.into_statement(self.dialect)
    }

    /// UPDATE of selected columns of the row with primary key `id`.
    pub fn update_by_id(
        &self,
        model: &Model,
        id: Value,
        assignments: &Assignments,
    ) -> OrmResult<Statement> {
        let mut sql = Sql::new(format!("UPDATE {} SET ", self.quote(model.table_name())));
        self.push_assignments(&mut sql, model, assignments)?;
        self.push_pk_filter(&mut sql, model, id);
        sql.into_statement(self.dialect)
    }

    /// DELETE of a persisted instance by primary key.
    pub fn delete(&self, instance: &Instance) -> OrmResult<Statement> {
        let model = instance.model();
        let id = require_id(instance, "delete")?;
        let mut sql = Sql::new(format!("DELETE FROM {}", self.quote(model.table_name())));
        self.push_pk_filter(&mut sql, model, id);
        sql.into_statement(self.dialect)
    }

    /// Link row of a many-to-many association.
    pub fn insert_join_row(
        &self,
        table: &str,
        owner_column: &str,
        owner_id: Value,
        target_column: &str,
        target_id: Value,
    ) -> OrmResult<Statement> {
        let mut sql = Sql::new(format!(
            "INSERT INTO {} ({}, {}) VALUES (",
            self.quote(table),
            self.quote(owner_column),
            self.quote(target_column)
        ));
        sql.push_bind(owner_id);
        sql.push(", ");
        sql.push_bind(target_id);
        sql.push(")");
        sql.into_statement(self.dialect)
    }

    /// Remove every link row of one owner.
    pub fn delete_join_rows(
        &self,
        table: &str,
        owner_column: &str,
        owner_id: Value,
    ) -> OrmResult<Statement> {
        let mut sql = Sql::new(format!(
            "DELETE FROM {} WHERE {} = ",
            self.quote(table),
            self.quote(owner_column)
        ));
        sql.push_bind(owner_id);
        sql.into_statement(self.dialect)
    }

    /// Rewrite `?` placeholders of caller SQL into this dialect's syntax.
    pub fn normalize_placeholders(&self, sql: &str) -> String {
        if matches!(self.dialect, Dialect::Sqlite | Dialect::Mysql) {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        for token in lexer::tokenize(sql) {
            match token {
                Token::Text(s) | Token::Ident(s) => out.push_str(s),
                Token::Placeholder => {
                    index += 1;
                    self.dialect.write_placeholder(&mut out, index);
                }
            }
        }
        out
    }

    /// Bring result column names into the shape the materializer expects.
    ///
    /// Oracle reports unquoted aliases in upper case and the pagination
    /// wrapper adds a row-number column.
    pub fn normalize_rows(&self, rows: Vec<Row>) -> Vec<Row> {
        if self.dialect != Dialect::Oracle || rows.is_empty() {
            return rows;
        }
        let columns = rows[0].columns().to_vec();
        let keep: Vec<bool> = columns
            .iter()
            .map(|c| !c.eq_ignore_ascii_case(compile::ROWNUM_COLUMN))
            .collect();
        let names: Arc<[String]> = columns
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(c, _)| c.to_ascii_lowercase())
            .collect();
        rows.into_iter()
            .map(|row| {
                let (_, values) = row.into_parts();
                let values = values
                    .into_iter()
                    .zip(&keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| v)
                    .collect();
                Row::new(names.clone(), values)
            })
            .collect()
    }

    fn push_pk_filter(&self, sql: &mut Sql, model: &Model, id: Value) {
        sql.push(&format!(" WHERE {} = ", self.quote(model.primary_key().name())));
        sql.push_bind(id);
    }

    fn push_assignments(
        &self,
        sql: &mut Sql,
        model: &Model,
        assignments: &Assignments,
    ) -> OrmResult<()> {
        let resolved = assignments.resolve(model)?;
        if resolved.is_empty() {
            return Err(OrmError::mapping(format!(
                "update of '{}' has no assignments",
                model.name()
            )));
        }
        for (i, (column, value)) in resolved.into_iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(&format!("{} = ", self.quote(column.name())));
            sql.push_bind(value);
        }
        Ok(())
    }
}

fn require_id(instance: &Instance, action: &str) -> OrmResult<Value> {
    instance.id().cloned().ok_or_else(|| {
        OrmError::mapping(format!(
            "cannot {action} '{}' without a primary key value",
            instance.model().name()
        ))
    })
}
