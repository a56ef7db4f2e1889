use super::{Dialect, Driver, Statement};
use crate::error::{OrmError, OrmResult};
use crate::model::{ColumnType, JoinTable, Model};

impl Driver {
    /// `CREATE TABLE IF NOT EXISTS` for a model.
    pub fn create_table(&self, model: &Model) -> OrmResult<Statement> {
        self.ensure_ddl_support()?;
        let columns: Vec<String> = model
            .columns()
            .map(|c| {
                let name = self.quote(c.name());
                match (c.is_primary_key(), c.is_auto_increment()) {
                    (true, true) => format!("{name} {}", self.auto_increment_key()),
                    (true, false) => format!("{name} {} PRIMARY KEY", self.column_type(c.ty())),
                    _ => format!("{name} {}", self.column_type(c.ty())),
                }
            })
            .collect();
        Ok(Statement::new(
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.quote(model.table_name()),
                columns.join(", ")
            ),
            Vec::new(),
        ))
    }

    /// `CREATE TABLE IF NOT EXISTS` for a many-to-many link table.
    pub fn create_join_table(&self, table: &JoinTable) -> OrmResult<Statement> {
        self.ensure_ddl_support()?;
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", self.quote(name), self.column_type(*ty)))
            .collect();
        Ok(Statement::new(
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.quote(&table.name),
                columns.join(", ")
            ),
            Vec::new(),
        ))
    }

    fn ensure_ddl_support(&self) -> OrmResult<()> {
        if self.dialect == Dialect::Oracle {
            return Err(OrmError::mapping(
                "table creation is not supported for the oracle dialect",
            ));
        }
        Ok(())
    }

    fn auto_increment_key(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
            Dialect::Mysql | Dialect::Oracle => "BIGINT AUTO_INCREMENT PRIMARY KEY",
        }
    }

    fn column_type(&self, ty: ColumnType) -> &'static str {
        match (self.dialect, ty) {
            (_, ColumnType::String) => "TEXT",
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (_, ColumnType::Integer) => "BIGINT",
            (Dialect::Sqlite, ColumnType::Real) => "REAL",
            (Dialect::Postgres, ColumnType::Real) => "DOUBLE PRECISION",
            (_, ColumnType::Real) => "DOUBLE",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Postgres, ColumnType::DateTime) => "TIMESTAMPTZ",
            (Dialect::Mysql, ColumnType::DateTime) => "DATETIME(3)",
            (_, ColumnType::DateTime) => "DATETIME",
            (Dialect::Postgres, ColumnType::Json) => "JSONB",
            (Dialect::Mysql, ColumnType::Json) => "JSON",
            (_, ColumnType::Json) => "TEXT",
        }
    }
}
