use super::{Dialect, Driver, Statement};
use crate::error::{OrmError, OrmResult};
use crate::query::Assignments;
use crate::sql::lexer::{self, Token};
use crate::sql::{Action, Direction, JoinKind, Predicate, Sql, SqlTree};

/// Row-number column added by the Oracle pagination wrapper.
pub(crate) const ROWNUM_COLUMN: &str = "persist_rnum";

/// MySQL has no offset-only form; this is its documented "no limit".
const MYSQL_NO_LIMIT: &str = "18446744073709551615";

impl Driver {
    /// Compile a tree according to its action.
    pub fn compile(&self, tree: &SqlTree) -> OrmResult<Statement> {
        let sql = match tree.action() {
            Action::Delete => self.compile_delete(tree)?,
            Action::Update(assignments) => self.compile_update(tree, assignments)?,
            _ => self.compile_select(tree)?,
        };
        sql.into_statement(self.dialect)
    }

    fn compile_select(&self, tree: &SqlTree) -> OrmResult<Sql> {
        let mut sql = Sql::new("SELECT ");
        match tree.action() {
            Action::Count => {
                if tree.joins().is_empty() {
                    sql.push("COUNT(*) AS c0");
                } else {
                    let pk = self.root_pk(tree);
                    sql.push(&format!("COUNT(DISTINCT {pk}) AS c0"));
                }
            }
            Action::Min(field) => return self.compile_aggregate(tree, "MIN", field),
            Action::Max(field) => return self.compile_aggregate(tree, "MAX", field),
            Action::Sum(field) => return self.compile_aggregate(tree, "SUM", field),
            _ => {
                let projection: Vec<String> = tree
                    .columns()
                    .iter()
                    .map(|c| {
                        format!("{}.{} AS {}", c.table_alias, self.quote(&c.db_column), c.alias)
                    })
                    .collect();
                sql.push(&projection.join(", "));
            }
        }
        sql.push(" FROM ");
        self.push_from(&mut sql, tree);
        self.push_where(&mut sql, tree)?;

        if tree.action().is_aggregate() {
            return Ok(sql);
        }
        let paged = tree.limit.is_some() || tree.offset.is_some();
        let page_roots = paged && !tree.includes().is_empty();
        if page_roots {
            self.push_root_page(&mut sql, tree)?;
        }
        if !tree.order_by.is_empty() {
            let order: Vec<String> = tree
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.alias, o.direction.as_sql()))
                .collect();
            sql.push(&format!(" ORDER BY {}", order.join(", ")));
        }
        if page_roots {
            return Ok(sql);
        }
        Ok(self.paginate(sql, tree.limit, tree.offset))
    }

    /// MIN, MAX or SUM of one column.
    ///
    /// A root column under joins is aggregated over the matching root rows,
    /// each counted once.
    fn compile_aggregate(&self, tree: &SqlTree, func: &str, field: &str) -> OrmResult<Sql> {
        let (alias, column) = self.resolve(tree, field)?;
        let mut sql = Sql::new(format!(
            "SELECT {func}({alias}.{}) AS c0 FROM ",
            self.quote(&column)
        ));
        if tree.joins().is_empty() || alias != tree.table_alias() {
            self.push_from(&mut sql, tree);
            self.push_where(&mut sql, tree)?;
            return Ok(sql);
        }
        let pk = self.root_pk(tree);
        sql.push(&format!(
            "{}{}{alias} WHERE {pk} IN (SELECT {pk} FROM ",
            self.quote(tree.model().table_name()),
            self.dialect.table_alias_keyword()
        ));
        self.push_from(&mut sql, tree);
        self.push_where(&mut sql, tree)?;
        sql.push(")");
        Ok(sql)
    }

    /// Limit and offset of an include query count root keys, not joined
    /// rows: the page is chosen over distinct root keys in the query's order
    /// and every joined row of those roots is returned.
    fn push_root_page(&self, sql: &mut Sql, tree: &SqlTree) -> OrmResult<()> {
        let pk = self.root_pk(tree);
        let mut keys = Sql::new(format!("SELECT {pk} AS c0 FROM "));
        self.push_from(&mut keys, tree);
        self.push_where(&mut keys, tree)?;
        keys.push(&format!(" GROUP BY {pk}"));
        let order = tree
            .order_by
            .iter()
            .map(|o| {
                let column = tree
                    .columns()
                    .iter()
                    .find(|c| c.alias == o.alias)
                    .ok_or_else(|| {
                        OrmError::mapping(format!("order column '{}' is not projected", o.alias))
                    })?;
                let func = match o.direction {
                    Direction::Asc => "MIN",
                    Direction::Desc => "MAX",
                };
                Ok(format!(
                    "{func}({}.{}) {}",
                    column.table_alias,
                    self.quote(&column.db_column),
                    o.direction.as_sql()
                ))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        if !order.is_empty() {
            keys.push(&format!(" ORDER BY {}", order.join(", ")));
        }
        let keys = self.paginate(keys, tree.limit, tree.offset);

        sql.push(if tree.wheres.is_empty() { " WHERE " } else { " AND " });
        sql.push(&format!("{pk} IN (SELECT c0 FROM ("));
        sql.push_sql(keys);
        sql.push(&format!(
            "){}persist_page_ids)",
            self.dialect.table_alias_keyword()
        ));
        Ok(())
    }

    fn compile_delete(&self, tree: &SqlTree) -> OrmResult<Sql> {
        let table = self.quote(tree.model().table_name()).into_owned();
        let mut sql = Sql::new(format!("DELETE FROM {table}"));
        self.push_scope(&mut sql, tree)?;
        Ok(sql)
    }

    fn compile_update(&self, tree: &SqlTree, assignments: &Assignments) -> OrmResult<Sql> {
        let table = self.quote(tree.model().table_name()).into_owned();
        let mut sql = Sql::new(format!("UPDATE {table} SET "));
        self.push_assignments(&mut sql, tree.model(), assignments)?;
        self.push_scope(&mut sql, tree)?;
        Ok(sql)
    }

    /// Restrict a bulk statement to the rows the tree selects.
    ///
    /// Bulk statements cannot carry joins or aliases portably, so a filtered
    /// tree becomes `pk IN (subquery)`. Order and limit do not apply.
    fn push_scope(&self, sql: &mut Sql, tree: &SqlTree) -> OrmResult<()> {
        if tree.wheres.is_empty() && tree.joins().is_empty() {
            return Ok(());
        }
        let model = tree.model();
        sql.push(&format!(" WHERE {} IN (", self.quote(model.primary_key().name())));
        if self.dialect == Dialect::Mysql {
            // MySQL refuses a subquery on the table being modified unless it
            // is materialized as a derived table.
            sql.push("SELECT c0 FROM (");
        }
        sql.push(&format!("SELECT {} AS c0 FROM ", self.root_pk(tree)));
        self.push_from(sql, tree);
        self.push_where(sql, tree)?;
        if self.dialect == Dialect::Mysql {
            sql.push(") AS persist_ids");
        }
        sql.push(")");
        Ok(())
    }

    fn root_pk(&self, tree: &SqlTree) -> String {
        format!(
            "{}.{}",
            tree.table_alias(),
            self.quote(tree.model().primary_key().name())
        )
    }

    fn push_from(&self, sql: &mut Sql, tree: &SqlTree) {
        let kw = self.dialect.table_alias_keyword();
        sql.push(&format!(
            "{}{kw}{}",
            self.quote(tree.model().table_name()),
            tree.table_alias()
        ));
        for join in tree.joins() {
            let kind = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push(&format!(
                " {kind} {}{kw}{} ON {}.{} = {}.{}",
                self.quote(&join.table),
                join.alias,
                join.alias,
                self.quote(&join.column),
                join.other_alias,
                self.quote(&join.other_column)
            ));
        }
    }

    fn push_where(&self, sql: &mut Sql, tree: &SqlTree) -> OrmResult<()> {
        for (i, predicate) in tree.wheres.iter().enumerate() {
            sql.push(if i == 0 { " WHERE " } else { " AND " });
            match predicate {
                Predicate::Raw { expr, params } => {
                    sql.push("(");
                    self.push_raw(sql, tree, expr, params)?;
                    sql.push(")");
                }
                Predicate::Eq { name, value } => {
                    let (alias, column) = self.resolve(tree, name)?;
                    sql.push(&format!("{alias}.{}", self.quote(&column)));
                    if value.is_null() {
                        sql.push(" IS NULL");
                    } else {
                        sql.push(" = ");
                        sql.push_bind(self.coerce_for(tree, name, value.clone()));
                    }
                }
                Predicate::In { name, values } => {
                    if values.is_empty() {
                        sql.push("1 = 0");
                        continue;
                    }
                    let (alias, column) = self.resolve(tree, name)?;
                    sql.push(&format!("{alias}.{} IN (", self.quote(&column)));
                    sql.push_bind_list(
                        values
                            .iter()
                            .map(|v| self.coerce_for(tree, name, v.clone())),
                    );
                    sql.push(")");
                }
            }
        }
        Ok(())
    }

    /// Copy a caller expression, binding its parameters and rewriting
    /// property references into aliased column references.
    fn push_raw(
        &self,
        sql: &mut Sql,
        tree: &SqlTree,
        expr: &str,
        params: &[crate::Value],
    ) -> OrmResult<()> {
        let tokens = lexer::tokenize(expr);
        let expected = lexer::count_placeholders(&tokens);
        if expected != params.len() {
            return Err(OrmError::mapping(format!(
                "where clause '{expr}' has {expected} placeholders but {} parameters",
                params.len()
            )));
        }

        let mut params = params.iter();
        for token in tokens {
            match token {
                Token::Text(s) => {
                    sql.push(s);
                }
                Token::Ident(name) => match tree.resolve(name) {
                    Some((alias, column)) => {
                        sql.push(&format!("{alias}.{}", self.quote(&column)));
                    }
                    None => {
                        sql.push(name);
                    }
                },
                Token::Placeholder => {
                    if let Some(value) = params.next() {
                        sql.push_bind(value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, tree: &SqlTree, name: &str) -> OrmResult<(String, String)> {
        tree.resolve(name).ok_or_else(|| {
            OrmError::mapping(format!(
                "'{name}' does not name a column of '{}' or its joins",
                tree.model().name()
            ))
        })
    }

    /// Coerce a filter value to the type of the root column it compares with.
    fn coerce_for(&self, tree: &SqlTree, name: &str, value: crate::Value) -> crate::Value {
        match tree.model().find_column(name) {
            Some(column) => column.coerce(value),
            None => value,
        }
    }

    fn paginate(&self, mut sql: Sql, limit: Option<u64>, offset: Option<u64>) -> Sql {
        if limit.is_none() && offset.is_none() {
            return sql;
        }
        let offset_value = offset.unwrap_or(0);
        match self.dialect {
            Dialect::Sqlite | Dialect::Mysql => {
                let limit = match (limit, self.dialect) {
                    (Some(n), _) => n.to_string(),
                    (None, Dialect::Mysql) => MYSQL_NO_LIMIT.to_string(),
                    (None, _) => "-1".to_string(),
                };
                sql.push(&format!(" LIMIT {limit}"));
                if offset.is_some() {
                    sql.push(&format!(" OFFSET {offset_value}"));
                }
                sql
            }
            Dialect::Postgres => {
                if let Some(n) = limit {
                    sql.push(&format!(" LIMIT {n}"));
                }
                if offset.is_some() {
                    sql.push(&format!(" OFFSET {offset_value}"));
                }
                sql
            }
            Dialect::Oracle => {
                let mut outer = Sql::new(format!(
                    "SELECT * FROM (SELECT persist_page.*, ROWNUM {ROWNUM_COLUMN} FROM ("
                ));
                outer.push_sql(sql);
                outer.push(") persist_page");
                if let Some(n) = limit {
                    outer.push(&format!(" WHERE ROWNUM <= {}", offset_value.saturating_add(n)));
                }
                outer.push(&format!(") WHERE {ROWNUM_COLUMN} > {offset_value}"));
                outer
            }
        }
    }
}
