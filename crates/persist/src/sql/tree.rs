use crate::error::{OrmError, OrmResult};
use crate::model::{AssociationKind, Model};
use crate::query::Assignments;
use crate::value::Value;

/// What a tree compiles to.
#[derive(Debug, Clone)]
pub enum Action {
    Select,
    Count,
    Min(String),
    Max(String),
    Sum(String),
    Delete,
    Update(Assignments),
}

impl Action {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Action::Count | Action::Min(_) | Action::Max(_) | Action::Sum(_)
        )
    }
}

/// A projected column.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub model: Model,
    pub property: String,
    pub table_alias: String,
    pub db_column: String,
    /// Unique result alias (`c0`, `c1`, ...).
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `<kind> JOIN table AS alias ON alias.column = other_alias.other_column`
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub column: String,
    pub other_alias: String,
    pub other_column: String,
    /// Association reached by this join, if any.
    pub association: Option<String>,
    /// Model stored in `table`, unknown for raw table joins.
    pub model: Option<Model>,
}

/// An association fetched eagerly and nested during materialization.
#[derive(Debug, Clone)]
pub struct Include {
    pub name: String,
    pub model: Model,
    pub kind: AssociationKind,
    pub table_alias: String,
    pub primary_key_alias: String,
}

/// One ANDed WHERE clause.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Caller SQL with `?` placeholders; property names are rewritten on compile.
    Raw { expr: String, params: Vec<Value> },
    /// `name = value` (`IS NULL` for a null value).
    Eq { name: String, value: Value },
    /// `name IN (...)`; an empty list matches nothing.
    In { name: String, values: Vec<Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    /// Alias of the projected column to order by.
    pub alias: String,
    pub direction: Direction,
}

/// The intermediate representation of one query.
///
/// Column aliases and table aliases are allocated from counters owned by the
/// tree, so they are unique within it. The root model's primary-key alias
/// drives de-duplication when rows are materialized.
#[derive(Debug, Clone)]
pub struct SqlTree {
    pub(crate) action: Action,
    pub(crate) model: Model,
    pub(crate) table_alias: String,
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) primary_key_alias: Option<String>,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: Vec<Predicate>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) includes: Vec<Include>,
    next_column: usize,
    next_table: usize,
}

impl SqlTree {
    /// A select of every column of `model`.
    pub fn new(model: &Model) -> Self {
        let mut tree = Self {
            action: Action::Select,
            model: model.clone(),
            table_alias: "t0".to_string(),
            columns: Vec::new(),
            primary_key_alias: None,
            joins: Vec::new(),
            wheres: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
            next_column: 0,
            next_table: 1,
        };
        let pk = model.primary_key().property().to_string();
        let properties: Vec<String> = model.columns().map(|c| c.property().to_string()).collect();
        for property in properties {
            let alias = tree.push_column(model, &property, "t0", model_column_name(model, &property));
            if property == pk {
                tree.primary_key_alias = Some(alias);
            }
        }
        tree
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    pub fn primary_key_alias(&self) -> Option<&str> {
        self.primary_key_alias.as_deref()
    }

    /// Register a projected column with a fresh alias.
    pub fn add_column(
        &mut self,
        model: &Model,
        property: &str,
        table_alias: &str,
    ) -> OrmResult<&ColumnDef> {
        let db_column = model
            .column(property)
            .map(|c| c.name().to_string())
            .ok_or_else(|| {
                OrmError::mapping(format!(
                    "model '{}' has no column '{property}'",
                    model.name()
                ))
            })?;
        self.push_column(model, property, table_alias, db_column);
        Ok(&self.columns[self.columns.len() - 1])
    }

    fn push_column(
        &mut self,
        model: &Model,
        property: &str,
        table_alias: &str,
        db_column: String,
    ) -> String {
        let alias = format!("c{}", self.next_column);
        self.next_column += 1;
        self.columns.push(ColumnDef {
            model: model.clone(),
            property: property.to_string(),
            table_alias: table_alias.to_string(),
            db_column,
            alias: alias.clone(),
        });
        alias
    }

    fn next_table_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_table);
        self.next_table += 1;
        alias
    }

    pub fn column_by_alias(&self, alias: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.alias == alias)
    }

    /// Projected column of `property` from the table under `table_alias`.
    pub fn column_for(&self, table_alias: &str, property: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.table_alias == table_alias && c.property == property)
    }

    /// Join the root model to one of its associations, reusing an existing
    /// join of the same association. Returns the alias of the related table.
    pub fn join_association(&mut self, name: &str, kind: JoinKind) -> OrmResult<String> {
        if let Some(existing) = self
            .joins
            .iter()
            .find(|j| j.association.as_deref() == Some(name))
        {
            return Ok(existing.alias.clone());
        }

        let root = self.model.clone();
        let association = root.association(name)?.clone();
        let target = root.related(&association);
        let root_pk = root.primary_key().name().to_string();

        match (association.kind(), association.through(), association.through_key()) {
            (AssociationKind::HasOne, _, _) => {
                let fk = model_column_name(&root, association.foreign_key());
                let alias = self.next_table_alias();
                self.joins.push(Join {
                    kind,
                    table: target.table_name().to_string(),
                    alias: alias.clone(),
                    column: target.primary_key().name().to_string(),
                    other_alias: self.table_alias.clone(),
                    other_column: fk,
                    association: Some(name.to_string()),
                    model: Some(target),
                });
                Ok(alias)
            }
            (AssociationKind::HasMany, Some(through), Some(through_key)) => {
                let link_alias = self.next_table_alias();
                self.joins.push(Join {
                    kind,
                    table: through.to_string(),
                    alias: link_alias.clone(),
                    column: association.foreign_key().to_string(),
                    other_alias: self.table_alias.clone(),
                    other_column: root_pk,
                    association: None,
                    model: None,
                });
                let alias = self.next_table_alias();
                self.joins.push(Join {
                    kind,
                    table: target.table_name().to_string(),
                    alias: alias.clone(),
                    column: target.primary_key().name().to_string(),
                    other_alias: link_alias,
                    other_column: through_key.to_string(),
                    association: Some(name.to_string()),
                    model: Some(target),
                });
                Ok(alias)
            }
            (AssociationKind::HasMany, _, _) => {
                let fk = model_column_name(&target, association.foreign_key());
                let alias = self.next_table_alias();
                self.joins.push(Join {
                    kind,
                    table: target.table_name().to_string(),
                    alias: alias.clone(),
                    column: fk,
                    other_alias: self.table_alias.clone(),
                    other_column: root_pk,
                    association: Some(name.to_string()),
                    model: Some(target),
                });
                Ok(alias)
            }
        }
    }

    /// Join a table by name: `table.column = root.root_property`.
    pub fn join_table(
        &mut self,
        kind: JoinKind,
        table: &str,
        column: &str,
        root_property: &str,
    ) -> OrmResult<String> {
        crate::ident::validate(table)?;
        crate::ident::validate(column)?;
        let other_column = self
            .model
            .find_column(root_property)
            .map(|c| c.name().to_string())
            .ok_or_else(|| {
                OrmError::mapping(format!(
                    "model '{}' has no column '{root_property}'",
                    self.model.name()
                ))
            })?;
        let alias = self.next_table_alias();
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.clone(),
            column: column.to_string(),
            other_alias: self.table_alias.clone(),
            other_column,
            association: None,
            model: None,
        });
        Ok(alias)
    }

    /// Eagerly fetch an association: left join it and project all of its columns.
    pub fn include(&mut self, name: &str) -> OrmResult<()> {
        if self.includes.iter().any(|i| i.name == name) {
            return Ok(());
        }
        let association = self.model.association(name)?.clone();
        let target = self.model.related(&association);
        let table_alias = self.join_association(name, JoinKind::Left)?;

        let pk = target.primary_key().property().to_string();
        let mut primary_key_alias = None;
        let properties: Vec<String> = target.columns().map(|c| c.property().to_string()).collect();
        for property in properties {
            let alias = self.add_column(&target, &property, &table_alias)?.alias.clone();
            if property == pk {
                primary_key_alias = Some(alias);
            }
        }
        let primary_key_alias = primary_key_alias.ok_or_else(|| {
            OrmError::mapping(format!(
                "included model '{}' has no primary key column",
                target.name()
            ))
        })?;

        self.includes.push(Include {
            name: name.to_string(),
            model: target,
            kind: association.kind(),
            table_alias,
            primary_key_alias,
        });
        Ok(())
    }

    /// Resolve a property reference to `(table alias, db column)`.
    ///
    /// Accepts `property`, `db_column`, `association.property`,
    /// `Table.column` for joined tables, and `RootTable.property`.
    pub fn resolve(&self, name: &str) -> Option<(String, String)> {
        let Some((head, tail)) = name.split_once('.') else {
            return self
                .model
                .find_column(name)
                .map(|c| (self.table_alias.clone(), c.name().to_string()));
        };
        if tail.contains('.') {
            return None;
        }

        if let Some(join) = self
            .joins
            .iter()
            .find(|j| j.association.as_deref() == Some(head))
            .or_else(|| self.joins.iter().find(|j| j.table == head))
        {
            return match &join.model {
                Some(model) => model
                    .find_column(tail)
                    .map(|c| (join.alias.clone(), c.name().to_string())),
                None => Some((join.alias.clone(), tail.to_string())),
            };
        }

        if head == self.model.table_name() || head == self.model.name() {
            return self
                .model
                .find_column(tail)
                .map(|c| (self.table_alias.clone(), c.name().to_string()));
        }
        None
    }
}

fn model_column_name(model: &Model, property: &str) -> String {
    model
        .column(property)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| property.to_string())
}
