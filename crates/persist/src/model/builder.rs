use super::association::{Association, AssociationKind, AssociationOptions};
use super::column::{Column, ColumnType};
use super::inflect;
use super::{Event, Hooks, Instance, ModelDescriptor, ModelId, Schema, SchemaInner, ScopeFn};
use crate::error::{OrmError, OrmResult, ValidationError};
use crate::ident;
use crate::query::Query;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Declaration of one model: columns, table name, hooks and scopes.
#[derive(Default)]
#[must_use]
pub struct ModelDef {
    table: Option<String>,
    columns: Vec<(String, Column)>,
    hooks: Hooks,
    scopes: HashMap<String, ScopeFn>,
}

impl ModelDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit table name (defaults to the pluralized model name).
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    pub fn column(mut self, property: impl Into<String>, column: impl Into<Column>) -> Self {
        self.columns.push((property.into(), column.into()));
        self
    }

    /// Listen for a lifecycle event.
    pub fn on(mut self, event: Event, f: impl Fn(&mut Instance) + Send + Sync + 'static) -> Self {
        self.hooks.listeners.push((event, Arc::new(f)));
        self
    }

    /// Callback run first in the before-save phase; an error aborts the save.
    pub fn on_save(
        mut self,
        f: impl Fn(&mut Instance) -> OrmResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_save = Some(Arc::new(f));
        self
    }

    /// Callback run once per materialized root instance.
    pub fn on_load(mut self, f: impl Fn(&mut Instance) + Send + Sync + 'static) -> Self {
        self.hooks.on_load = Some(Arc::new(f));
        self
    }

    /// Model-level validator, run after any instance validator.
    pub fn validate(
        mut self,
        f: impl Fn(&Instance) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.validators.push(Arc::new(f));
        self
    }

    /// Named, reusable query refinement.
    pub fn scope(
        mut self,
        name: impl Into<String>,
        f: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.scopes.insert(name.into(), Arc::new(f));
        self
    }
}

/// Collects model definitions and associations, then freezes them into a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    models: Vec<ModelDescriptor>,
    by_name: HashMap<String, ModelId>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a model.
    ///
    /// Column database names default to the snake_case property name. When
    /// no column is marked as primary key an auto-increment integer `id` is
    /// appended.
    pub fn define(&mut self, name: &str, def: ModelDef) -> OrmResult<ModelId> {
        ident::validate(name)?;
        if self.by_name.contains_key(name) {
            return Err(OrmError::mapping(format!("model '{name}' is already defined")));
        }

        let table = def.table.unwrap_or_else(|| inflect::pluralize(name));
        ident::validate(&table)?;

        let mut columns = IndexMap::with_capacity(def.columns.len() + 1);
        let mut primary_key = None;
        for (property, mut column) in def.columns {
            if columns.contains_key(&property) {
                return Err(OrmError::mapping(format!(
                    "column '{property}' is declared twice on model '{name}'"
                )));
            }
            column.property = property.clone();
            if column.db_column.is_none() {
                column.db_column = Some(inflect::column_name(&property));
            }
            ident::validate(column.name())?;
            if column.primary_key {
                if let Some(existing) = &primary_key {
                    return Err(OrmError::mapping(format!(
                        "model '{name}' declares more than one primary key ('{existing}', '{property}')"
                    )));
                }
                primary_key = Some(property.clone());
            }
            columns.insert(property, column);
        }

        let primary_key = match primary_key {
            Some(pk) => pk,
            None => {
                if columns.contains_key("id") {
                    return Err(OrmError::mapping(format!(
                        "model '{name}' has an 'id' column that is not its primary key"
                    )));
                }
                let mut id = Column::integer().primary_key().auto_increment();
                id.property = "id".to_string();
                id.db_column = Some("id".to_string());
                columns.insert("id".to_string(), id);
                "id".to_string()
            }
        };

        let id = ModelId(self.models.len());
        self.models.push(ModelDescriptor {
            name: name.to_string(),
            table,
            columns,
            primary_key,
            associations: IndexMap::new(),
            hooks: def.hooks,
            scopes: def.scopes,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// `from` has many `to`; `to` gets a foreign key back to `from`.
    pub fn has_many(&mut self, from: ModelId, to: ModelId) -> OrmResult<()> {
        self.has_many_with(from, to, AssociationOptions::default())
    }

    pub fn has_many_with(
        &mut self,
        from: ModelId,
        to: ModelId,
        opts: AssociationOptions,
    ) -> OrmResult<()> {
        let from_name = self.descriptor(from)?.name.clone();
        let to_name = self.descriptor(to)?.name.clone();
        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| inflect::property_name(&inflect::pluralize(&to_name)));

        if let Some(table) = opts.through {
            ident::validate(&table)?;
            let own_key = opts
                .foreign_key
                .unwrap_or_else(|| inflect::foreign_key_column(&from_name));
            let other_key = opts
                .many_to_many_foreign_key
                .unwrap_or_else(|| inflect::foreign_key_column(&to_name));
            ident::validate(&own_key)?;
            ident::validate(&other_key)?;

            self.add_association(
                from,
                Association {
                    name,
                    kind: AssociationKind::HasMany,
                    target: to,
                    foreign_key: own_key.clone(),
                    through: Some(table.clone()),
                    through_key: Some(other_key.clone()),
                },
            )?;
            if opts.create_inverse {
                let inverse = inflect::property_name(&inflect::pluralize(&from_name));
                self.add_inverse(
                    to,
                    Association {
                        name: inverse,
                        kind: AssociationKind::HasMany,
                        target: from,
                        foreign_key: other_key,
                        through: Some(table),
                        through_key: Some(own_key),
                    },
                );
            }
            return Ok(());
        }

        let fk_column = opts
            .foreign_key
            .unwrap_or_else(|| inflect::foreign_key_column(&from_name));
        let fk_property = self.ensure_foreign_key(to, from, &fk_column)?;

        self.add_association(
            from,
            Association {
                name,
                kind: AssociationKind::HasMany,
                target: to,
                foreign_key: fk_property.clone(),
                through: None,
                through_key: None,
            },
        )?;
        if opts.create_inverse {
            self.add_inverse(
                to,
                Association {
                    name: inflect::property_name(&from_name),
                    kind: AssociationKind::HasOne,
                    target: from,
                    foreign_key: fk_property,
                    through: None,
                    through_key: None,
                },
            );
        }
        Ok(())
    }

    /// `from` holds a foreign key pointing at `to`.
    pub fn has_one(&mut self, from: ModelId, to: ModelId) -> OrmResult<()> {
        self.has_one_with(from, to, AssociationOptions::default())
    }

    pub fn has_one_with(
        &mut self,
        from: ModelId,
        to: ModelId,
        opts: AssociationOptions,
    ) -> OrmResult<()> {
        if opts.through.is_some() {
            return Err(OrmError::mapping(
                "has_one does not support a `through` join table",
            ));
        }
        let from_name = self.descriptor(from)?.name.clone();
        let to_name = self.descriptor(to)?.name.clone();
        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| inflect::property_name(&to_name));
        let fk_column = opts
            .foreign_key
            .unwrap_or_else(|| inflect::foreign_key_column(&name));
        let fk_property = self.ensure_foreign_key(from, to, &fk_column)?;

        self.add_association(
            from,
            Association {
                name,
                kind: AssociationKind::HasOne,
                target: to,
                foreign_key: fk_property.clone(),
                through: None,
                through_key: None,
            },
        )?;
        if opts.create_inverse {
            self.add_inverse(
                to,
                Association {
                    name: inflect::property_name(&inflect::pluralize(&from_name)),
                    kind: AssociationKind::HasMany,
                    target: from,
                    foreign_key: fk_property,
                    through: None,
                    through_key: None,
                },
            );
        }
        Ok(())
    }

    pub fn build(self) -> Schema {
        Schema::new(SchemaInner {
            models: self.models,
            by_name: self.by_name,
        })
    }

    fn descriptor(&self, id: ModelId) -> OrmResult<&ModelDescriptor> {
        self.models
            .get(id.0)
            .ok_or_else(|| OrmError::mapping(format!("unknown model id {}", id.0)))
    }

    /// Make sure `owner` has a foreign-key column named `db_column` pointing at
    /// `target`, returning its property name.
    fn ensure_foreign_key(
        &mut self,
        owner: ModelId,
        target: ModelId,
        db_column: &str,
    ) -> OrmResult<String> {
        ident::validate(db_column)?;
        let target_desc = self.descriptor(target)?;
        let key_type = match target_desc.columns.get(&target_desc.primary_key) {
            Some(pk) => pk.ty,
            None => ColumnType::Integer,
        };

        let owner_desc = &mut self.models[owner.0];
        if let Some(existing) = owner_desc.columns.values().find(|c| c.name() == db_column) {
            return Ok(existing.property.clone());
        }
        let property = inflect::property_name(db_column);
        if owner_desc.columns.contains_key(&property) {
            return Err(OrmError::mapping(format!(
                "foreign key '{db_column}' collides with column '{property}' on model '{}'",
                owner_desc.name
            )));
        }
        let mut column = Column::foreign_key_of(key_type, db_column.to_string());
        column.property = property.clone();
        owner_desc.columns.insert(property.clone(), column);
        Ok(property)
    }

    fn add_association(&mut self, owner: ModelId, association: Association) -> OrmResult<()> {
        let desc = &mut self.models[owner.0];
        if let Some(existing) = desc.associations.get(&association.name) {
            // Re-declaring an inverse that was already registered is a no-op.
            if existing.kind == association.kind
                && existing.target == association.target
                && existing.foreign_key == association.foreign_key
                && existing.through == association.through
            {
                return Ok(());
            }
            return Err(OrmError::mapping(format!(
                "model '{}' already has an association named '{}'",
                desc.name, association.name
            )));
        }
        if desc.columns.contains_key(&association.name) {
            return Err(OrmError::mapping(format!(
                "association '{}' collides with a column on model '{}'",
                association.name, desc.name
            )));
        }
        desc.associations
            .insert(association.name.clone(), association);
        Ok(())
    }

    // Inverse edges never override an explicit declaration.
    fn add_inverse(&mut self, owner: ModelId, association: Association) {
        let desc = &mut self.models[owner.0];
        if desc.associations.contains_key(&association.name)
            || desc.columns.contains_key(&association.name)
        {
            return;
        }
        desc.associations
            .insert(association.name.clone(), association);
    }
}
