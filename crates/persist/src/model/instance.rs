use super::accessor::{HasManyAccessor, HasOneAccessor};
use super::association::AssociationKind;
use super::{Model, ValidatorFn};
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult, ValidationError};
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Related data held by an instance, either loaded through an include or
/// assigned by the caller.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Instance>>),
    Many(Vec<Instance>),
}

/// A row of a model, free-standing or bound to the connection that loaded
/// or saved it.
///
/// Column values live in declaration order. Properties that are not
/// declared columns are kept as transient attributes: readable through
/// [`Instance::get`] but never written or serialized.
#[derive(Clone)]
pub struct Instance {
    model: Model,
    values: IndexMap<String, Value>,
    attrs: IndexMap<String, Value>,
    relations: IndexMap<String, Related>,
    persisted: bool,
    connection: Option<Connection>,
    validator: Option<ValidatorFn>,
}

impl Instance {
    pub(crate) fn new<I, K>(model: Model, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut instance = Self::blank(model);
        let mut given: HashMap<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();

        let model = instance.model.clone();
        for column in model.columns() {
            let value = match given.remove(column.property()) {
                Some(v) => v,
                None => column.produce_default().unwrap_or(Value::Null),
            };
            instance.values.insert(column.property().to_string(), value);
        }
        // Leftovers are attributes the model does not declare.
        for (k, v) in given {
            instance.attrs.insert(k, v);
        }
        instance
    }

    /// An instance with every column null, used by the materializer.
    pub(crate) fn blank(model: Model) -> Self {
        let values = model
            .columns()
            .map(|c| (c.property().to_string(), Value::Null))
            .collect();
        Self {
            model,
            values,
            attrs: IndexMap::new(),
            relations: IndexMap::new(),
            persisted: false,
            connection: None,
            validator: None,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Primary-key value, `None` until assigned.
    pub fn id(&self) -> Option<&Value> {
        self.values
            .get(self.model.primary_key().property())
            .filter(|v| !v.is_null())
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Whether association accessors can query lazily.
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Column value or transient attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| self.attrs.get(name))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Set a column value; names that are not columns become transient attributes.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.values.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.attrs.insert(name.to_string(), value);
            }
        }
        self
    }

    /// Column values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Attach a validator to this instance only; it runs before model validators.
    pub fn set_validator(
        &mut self,
        f: impl Fn(&Instance) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Run the instance validator, then the model's validators.
    pub fn validate(&self) -> OrmResult<()> {
        if let Some(validator) = &self.validator {
            validator(self)?;
        }
        for validator in &self.model.hooks().validators {
            validator(self)?;
        }
        Ok(())
    }

    /// Accessor for a `HasOne` association.
    pub fn has_one(&self, name: &str) -> OrmResult<HasOneAccessor<'_>> {
        let association = self.model.association(name)?;
        if association.kind() != AssociationKind::HasOne {
            return Err(OrmError::mapping(format!(
                "association '{name}' on '{}' is not has-one",
                self.model.name()
            )));
        }
        Ok(HasOneAccessor::new(self, association))
    }

    /// Accessor for a `HasMany` association (plain or many-to-many).
    pub fn has_many(&self, name: &str) -> OrmResult<HasManyAccessor<'_>> {
        let association = self.model.association(name)?;
        if association.kind() != AssociationKind::HasMany {
            return Err(OrmError::mapping(format!(
                "association '{name}' on '{}' is not has-many",
                self.model.name()
            )));
        }
        Ok(HasManyAccessor::new(self, association))
    }

    /// Loaded or assigned single related instance.
    pub fn one(&self, name: &str) -> Option<&Instance> {
        match self.relations.get(name) {
            Some(Related::One(Some(item))) => Some(item),
            _ => None,
        }
    }

    /// Loaded or assigned related collection; empty when nothing is held.
    pub fn many(&self, name: &str) -> &[Instance] {
        match self.relations.get(name) {
            Some(Related::Many(items)) => items,
            _ => &[],
        }
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Point a `HasOne` association at `related`, copying its primary key
    /// into the foreign-key column.
    pub fn set_one(&mut self, name: &str, related: &Instance) -> OrmResult<&mut Self> {
        let association = self.model.association(name)?.clone();
        if association.kind() != AssociationKind::HasOne {
            return Err(OrmError::mapping(format!(
                "association '{name}' on '{}' is not has-one",
                self.model.name()
            )));
        }
        if related.model().id() != association.target() {
            return Err(OrmError::mapping(format!(
                "association '{name}' expects a '{}' instance, got '{}'",
                self.model.related(&association).name(),
                related.model().name()
            )));
        }
        let fk = related.id().cloned().unwrap_or(Value::Null);
        self.values.insert(association.foreign_key().to_string(), fk);
        self.relations.insert(
            name.to_string(),
            Related::One(Some(Box::new(related.clone()))),
        );
        Ok(self)
    }

    /// Clear a `HasOne` association and its foreign key.
    pub fn unset_one(&mut self, name: &str) -> OrmResult<&mut Self> {
        let association = self.model.association(name)?.clone();
        if association.kind() != AssociationKind::HasOne {
            return Err(OrmError::mapping(format!(
                "association '{name}' on '{}' is not has-one",
                self.model.name()
            )));
        }
        self.values
            .insert(association.foreign_key().to_string(), Value::Null);
        self.relations.insert(name.to_string(), Related::One(None));
        Ok(self)
    }

    /// Replace the in-memory collection of a `HasMany` association.
    ///
    /// For a many-to-many association the join rows are rewritten on the next
    /// save. For a plain has-many the items get this instance's id as their
    /// foreign key when it is known; saving them stays the caller's job.
    pub fn set_many(&mut self, name: &str, mut items: Vec<Instance>) -> OrmResult<&mut Self> {
        let association = self.model.association(name)?.clone();
        if association.kind() != AssociationKind::HasMany {
            return Err(OrmError::mapping(format!(
                "association '{name}' on '{}' is not has-many",
                self.model.name()
            )));
        }
        if let Some(bad) = items.iter().find(|i| i.model().id() != association.target()) {
            return Err(OrmError::mapping(format!(
                "association '{name}' expects '{}' instances, got '{}'",
                self.model.related(&association).name(),
                bad.model().name()
            )));
        }
        if !association.is_many_to_many() {
            if let Some(id) = self.id().cloned() {
                for item in &mut items {
                    item.set(association.foreign_key(), id.clone());
                }
            }
        }
        self.relations
            .insert(name.to_string(), Related::Many(items));
        Ok(self)
    }

    /// Persist through `conn` (insert or update).
    pub async fn save(&mut self, conn: &Connection) -> OrmResult<()> {
        conn.save(self).await
    }

    /// Delete the row by primary key.
    pub async fn delete(&mut self, conn: &Connection) -> OrmResult<()> {
        conn.delete(self).await
    }

    pub(crate) fn set_value(&mut self, property: &str, value: Value) {
        self.values.insert(property.to_string(), value);
    }

    pub(crate) fn set_related(&mut self, name: String, related: Related) {
        self.relations.insert(name, related);
    }

    pub(crate) fn relations_mut(&mut self) -> impl Iterator<Item = (&String, &mut Related)> {
        self.relations.iter_mut()
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.persisted = false;
    }

    /// Bind a connection to this instance and everything it holds.
    pub(crate) fn attach(&mut self, conn: &Connection) {
        self.connection = Some(conn.clone());
        for (_, related) in self.relations_mut() {
            match related {
                Related::One(Some(item)) => item.attach(conn),
                Related::One(None) => {}
                Related::Many(items) => items.iter_mut().for_each(|i| i.attach(conn)),
            }
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("values", &self.values)
            .field("relations", &self.relations)
            .field("persisted", &self.persisted)
            .finish()
    }
}

/// Only declared columns and held relations are serialized; transient
/// attributes and the connection never are.
impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + self.relations.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        for (name, related) in &self.relations {
            match related {
                Related::One(item) => map.serialize_entry(name, item)?,
                Related::Many(items) => map.serialize_entry(name, items)?,
            }
        }
        map.end()
    }
}
