use super::association::Association;
use super::instance::{Instance, Related};
use super::Model;
use crate::error::{OrmError, OrmResult};
use crate::query::{JoinKind, Query};

/// Typed access to a has-one association of an instance.
///
/// `get` only sees data already held (assigned or included); `load` falls
/// back to a query when the instance is bound to a connection.
pub struct HasOneAccessor<'a> {
    owner: &'a Instance,
    association: &'a Association,
}

impl<'a> HasOneAccessor<'a> {
    pub(crate) fn new(owner: &'a Instance, association: &'a Association) -> Self {
        Self { owner, association }
    }

    pub fn association(&self) -> &Association {
        self.association
    }

    pub fn target(&self) -> Model {
        self.owner.model().related(self.association)
    }

    /// Foreign-key value on the owner.
    pub fn key(&self) -> Option<&crate::Value> {
        self.owner
            .get(self.association.foreign_key())
            .filter(|v| !v.is_null())
    }

    pub fn get(&self) -> Option<&'a Instance> {
        self.owner.one(self.association.name())
    }

    /// Held instance, or a lookup by foreign key.
    ///
    /// Returns `None` without querying when the owner has no connection or
    /// the foreign key is null.
    pub async fn load(self) -> OrmResult<Option<Instance>> {
        if let Some(Related::One(held)) = self.owner.related(self.association.name()) {
            return Ok(held.as_deref().cloned());
        }
        let (Some(conn), Some(key)) = (self.owner.connection(), self.key()) else {
            return Ok(None);
        };
        let target = self.target();
        let pk = target.primary_key().property().to_string();
        target.query().where_eq(pk, key.clone()).first(conn).await
    }
}

/// Typed access to a has-many or many-to-many association of an instance.
pub struct HasManyAccessor<'a> {
    owner: &'a Instance,
    association: &'a Association,
}

impl<'a> HasManyAccessor<'a> {
    pub(crate) fn new(owner: &'a Instance, association: &'a Association) -> Self {
        Self { owner, association }
    }

    pub fn association(&self) -> &Association {
        self.association
    }

    pub fn target(&self) -> Model {
        self.owner.model().related(self.association)
    }

    /// Held items; empty when nothing was assigned or included.
    pub fn items(&self) -> &'a [Instance] {
        self.owner.many(self.association.name())
    }

    /// Query over the related rows of this owner, bound to the owner's
    /// connection when it has one.
    pub fn query(&self) -> OrmResult<Query> {
        let id = self.owner.id().cloned().ok_or_else(|| {
            OrmError::mapping(format!(
                "'{}' instance has no primary key value to load '{}'",
                self.owner.model().name(),
                self.association.name()
            ))
        })?;
        let target = self.target();
        let query = match (self.association.through(), self.association.through_key()) {
            (Some(table), Some(through_key)) => {
                let pk = target.primary_key().property().to_string();
                target
                    .query()
                    .join_table(JoinKind::Inner, table, through_key, &pk)
                    .where_sql(
                        format!("{table}.{} = ?", self.association.foreign_key()),
                        vec![id],
                    )
            }
            _ => target
                .query()
                .where_eq(self.association.foreign_key().to_string(), id),
        };
        Ok(match self.owner.connection() {
            Some(conn) => query.using(conn),
            None => query,
        })
    }

    /// Held items, or a query when the owner is bound to a connection.
    ///
    /// An owner without a connection or without a primary key yields an
    /// empty list.
    pub async fn load(self) -> OrmResult<Vec<Instance>> {
        if let Some(Related::Many(items)) = self.owner.related(self.association.name()) {
            return Ok(items.clone());
        }
        if self.owner.connection().is_none() || self.owner.id().is_none() {
            return Ok(Vec::new());
        }
        self.query()?.load().await
    }
}
