use super::ModelId;

/// Direction of an association edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The declaring model holds the foreign key.
    HasOne,
    /// The related model holds the foreign key, or rows live in a join table.
    HasMany,
}

/// A declared relationship from one model to another.
///
/// For `HasOne`, `foreign_key` is a property on the declaring model. For a
/// plain `HasMany` it is a property on the related model. For a `through`
/// association both keys are column names in the join table: `foreign_key`
/// points back at the declaring model and `through_key` at the related one.
#[derive(Debug, Clone)]
pub struct Association {
    pub(crate) name: String,
    pub(crate) kind: AssociationKind,
    pub(crate) target: ModelId,
    pub(crate) foreign_key: String,
    pub(crate) through: Option<String>,
    pub(crate) through_key: Option<String>,
}

impl Association {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn target(&self) -> ModelId {
        self.target
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Join table of a many-to-many association.
    pub fn through(&self) -> Option<&str> {
        self.through.as_deref()
    }

    pub fn through_key(&self) -> Option<&str> {
        self.through_key.as_deref()
    }

    pub fn is_many_to_many(&self) -> bool {
        self.through.is_some()
    }
}

/// Options accepted by `has_many_with` / `has_one_with`.
#[derive(Debug, Clone)]
pub struct AssociationOptions {
    /// Join table for a many-to-many association.
    pub through: Option<String>,
    /// Foreign-key column name (join-table column for `through`).
    pub foreign_key: Option<String>,
    /// Join-table column pointing at the related model.
    pub many_to_many_foreign_key: Option<String>,
    /// Association name (defaults from the related model name).
    pub name: Option<String>,
    /// Register the inverse association on the related model.
    pub create_inverse: bool,
}

impl Default for AssociationOptions {
    fn default() -> Self {
        Self {
            through: None,
            foreign_key: None,
            many_to_many_foreign_key: None,
            name: None,
            create_inverse: true,
        }
    }
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn through(mut self, table: impl Into<String>) -> Self {
        self.through = Some(table.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn many_to_many_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.many_to_many_foreign_key = Some(column.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skip the inverse association (`createHasMany: false`).
    pub fn without_inverse(mut self) -> Self {
        self.create_inverse = false;
        self
    }
}
