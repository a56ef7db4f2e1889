use crate::error::{OrmError, OrmResult};
use crate::model::{AssociationKind, Column, Instance, Model};
use crate::value::Value;

#[derive(Debug, Clone)]
enum Assignment {
    Value(String, Value),
    Relate(String, Value),
}

/// Column assignments for `update`, `update_all` and `Model::update`.
///
/// ```ignore
/// let changes = Assignments::new().set("age", 22).relate("company", &acme);
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct Assignments {
    items: Vec<Assignment>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a column by property (or database column) name.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.push(Assignment::Value(name.into(), value.into()));
        self
    }

    /// Point a has-one association at `related` by writing its foreign key.
    pub fn relate(mut self, association: impl Into<String>, related: &Instance) -> Self {
        let id = related.id().cloned().unwrap_or(Value::Null);
        self.items.push(Assignment::Relate(association.into(), id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Resolve names against `model`, coercing each value to its column type.
    pub(crate) fn resolve<'m>(&self, model: &'m Model) -> OrmResult<Vec<(&'m Column, Value)>> {
        self.items
            .iter()
            .map(|item| match item {
                Assignment::Value(name, value) => {
                    let column = model.find_column(name).ok_or_else(|| {
                        OrmError::mapping(format!(
                            "model '{}' has no column '{name}'",
                            model.name()
                        ))
                    })?;
                    Ok((column, column.coerce(value.clone())))
                }
                Assignment::Relate(name, id) => {
                    let association = model.association(name)?;
                    if association.kind() != AssociationKind::HasOne {
                        return Err(OrmError::mapping(format!(
                            "association '{name}' on '{}' is not has-one",
                            model.name()
                        )));
                    }
                    let column = model.column(association.foreign_key()).ok_or_else(|| {
                        OrmError::mapping(format!(
                            "model '{}' has no foreign key column for '{name}'",
                            model.name()
                        ))
                    })?;
                    Ok((column, id.clone()))
                }
            })
            .collect()
    }

    /// Apply the assignments to an in-memory instance.
    pub(crate) fn apply(&self, instance: &mut Instance) -> OrmResult<()> {
        let model = instance.model().clone();
        for (column, value) in self.resolve(&model)? {
            instance.set_value(column.property(), value);
        }
        Ok(())
    }
}
