use super::tree::{Include, SqlTree};
use crate::error::{OrmError, OrmResult};
use crate::model::{AssociationKind, Instance, Model, Related};
use crate::value::{Row, Value};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

impl SqlTree {
    /// Turn flat result rows into instances with nested includes.
    ///
    /// Rows are grouped by the root primary key, so a root joined to several
    /// related rows yields one instance. Root order follows first appearance
    /// in the result, included items keep their row order and rows whose
    /// included primary key is null contribute nothing to that include.
    pub fn materialize(&self, rows: &[Row]) -> OrmResult<Vec<Instance>> {
        let Some(pk_alias) = self.primary_key_alias.as_deref() else {
            return rows
                .iter()
                .map(|row| {
                    let mut root = self.build_instance(&self.model, &self.table_alias, row)?;
                    self.run_on_load(&mut root);
                    Ok(root)
                })
                .collect();
        };

        let groups = group_rows(rows.iter(), pk_alias)?;
        let mut out = Vec::with_capacity(groups.len());
        for (_, group) in groups {
            let mut root = self.build_instance(&self.model, &self.table_alias, group[0])?;
            for include in &self.includes {
                self.attach_include(&mut root, &group, include)?;
            }
            self.run_on_load(&mut root);
            out.push(root);
        }
        Ok(out)
    }

    /// The root's `on_load` hook sees its includes already attached.
    fn run_on_load(&self, root: &mut Instance) {
        if let Some(on_load) = &self.model.hooks().on_load {
            on_load(root);
        }
    }

    fn build_instance(&self, model: &Model, table_alias: &str, row: &Row) -> OrmResult<Instance> {
        let mut instance = Instance::blank(model.clone());
        for (name, value) in row.iter() {
            let def = self.column_by_alias(name).ok_or_else(|| {
                OrmError::mapping(format!("result column '{name}' is not part of the query"))
            })?;
            if def.table_alias != table_alias {
                continue;
            }
            let value = match model.column(&def.property) {
                Some(column) => column.coerce(value.clone()),
                None => value.clone(),
            };
            instance.set_value(&def.property, value);
        }
        instance.mark_persisted();
        Ok(instance)
    }

    fn attach_include(
        &self,
        root: &mut Instance,
        rows: &[&Row],
        include: &Include,
    ) -> OrmResult<()> {
        let groups = group_rows(rows.iter().copied(), &include.primary_key_alias)?;
        let mut items = Vec::with_capacity(groups.len());
        for (key, group) in groups {
            if key == GroupKey::Null {
                continue;
            }
            items.push(self.build_instance(&include.model, &include.table_alias, group[0])?);
        }
        let related = match include.kind {
            AssociationKind::HasOne => Related::One(items.into_iter().next().map(Box::new)),
            AssociationKind::HasMany => Related::Many(items),
        };
        root.set_related(include.name.clone(), related);
        Ok(())
    }
}

/// Hashable identity of a key column value.
///
/// Reals are keyed by their bit pattern after folding `-0.0` into `0.0` and
/// every NaN into one canonical NaN.
#[derive(Debug, PartialEq, Eq, Hash)]
enum GroupKey {
    Null,
    Bool(bool),
    Integer(i64),
    Real(u64),
    Text(String),
    DateTime(DateTime<Utc>),
    Json(String),
}

impl From<&Value> for GroupKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => GroupKey::Null,
            Value::Bool(b) => GroupKey::Bool(*b),
            Value::Integer(i) => GroupKey::Integer(*i),
            Value::Real(f) if f.is_nan() => GroupKey::Real(f64::NAN.to_bits()),
            Value::Real(f) if *f == 0.0 => GroupKey::Real(0.0f64.to_bits()),
            Value::Real(f) => GroupKey::Real(f.to_bits()),
            Value::Text(s) => GroupKey::Text(s.clone()),
            Value::DateTime(d) => GroupKey::DateTime(*d),
            Value::Json(j) => GroupKey::Json(j.to_string()),
        }
    }
}

fn group_rows<'r>(
    rows: impl Iterator<Item = &'r Row>,
    alias: &str,
) -> OrmResult<IndexMap<GroupKey, Vec<&'r Row>>> {
    let mut groups: IndexMap<GroupKey, Vec<&Row>> = IndexMap::new();
    for row in rows {
        let key = row.get(alias).ok_or_else(|| {
            OrmError::mapping(format!("result rows have no column '{alias}'"))
        })?;
        groups.entry(GroupKey::from(key)).or_default().push(row);
    }
    Ok(groups)
}
