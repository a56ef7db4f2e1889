use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

/// Declared type of a model column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Real,
    Boolean,
    DateTime,
    Json,
}

/// Zero-argument default value provider.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A column declaration.
///
/// Built with the type constructors and refined with the builder methods:
///
/// ```ignore
/// ModelDef::new()
///     .column("name", Column::string())
///     .column("lastUpdated", Column::datetime().default_with(|| Utc::now().into()))
///     .column("key", Column::integer().primary_key().db_column("my_pk_id"));
/// ```
#[derive(Clone)]
pub struct Column {
    pub(crate) property: String,
    pub(crate) db_column: Option<String>,
    pub(crate) ty: ColumnType,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) foreign_key: bool,
    pub(crate) default: Option<DefaultFn>,
}

impl Column {
    pub fn new(ty: ColumnType) -> Self {
        Self {
            property: String::new(),
            db_column: None,
            ty,
            primary_key: false,
            auto_increment: false,
            foreign_key: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ColumnType::String)
    }

    pub fn integer() -> Self {
        Self::new(ColumnType::Integer)
    }

    pub fn real() -> Self {
        Self::new(ColumnType::Real)
    }

    pub fn boolean() -> Self {
        Self::new(ColumnType::Boolean)
    }

    pub fn datetime() -> Self {
        Self::new(ColumnType::DateTime)
    }

    pub fn json() -> Self {
        Self::new(ColumnType::Json)
    }

    /// Override the database column name (defaults to the snake_case property name).
    pub fn db_column(mut self, name: impl Into<String>) -> Self {
        self.db_column = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Literal default, applied when an instance is created without this property.
    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_with(move || value.clone())
    }

    /// Computed default, evaluated per created instance.
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(f));
        self
    }

    pub(crate) fn foreign_key_of(ty: ColumnType, db_column: String) -> Self {
        let mut col = Self::new(ty).db_column(db_column);
        col.foreign_key = true;
        col
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn name(&self) -> &str {
        self.db_column.as_deref().unwrap_or(&self.property)
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key
    }

    pub fn produce_default(&self) -> Option<Value> {
        self.default.as_ref().map(|f| f())
    }

    /// Convert a raw database value into the declared type.
    ///
    /// Datetimes arrive as epoch milliseconds or text, booleans as integers,
    /// JSON as text. Text that fails to parse as JSON is kept as a string.
    pub fn coerce(&self, value: Value) -> Value {
        match (self.ty, value) {
            (_, Value::Null) => Value::Null,
            (ColumnType::DateTime, Value::Integer(ms)) => match Utc.timestamp_millis_opt(ms) {
                chrono::LocalResult::Single(d) => Value::DateTime(d),
                _ => Value::Integer(ms),
            },
            (ColumnType::DateTime, Value::Real(ms)) => match Utc.timestamp_millis_opt(ms as i64) {
                chrono::LocalResult::Single(d) => Value::DateTime(d),
                _ => Value::Real(ms),
            },
            (ColumnType::DateTime, Value::Text(s)) => match parse_datetime(&s) {
                Some(d) => Value::DateTime(d),
                None => Value::Text(s),
            },
            (ColumnType::Json, Value::Text(s)) => match serde_json::from_str(&s) {
                Ok(j) => Value::Json(j),
                Err(_) => Value::Text(s),
            },
            (ColumnType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (ColumnType::Boolean, Value::Real(f)) => Value::Bool(f != 0.0),
            (ColumnType::Boolean, Value::Text(s)) => Value::Bool(
                !(s.is_empty() || s == "0" || s == "f" || s.eq_ignore_ascii_case("false")),
            ),
            (ColumnType::Integer, Value::Real(f)) if f.fract() == 0.0 => Value::Integer(f as i64),
            (ColumnType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (_, v) => v,
        }
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(d.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

impl From<ColumnType> for Column {
    fn from(ty: ColumnType) -> Self {
        Column::new(ty)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("property", &self.property)
            .field("db_column", &self.name())
            .field("ty", &self.ty)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("foreign_key", &self.foreign_key)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}
