//! Error types for persist

use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for persist operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Boxed error reported by a database capability.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for model, query and persistence operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Missing or invalid connect options, unknown driver, bad config file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection closed or unavailable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Instance rejected by a validator before any SQL was issued
    #[error("{0}")]
    Validation(ValidationError),

    /// Unresolvable association/column/alias or invalid builder input
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Statement failed inside the database capability
    #[error("Execution error: {source} (sql: {sql})")]
    Execution {
        sql: String,
        params: Vec<Value>,
        #[source]
        source: BoxError,
    },

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Transaction misuse (nesting, commit after finish)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a mapping error
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a single-message validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::Message(message.into()))
    }

    /// Wrap a database failure together with the statement that caused it.
    pub fn execution(
        sql: impl Into<String>,
        params: &[Value],
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Execution {
            sql: sql.into(),
            params: params.to_vec(),
            source: source.into(),
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a mapping error
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    /// The SQL text attached to an execution error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The message without the kind prefix, for re-wrapping.
    pub(crate) fn into_detail(self) -> String {
        match self {
            Self::Config(m)
            | Self::Connection(m)
            | Self::Mapping(m)
            | Self::Transaction(m)
            | Self::Other(m) => m,
            other => other.to_string(),
        }
    }

    /// The bound values attached to an execution error.
    pub fn params(&self) -> Option<&[Value]> {
        match self {
            Self::Execution { params, .. } => Some(params),
            _ => None,
        }
    }
}

impl From<ValidationError> for OrmError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Why a validator rejected an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One message for the whole instance.
    Message(String),
    /// Per-field messages, in the order the validator reported them.
    Fields(Vec<FieldError>),
}

/// A validation failure on a single property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fields(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Append another field error. A message error becomes the first entry
    /// of the list, with an empty field name.
    pub fn and_field(self, field: impl Into<String>, message: impl Into<String>) -> Self {
        let next = FieldError {
            field: field.into(),
            message: message.into(),
        };
        match self {
            Self::Fields(mut fields) => {
                fields.push(next);
                Self::Fields(fields)
            }
            Self::Message(message) => Self::Fields(vec![
                FieldError {
                    field: String::new(),
                    message,
                },
                next,
            ]),
        }
    }

    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Fields(fields) => fields,
            Self::Message(_) => &[],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::Fields(fields) => {
                f.write_str("Validation failed: ")?;
                for (i, e) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if e.field.is_empty() {
                        f.write_str(&e.message)?;
                    } else {
                        write!(f, "{} {}", e.field, e.message)?;
                    }
                }
                Ok(())
            }
        }
    }
}
