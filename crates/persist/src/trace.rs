//! Statement logging via `tracing`.

use crate::value::Value;
use tracing::Level;

/// Target every dispatched statement is logged under.
pub const SQL_TARGET: &str = "persist.sql";

/// A `tracing`-based logger for the SQL a [`Connection`](crate::Connection)
/// dispatches to its database.
///
/// Logging happens before execution, so statements that fail are still
/// visible.
#[derive(Debug, Clone)]
pub struct SqlTrace {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in chars). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Include bound values in the event.
    pub with_params: bool,
}

impl Default for SqlTrace {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(500),
            with_params: false,
        }
    }
}

impl SqlTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `trace: true` connect option: statements at INFO with params.
    pub fn verbose() -> Self {
        Self {
            level: Level::INFO,
            max_sql_length: None,
            with_params: true,
        }
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.chars().count() > max => {
                let cut: String = sql.chars().take(max).collect();
                format!("{cut}...").into()
            }
            _ => sql.into(),
        }
    }

    pub(crate) fn emit(&self, sql: &str, params: &[Value]) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate(sql);
        if self.with_params {
            emit_at_level!(
                self.level,
                target: "persist.sql",
                param_count = params.len(),
                params = ?params,
                sql = %sql,
            );
        } else {
            emit_at_level!(
                self.level,
                target: "persist.sql",
                param_count = params.len(),
                sql = %sql,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_sql() {
        let trace = SqlTrace::new().max_sql_length(6);
        assert_eq!(trace.truncate("SELECT 1 FROM people"), "SELECT...");
        assert_eq!(trace.truncate("SELECT"), "SELECT");
    }

    #[test]
    fn verbose_keeps_full_text() {
        let trace = SqlTrace::verbose();
        assert_eq!(trace.level, Level::INFO);
        assert_eq!(trace.truncate(&"x".repeat(2000)).len(), 2000);
    }
}
