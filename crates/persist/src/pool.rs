//! Connection acquisition.
//!
//! A [`ConnectionFactory`] turns validated [`ConnectOptions`] into
//! [`Connection`]s. With `pooling` set, PostgreSQL sessions come from a
//! `deadpool-postgres` pool sized by `pooling.max`; closing such a
//! connection hands the session back to the pool. When
//! `pooling.idle_timeout_millis` is set, a background task evicts sessions
//! idle for longer than that, keeping at least `pooling.min`.

use crate::config::{ConnectOptions, DatabaseConfig, DriverKind};
use crate::connection::Connection;
use crate::database::PostgresDatabase;
use crate::error::{OrmError, OrmResult};
use crate::trace::SqlTrace;
#[cfg(feature = "pool")]
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
#[cfg(feature = "pool")]
use std::sync::OnceLock;
#[cfg(feature = "pool")]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "pool")]
use std::time::Duration;
#[cfg(feature = "pool")]
use tokio::task::JoinHandle;

const TARGET: &str = "persist.connection";

/// Opens connections for one set of connect options.
pub struct ConnectionFactory {
    options: ConnectOptions,
    #[cfg(feature = "pool")]
    pool: Option<Pool>,
    #[cfg(feature = "pool")]
    reaper: OnceLock<JoinHandle<()>>,
}

impl ConnectionFactory {
    /// Validate `options` and build the pool, if any. No I/O happens here.
    pub fn new(options: ConnectOptions) -> OrmResult<Self> {
        options.validate()?;
        #[cfg(feature = "pool")]
        let pool = match (&options.pooling, options.driver) {
            (Some(pooling), DriverKind::Postgres) => {
                let mgr = Manager::from_config(
                    options.postgres_config()?,
                    tokio_postgres::NoTls,
                    ManagerConfig {
                        recycling_method: RecyclingMethod::Fast,
                    },
                );
                let pool = Pool::builder(mgr)
                    .max_size(pooling.max)
                    .build()
                    .map_err(|e| OrmError::Pool(e.to_string()))?;
                tracing::debug!(target: TARGET, max = pooling.max, min = pooling.min, "pool created");
                Some(pool)
            }
            _ => None,
        };
        Ok(Self {
            options,
            #[cfg(feature = "pool")]
            pool,
            #[cfg(feature = "pool")]
            reaper: OnceLock::new(),
        })
    }

    /// Factory for the environment `name` of a loaded configuration.
    pub fn from_config(config: &DatabaseConfig, name: &str) -> OrmResult<Self> {
        Self::new(config.environment(name)?.clone())
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn trace(&self) -> SqlTrace {
        if self.options.trace {
            SqlTrace::verbose()
        } else {
            SqlTrace::default()
        }
    }

    /// Acquire a connection.
    pub async fn connect(&self) -> OrmResult<Connection> {
        match self.options.driver {
            DriverKind::Sqlite => self.connect_sqlite(),
            DriverKind::Postgres => self.connect_postgres().await,
            DriverKind::Mysql | DriverKind::Oracle => Err(OrmError::config(format!(
                "driver '{}' has no built-in capability; implement Database and use Connection::new",
                self.options.driver.dialect().as_str()
            ))),
        }
    }

    #[cfg(feature = "sqlite")]
    fn connect_sqlite(&self) -> OrmResult<Connection> {
        let filename = self.options.filename.as_deref().unwrap_or(":memory:");
        let db = crate::database::SqliteDatabase::open_target(filename)?;
        Ok(Connection::with_trace(Box::new(db), self.trace()))
    }

    #[cfg(not(feature = "sqlite"))]
    fn connect_sqlite(&self) -> OrmResult<Connection> {
        Err(OrmError::config(
            "sqlite3 support is not compiled in (enable the `sqlite` feature)",
        ))
    }

    async fn connect_postgres(&self) -> OrmResult<Connection> {
        #[cfg(feature = "pool")]
        {
            if let Some(pool) = &self.pool {
                self.start_reaper(pool);
                let object = pool.get().await?;
                let db = PostgresDatabase::from_pooled(object);
                return Ok(Connection::with_trace(Box::new(db), self.trace()));
            }
        }
        let db = PostgresDatabase::connect(&self.options.postgres_config()?).await?;
        Ok(Connection::with_trace(Box::new(db), self.trace()))
    }

    #[cfg(feature = "pool")]
    fn start_reaper(&self, pool: &Pool) {
        let Some(pooling) = &self.options.pooling else {
            return;
        };
        let Some(timeout_ms) = pooling.idle_timeout_millis else {
            return;
        };
        let min = pooling.min;
        let pool = pool.clone();
        self.reaper.get_or_init(|| {
            let timeout = Duration::from_millis(timeout_ms);
            let period = (timeout / 2).max(Duration::from_millis(10));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    if pool.is_closed() {
                        break;
                    }
                    let removed = reap_idle(&pool, timeout, min);
                    if removed > 0 {
                        tracing::debug!(target: TARGET, removed, "evicted idle pooled sessions");
                    }
                }
            })
        });
    }

    /// Number of pooled sessions, idle or in use.
    #[cfg(feature = "pool")]
    pub fn pool_size(&self) -> Option<usize> {
        self.pool.as_ref().map(|p| p.status().size)
    }

    /// Stop the idle reaper and close the pool.
    pub fn shutdown(&self) {
        #[cfg(feature = "pool")]
        {
            if let Some(handle) = self.reaper.get() {
                handle.abort();
            }
            if let Some(pool) = &self.pool {
                pool.close();
            }
        }
    }
}

#[cfg(feature = "pool")]
fn reap_idle(pool: &Pool, timeout: Duration, min: usize) -> usize {
    let removable = AtomicUsize::new(pool.status().size.saturating_sub(min));
    let result = pool.retain(|_, metrics| {
        if metrics.last_used() < timeout {
            return true;
        }
        removable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    });
    result.removed.len()
}

impl Drop for ConnectionFactory {
    fn drop(&mut self) {
        #[cfg(feature = "pool")]
        {
            if let Some(handle) = self.reaper.get() {
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("driver", &self.options.driver)
            .finish()
    }
}
