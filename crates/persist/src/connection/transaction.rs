use super::{Connection, TARGET};
use crate::error::OrmResult;

/// An open transaction on a [`Connection`].
///
/// Statements issued through the connection (or any clone of it) run inside
/// the transaction until [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback). Errors never roll back on their own,
/// and dropping an unfinished handle leaves the transaction open.
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction {
    connection: Connection,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            finished: false,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn commit(mut self) -> OrmResult<()> {
        self.finished = true;
        self.connection.finish(true).await?;
        tracing::debug!(target: TARGET, "transaction committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> OrmResult<()> {
        self.finished = true;
        self.connection.finish(false).await?;
        tracing::debug!(target: TARGET, "transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                target: TARGET,
                "transaction dropped without commit or rollback; it stays open on the connection"
            );
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("finished", &self.finished)
            .finish()
    }
}
