pub mod sqlite;
pub mod translate;

use crate::catalog::types::Value;
use crate::config::ConnectionString;
use crate::error::DriverError;
use tracing::warn;

pub use sqlite::SqliteDriver;
pub use translate::ErrorTranslator;

/// Entry point of a database driver. One call sets up the environment and
/// the connection.
pub trait Driver: Send + Sync {
    fn connect(&self, conn: &ConnectionString) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One live connection. Statements run inside the transaction opened by
/// `begin` until `commit` or `rollback`.
pub trait DriverConnection: Send {
    /// Runs a statement that returns no rows and reports the affected count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError>;
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn StatementHandle>, DriverError>;
    fn begin(&mut self) -> Result<(), DriverError>;
    fn commit(&mut self) -> Result<(), DriverError>;
    fn rollback(&mut self) -> Result<(), DriverError>;
    fn in_transaction(&self) -> bool;
    fn disconnect(&mut self) -> Result<(), DriverError>;
}

/// Result set of one executed query.
pub trait StatementHandle: Send {
    /// Next row, or `None` once the result set is exhausted.
    fn fetch(&mut self) -> Result<Option<Vec<Value>>, DriverError>;
    fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Result set with no rows, standing in for a query that was skipped.
#[derive(Debug, Default)]
pub(crate) struct EmptyStatement;

impl StatementHandle for EmptyStatement {
    fn fetch(&mut self) -> Result<Option<Vec<Value>>, DriverError> {
        Ok(None)
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Owns a statement handle and closes it when dropped.
pub struct StatementGuard {
    handle: Option<Box<dyn StatementHandle>>,
}

impl StatementGuard {
    pub fn new(handle: Box<dyn StatementHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    pub fn fetch(&mut self) -> Result<Option<Vec<Value>>, DriverError> {
        match self.handle.as_mut() {
            Some(handle) => handle.fetch(),
            None => Err(DriverError::new("24000", 0, "statement handle already released")),
        }
    }

    /// Closes the handle. `Ok(false)` means there was no live handle.
    pub fn release(&mut self) -> Result<bool, DriverError> {
        match self.handle.take() {
            Some(handle) => handle.close().map(|()| true),
            None => Ok(false),
        }
    }
}

impl Drop for StatementGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(sqlstate = %err.sqlstate, error = %err.message, "failed to release statement handle");
        }
    }
}

impl std::fmt::Debug for StatementGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementGuard")
            .field("live", &self.is_live())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::StatementGuard;
    use super::testing::FakeHandle;
    use crate::catalog::types::Value;

    #[test]
    fn guard_closes_on_drop() {
        let (handle, log) = FakeHandle::new(vec![vec![Value::Integer(1)]]);
        {
            let mut guard = StatementGuard::new(Box::new(handle));
            let row = guard.fetch().expect("fetch");
            assert_eq!(row, Some(vec![Value::Integer(1)]));
        }
        assert!(log.lock().closed);
    }

    #[test]
    fn release_is_idempotent() {
        let (handle, _log) = FakeHandle::new(Vec::new());
        let mut guard = StatementGuard::new(Box::new(handle.failing_close("HY000")));
        assert!(guard.release().is_err());
        assert!(!guard.is_live());
        assert!(!guard.release().expect("second release"));
        assert!(guard.fetch().is_err());
    }
}
