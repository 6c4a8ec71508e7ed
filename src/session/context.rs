use crate::catalog::{SchemaCatalog, TableIndex, table_name_index};
use crate::config::DalConfig;
use crate::driver::{Driver, SqliteDriver};
use crate::error::{DalError, DalResult};
use crate::query::QueryTemplateEngine;
use crate::session::dirty::{DirtyCache, DirtyOp, DirtySnapshot};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide state shared by every `SessionManager`.
pub struct DalContext {
    catalog: Arc<dyn SchemaCatalog>,
    config: DalConfig,
    engine: QueryTemplateEngine,
    table_names: HashMap<String, TableIndex>,
    driver: Arc<dyn Driver>,
    dirty: Mutex<DirtyCache>,
    write_exclusion: Arc<WriteExclusion>,
}

impl std::fmt::Debug for DalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DalContext")
            .field("config", &self.config)
            .field("num_tables", &self.catalog.num_tables())
            .finish()
    }
}

impl DalContext {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        config: DalConfig,
        driver: Arc<dyn Driver>,
    ) -> DalResult<Arc<Self>> {
        config.validate()?;
        let limit = config.max_cache_limit(catalog.num_tables());
        Ok(Arc::new(Self {
            engine: QueryTemplateEngine::new(Arc::clone(&catalog)),
            table_names: table_name_index(catalog.as_ref()),
            dirty: Mutex::new(DirtyCache::new(limit)),
            write_exclusion: Arc::new(WriteExclusion::default()),
            catalog,
            config,
            driver,
        }))
    }

    pub fn with_sqlite(catalog: Arc<dyn SchemaCatalog>, config: DalConfig) -> DalResult<Arc<Self>> {
        Self::new(catalog, config, Arc::new(SqliteDriver))
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &DalConfig {
        &self.config
    }

    pub fn engine(&self) -> &QueryTemplateEngine {
        &self.engine
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn table_index(&self, name: &str) -> Option<TableIndex> {
        self.table_names.get(name).copied()
    }

    pub fn max_cache_limit(&self) -> usize {
        self.config.max_cache_limit(self.catalog.num_tables())
    }

    /// In-memory dirty marks, one entry per operation.
    pub fn dirty_snapshot(&self) -> Vec<DirtySnapshot> {
        let cache = self.dirty.lock();
        DirtyOp::ALL.into_iter().map(|op| cache.snapshot(op)).collect()
    }

    pub(crate) fn dirty(&self) -> MutexGuard<'_, DirtyCache> {
        self.dirty.lock()
    }

    pub(crate) fn write_exclusion(&self) -> &Arc<WriteExclusion> {
        &self.write_exclusion
    }
}

/// Exclusive lock serializing UPDATEs of RUNNING tables. A session keeps the
/// guard across calls until its next commit or rollback.
#[derive(Default)]
pub(crate) struct WriteExclusion {
    held: Mutex<bool>,
    cv: Condvar,
}

impl WriteExclusion {
    pub(crate) fn acquire(self: &Arc<Self>, timeout: Duration) -> DalResult<WriteExclusionGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while *held {
            if self.cv.wait_until(&mut held, deadline).timed_out() && *held {
                return Err(DalError::WriteLockTimeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        *held = true;
        Ok(WriteExclusionGuard {
            lock: Arc::clone(self),
        })
    }

    pub(crate) fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

pub(crate) struct WriteExclusionGuard {
    lock: Arc<WriteExclusion>,
}

impl Drop for WriteExclusionGuard {
    fn drop(&mut self) {
        *self.lock.held.lock() = false;
        self.lock.cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::{DalContext, WriteExclusion};
    use crate::catalog::schema::{ColumnDef, TableDef};
    use crate::catalog::{StaticCatalog, TableIndex};
    use crate::config::DalConfig;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn second_acquire_times_out_until_release() {
        let lock = Arc::new(WriteExclusion::default());
        let guard = lock.acquire(Duration::from_millis(10)).expect("first");
        assert!(lock.is_held());
        assert!(lock.acquire(Duration::from_millis(10)).is_err());
        drop(guard);
        assert!(!lock.is_held());
        let _again = lock.acquire(Duration::from_millis(10)).expect("after release");
    }

    #[test]
    fn waiter_gets_lock_after_release() {
        let lock = Arc::new(WriteExclusion::default());
        let guard = lock.acquire(Duration::from_millis(10)).expect("first");
        let waiter = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.acquire(Duration::from_secs(5)).is_ok())
        };
        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().expect("join"));
    }

    #[test]
    fn context_indexes_table_names() {
        let catalog = Arc::new(
            StaticCatalog::new(vec![TableDef::new("vtn", 1, vec![ColumnDef::text("vtn_name", 32)])])
                .expect("catalog"),
        );
        let ctx = DalContext::with_sqlite(catalog, DalConfig::in_memory().with_max_sessions(4))
            .expect("context");
        assert_eq!(ctx.table_index("vtn"), Some(TableIndex::new(0)));
        assert_eq!(ctx.table_index("vbr"), None);
        assert_eq!(ctx.max_cache_limit(), 8);
        assert!(DalContext::with_sqlite(
            Arc::new(StaticCatalog::default()),
            DalConfig::in_memory().with_max_sessions(0)
        )
        .is_err());
    }
}
