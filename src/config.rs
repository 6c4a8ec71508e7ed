use crate::error::DalError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Connection string handed to a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub dsn: String,
    pub read_only: bool,
    pub query_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl std::fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DSN={};READONLY={};TIMEOUT={};FK={}",
            self.dsn,
            u8::from(self.read_only),
            self.query_timeout_ms,
            u8::from(self.foreign_keys)
        )
    }
}

/// Runtime configuration for the data access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DalConfig {
    pub rw_dsn: String,
    pub ro_dsn: String,
    /// Upper bound on concurrent sessions; sizes the VTN dirty cache.
    pub max_sessions: usize,
    /// Serialize UPDATEs against RUNNING tables across sessions.
    pub write_exclusion: bool,
    pub write_lock_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for DalConfig {
    fn default() -> Self {
        Self {
            rw_dsn: ":memory:".into(),
            ro_dsn: ":memory:".into(),
            max_sessions: 8,
            write_exclusion: true,
            write_lock_timeout_ms: 5_000,
            query_timeout_ms: 30_000,
            foreign_keys: true,
        }
    }
}

impl DalConfig {
    /// Same DSN for read-write and read-only connections.
    pub fn with_dsn(dsn: impl Into<String>) -> Self {
        let dsn = dsn.into();
        Self {
            rw_dsn: dsn.clone(),
            ro_dsn: dsn,
            ..Self::default()
        }
    }

    /// Profile for unit tests: in-memory database, short lock waits.
    pub fn in_memory() -> Self {
        Self {
            write_lock_timeout_ms: 200,
            ..Self::default()
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_write_exclusion(mut self, enabled: bool) -> Self {
        self.write_exclusion = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), DalError> {
        if self.rw_dsn.trim().is_empty() {
            return Err(DalError::InvalidParameter("rw_dsn must not be empty".into()));
        }
        if self.ro_dsn.trim().is_empty() {
            return Err(DalError::InvalidParameter("ro_dsn must not be empty".into()));
        }
        if self.max_sessions == 0 {
            return Err(DalError::InvalidParameter(
                "max_sessions must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn connection_string(&self, conn_type: ConnectionType) -> ConnectionString {
        let (dsn, read_only) = match conn_type {
            ConnectionType::ReadWrite => (&self.rw_dsn, false),
            ConnectionType::ReadOnly => (&self.ro_dsn, true),
        };
        ConnectionString {
            dsn: dsn.clone(),
            read_only,
            query_timeout_ms: self.query_timeout_ms,
            foreign_keys: self.foreign_keys,
        }
    }

    /// Bound on in-memory (table, vtn) dirty entries per operation.
    pub fn max_cache_limit(&self, num_tables: usize) -> usize {
        self.max_sessions
            .saturating_mul(2)
            .saturating_mul(num_tables)
    }
}
