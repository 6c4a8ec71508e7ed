use crate::catalog::{ColumnIndex, TableIndex};
use crate::query::template::QueryTemplateId;
use thiserror::Error;

/// Result codes returned by every DAL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DalResultCode {
    Success,
    GeneralError,
    DataError,
    ConnNotEstablished,
    ConnNotAvailable,
    ConnTimeOut,
    QueryTimeOut,
    MemoryError,
    InvalidCursor,
    InvalidConnHandle,
    RecordNotFound,
    RecordNoMore,
    RecordAlreadyExists,
    ParentNotFound,
    TxnError,
    NotDisconnected,
    InternalError,
    InvalidParameter,
}

impl DalResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DalResultCode::Success => "success",
            DalResultCode::GeneralError => "general_error",
            DalResultCode::DataError => "data_error",
            DalResultCode::ConnNotEstablished => "conn_not_established",
            DalResultCode::ConnNotAvailable => "conn_not_available",
            DalResultCode::ConnTimeOut => "conn_timeout",
            DalResultCode::QueryTimeOut => "query_timeout",
            DalResultCode::MemoryError => "memory_error",
            DalResultCode::InvalidCursor => "invalid_cursor",
            DalResultCode::InvalidConnHandle => "invalid_conn_handle",
            DalResultCode::RecordNotFound => "record_not_found",
            DalResultCode::RecordNoMore => "record_no_more",
            DalResultCode::RecordAlreadyExists => "record_already_exists",
            DalResultCode::ParentNotFound => "parent_not_found",
            DalResultCode::TxnError => "txn_error",
            DalResultCode::NotDisconnected => "not_disconnected",
            DalResultCode::InternalError => "internal_error",
            DalResultCode::InvalidParameter => "invalid_parameter",
        }
    }

    /// Codes after which the connection can no longer be used.
    pub fn is_connectivity_loss(self) -> bool {
        matches!(
            self,
            DalResultCode::ConnNotEstablished
                | DalResultCode::ConnNotAvailable
                | DalResultCode::ConnTimeOut
        )
    }
}

impl std::fmt::Display for DalResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a driver call, before translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver error [{sqlstate}] (native {native_code}): {message}")]
pub struct DriverError {
    pub sqlstate: String,
    pub native_code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(sqlstate: impl Into<String>, native_code: i32, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            native_code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DalError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("table index {0} out of range")]
    TableOutOfRange(TableIndex),
    #[error("column {column} out of range for table {table}")]
    ColumnOutOfRange {
        table: TableIndex,
        column: ColumnIndex,
    },
    #[error("column {column} of table {table} is already bound for {class}")]
    AlreadyBound {
        table: TableIndex,
        column: ColumnIndex,
        class: &'static str,
    },
    #[error("bind set belongs to table {actual}, operation targets table {expected}")]
    BindTableMismatch {
        expected: TableIndex,
        actual: TableIndex,
    },
    #[error("query generation failed for {template:?}: {reason}")]
    QueryBuild {
        template: QueryTemplateId,
        reason: String,
    },
    #[error("{code} from driver: {source}")]
    Driver {
        code: DalResultCode,
        #[source]
        source: DriverError,
    },
    #[error("record not found")]
    RecordNotFound,
    #[error("no more records")]
    RecordNoMore,
    #[error("record already exists")]
    RecordAlreadyExists,
    #[error("parent record not found")]
    ParentNotFound,
    #[error("connection not established")]
    ConnNotEstablished,
    #[error("invalid connection handle")]
    InvalidConnHandle,
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("connection has pending writes and cannot be disconnected")]
    NotDisconnected,
    #[error("write exclusion lock not acquired within {timeout_ms}ms")]
    WriteLockTimeout { timeout_ms: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl DalError {
    pub fn code(&self) -> DalResultCode {
        match self {
            DalError::InvalidParameter(_)
            | DalError::TableOutOfRange(_)
            | DalError::ColumnOutOfRange { .. }
            | DalError::AlreadyBound { .. }
            | DalError::BindTableMismatch { .. } => DalResultCode::InvalidParameter,
            DalError::QueryBuild { .. } => DalResultCode::InternalError,
            DalError::Driver { code, .. } => *code,
            DalError::RecordNotFound => DalResultCode::RecordNotFound,
            DalError::RecordNoMore => DalResultCode::RecordNoMore,
            DalError::RecordAlreadyExists => DalResultCode::RecordAlreadyExists,
            DalError::ParentNotFound => DalResultCode::ParentNotFound,
            DalError::ConnNotEstablished => DalResultCode::ConnNotEstablished,
            DalError::InvalidConnHandle => DalResultCode::InvalidConnHandle,
            DalError::InvalidCursor(_) => DalResultCode::InvalidCursor,
            DalError::NotDisconnected => DalResultCode::NotDisconnected,
            DalError::WriteLockTimeout { .. } => DalResultCode::ConnTimeOut,
            DalError::Internal(_) => DalResultCode::InternalError,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn query_build(template: QueryTemplateId, reason: impl Into<String>) -> Self {
        DalError::QueryBuild {
            template,
            reason: reason.into(),
        }
    }
}

pub type DalResult<T> = Result<T, DalError>;

#[cfg(test)]
mod tests {
    use super::{DalError, DalResultCode, DriverError};
    use crate::catalog::TableIndex;

    #[test]
    fn result_code_strings_are_stable() {
        assert_eq!(DalResultCode::ParentNotFound.as_str(), "parent_not_found");
        assert_eq!(DalResultCode::RecordNoMore.as_str(), "record_no_more");
        assert_eq!(DalResultCode::ConnTimeOut.to_string(), "conn_timeout");
    }

    #[test]
    fn driver_errors_keep_translated_code() {
        let err = DalError::Driver {
            code: DalResultCode::QueryTimeOut,
            source: DriverError::new("HYT00", 5, "busy"),
        };
        assert_eq!(err.code(), DalResultCode::QueryTimeOut);
        assert_eq!(err.code_str(), "query_timeout");
    }

    #[test]
    fn validation_errors_map_to_invalid_parameter() {
        let err = DalError::TableOutOfRange(TableIndex::new(42));
        assert_eq!(err.code(), DalResultCode::InvalidParameter);
        assert_eq!(err.to_string(), "table index 42 out of range");
    }

    #[test]
    fn connectivity_loss_class() {
        assert!(DalResultCode::ConnNotAvailable.is_connectivity_loss());
        assert!(DalResultCode::ConnTimeOut.is_connectivity_loss());
        assert!(!DalResultCode::QueryTimeOut.is_connectivity_loss());
        assert!(!DalResultCode::DataError.is_connectivity_loss());
    }
}
