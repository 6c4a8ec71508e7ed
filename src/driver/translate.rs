use crate::error::{DalError, DalResultCode, DriverError};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::warn;

/// SQLSTATE -> result code, built once per process.
static SQLSTATE_MAP: Lazy<HashMap<&'static str, DalResultCode>> = Lazy::new(|| {
    use DalResultCode::*;
    let entries: &[(&str, DalResultCode)] = &[
        // connection
        ("08001", ConnNotEstablished),
        ("08004", ConnNotEstablished),
        ("IM002", ConnNotEstablished),
        ("08002", ConnNotAvailable),
        ("08003", ConnNotAvailable),
        ("08S01", ConnNotAvailable),
        ("HYT01", ConnTimeOut),
        ("HYT00", QueryTimeOut),
        // data
        ("01004", DataError),
        ("22001", DataError),
        ("22002", DataError),
        ("22003", DataError),
        ("22007", DataError),
        ("22012", DataError),
        ("22018", DataError),
        ("22P02", DataError),
        ("23000", DataError),
        ("23502", DataError),
        // integrity
        ("23503", ParentNotFound),
        ("23505", RecordAlreadyExists),
        // cursor and transaction state
        ("24000", InvalidCursor),
        ("08007", TxnError),
        ("25000", TxnError),
        ("25001", TxnError),
        ("25006", TxnError),
        ("25P01", TxnError),
        ("40001", TxnError),
        ("40003", TxnError),
        // generated-SQL bugs
        ("07001", InternalError),
        ("07002", InternalError),
        ("07009", InternalError),
        ("42000", InternalError),
        ("42601", InternalError),
        ("42703", InternalError),
        ("42P01", InternalError),
        ("42S02", InternalError),
        ("42S22", InternalError),
        ("HY009", InternalError),
        ("HY010", InternalError),
        ("HY024", InternalError),
        ("HY092", InternalError),
        // memory
        ("HY001", MemoryError),
        ("HY013", MemoryError),
        ("HY014", MemoryError),
        ("HY000", GeneralError),
    ];
    entries.iter().copied().collect()
});

/// Maps driver status codes onto `DalResultCode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslator;

impl ErrorTranslator {
    pub fn translate(sqlstate: &str) -> DalResultCode {
        if let Some(code) = SQLSTATE_MAP.get(sqlstate) {
            return *code;
        }
        // Unlisted states fall back to their class.
        match sqlstate.get(..2) {
            Some("00") => DalResultCode::Success,
            Some("08") => DalResultCode::ConnNotAvailable,
            Some("22") => DalResultCode::DataError,
            Some("23") => DalResultCode::DataError,
            Some("25") | Some("40") => DalResultCode::TxnError,
            Some("07") | Some("42") => DalResultCode::InternalError,
            _ => DalResultCode::GeneralError,
        }
    }

    /// Wraps a driver failure with its translated code.
    pub fn to_dal_error(err: DriverError) -> DalError {
        let code = Self::translate(&err.sqlstate);
        warn!(
            sqlstate = %err.sqlstate,
            native_code = err.native_code,
            code = code.as_str(),
            error = %err.message,
            "driver call failed"
        );
        DalError::Driver { code, source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorTranslator;
    use crate::error::{DalResultCode, DriverError};

    #[test]
    fn integrity_violations_have_dedicated_codes() {
        assert_eq!(ErrorTranslator::translate("23503"), DalResultCode::ParentNotFound);
        assert_eq!(ErrorTranslator::translate("23505"), DalResultCode::RecordAlreadyExists);
        assert_eq!(ErrorTranslator::translate("23000"), DalResultCode::DataError);
    }

    #[test]
    fn syntax_errors_are_internal() {
        assert_eq!(ErrorTranslator::translate("42000"), DalResultCode::InternalError);
        assert_eq!(ErrorTranslator::translate("42S99"), DalResultCode::InternalError);
        assert_eq!(ErrorTranslator::translate("HY010"), DalResultCode::InternalError);
    }

    #[test]
    fn connectivity_states() {
        assert_eq!(ErrorTranslator::translate("08001"), DalResultCode::ConnNotEstablished);
        assert_eq!(ErrorTranslator::translate("08S01"), DalResultCode::ConnNotAvailable);
        assert_eq!(ErrorTranslator::translate("HYT01"), DalResultCode::ConnTimeOut);
        assert_eq!(ErrorTranslator::translate("HYT00"), DalResultCode::QueryTimeOut);
        assert!(ErrorTranslator::translate("08999").is_connectivity_loss());
    }

    #[test]
    fn unknown_states_are_general_errors() {
        assert_eq!(ErrorTranslator::translate("ZZ999"), DalResultCode::GeneralError);
        assert_eq!(ErrorTranslator::translate(""), DalResultCode::GeneralError);
    }

    #[test]
    fn to_dal_error_keeps_driver_detail() {
        let err = ErrorTranslator::to_dal_error(DriverError::new("23505", 2067, "UNIQUE failed"));
        assert_eq!(err.code(), DalResultCode::RecordAlreadyExists);
        assert!(err.to_string().contains("UNIQUE failed"));
    }
}
