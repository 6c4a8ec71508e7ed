use crate::catalog::types::Value;
use crate::config::ConnectionString;
use crate::driver::{Driver, DriverConnection, StatementHandle};
use crate::error::DriverError;
use compact_str::CompactString;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

const SQLITE_CONSTRAINT_NOTNULL: i32 = 1299;
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Driver backed by an embedded SQLite database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn connect(&self, conn: &ConnectionString) -> Result<Box<dyn DriverConnection>, DriverError> {
        let connection = if conn.dsn == ":memory:" {
            Connection::open_in_memory().map_err(driver_error)?
        } else {
            let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            flags |= if conn.read_only {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            } else {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            };
            Connection::open_with_flags(&conn.dsn, flags).map_err(|err| {
                let mut mapped = driver_error(err);
                if mapped.sqlstate == "HY000" {
                    mapped.sqlstate = "08001".into();
                }
                mapped
            })?
        };
        connection
            .busy_timeout(Duration::from_millis(conn.query_timeout_ms))
            .map_err(driver_error)?;
        let fk = if conn.foreign_keys { "ON" } else { "OFF" };
        connection
            .execute_batch(&format!("PRAGMA foreign_keys = {fk}"))
            .map_err(driver_error)?;
        info!(dsn = %conn.dsn, read_only = conn.read_only, "sqlite connection opened");
        Ok(Box::new(SqliteConnection {
            conn: Some(connection),
        }))
    }
}

struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    fn live(&self) -> Result<&Connection, DriverError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DriverError::new("08003", 0, "connection does not exist"))
    }
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        let conn = self.live()?;
        let affected = conn
            .execute(sql, params_from_iter(params.iter().map(to_sql)))
            .map_err(driver_error)?;
        Ok(affected as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn StatementHandle>, DriverError> {
        let conn = self.live()?;
        let mut stmt = conn.prepare(sql).map_err(driver_error)?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(driver_error)?;
        let mut buffered = VecDeque::new();
        while let Some(row) = rows.next().map_err(driver_error)? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let value: SqlValue = row.get(idx).map_err(driver_error)?;
                values.push(from_sql(value));
            }
            buffered.push_back(values);
        }
        debug!(rows = buffered.len(), "sqlite query buffered");
        Ok(Box::new(SqliteStatement {
            rows: buffered,
            closed: false,
        }))
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.live()?.execute_batch("BEGIN").map_err(driver_error)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        let conn = self.live()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("COMMIT").map_err(driver_error)
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        let conn = self.live()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK").map_err(driver_error)
    }

    fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_autocommit())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(conn, err)| {
            self.conn = Some(conn);
            driver_error(err)
        })
    }
}

/// Rows are read eagerly because a rusqlite statement borrows its
/// connection.
struct SqliteStatement {
    rows: VecDeque<Vec<Value>>,
    closed: bool,
}

impl StatementHandle for SqliteStatement {
    fn fetch(&mut self) -> Result<Option<Vec<Value>>, DriverError> {
        if self.closed {
            return Err(DriverError::new("24000", 0, "cursor is closed"));
        }
        Ok(self.rows.pop_front())
    }

    fn close(mut self: Box<Self>) -> Result<(), DriverError> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.to_string()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(v),
        SqlValue::Real(v) => Value::Real(v),
        SqlValue::Text(v) => Value::Text(CompactString::from(v)),
        SqlValue::Blob(v) => Value::Blob(v),
    }
}

fn sqlstate_for(code: ErrorCode, extended: i32) -> &'static str {
    match code {
        ErrorCode::ConstraintViolation => match extended {
            SQLITE_CONSTRAINT_FOREIGNKEY => "23503",
            SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE => "23505",
            SQLITE_CONSTRAINT_NOTNULL => "23502",
            _ => "23000",
        },
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => "HYT00",
        ErrorCode::CannotOpen | ErrorCode::NotADatabase => "08001",
        ErrorCode::OutOfMemory => "HY001",
        ErrorCode::TooBig => "22001",
        ErrorCode::TypeMismatch => "22018",
        ErrorCode::ReadOnly => "25006",
        ErrorCode::ApiMisuse => "HY010",
        ErrorCode::ParameterOutOfRange => "07009",
        ErrorCode::Unknown => "42000",
        _ => "HY000",
    }
}

fn driver_error(err: rusqlite::Error) -> DriverError {
    match &err {
        rusqlite::Error::SqliteFailure(ffi, message) => DriverError::new(
            sqlstate_for(ffi.code, ffi.extended_code),
            ffi.extended_code,
            message.clone().unwrap_or_else(|| err.to_string()),
        ),
        rusqlite::Error::InvalidParameterCount(..) => DriverError::new("07001", 0, err.to_string()),
        rusqlite::Error::InvalidColumnIndex(_) | rusqlite::Error::InvalidColumnType(..) => {
            DriverError::new("07009", 0, err.to_string())
        }
        _ => DriverError::new("HY000", 0, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDriver;
    use crate::catalog::types::Value;
    use crate::config::{ConnectionType, DalConfig};
    use crate::driver::{Driver, DriverConnection};

    fn open() -> Box<dyn DriverConnection> {
        let cs = DalConfig::in_memory().connection_string(ConnectionType::ReadWrite);
        let mut conn = SqliteDriver.connect(&cs).expect("connect");
        conn.execute(
            "CREATE TABLE p (id INTEGER PRIMARY KEY, name VARCHAR(8))",
            &[],
        )
        .expect("create p");
        conn.execute(
            "CREATE TABLE c (id INTEGER PRIMARY KEY, pid INTEGER REFERENCES p(id))",
            &[],
        )
        .expect("create c");
        conn
    }

    #[test]
    fn constraint_failures_carry_sqlstates() {
        let mut conn = open();
        conn.execute("INSERT INTO p VALUES (?, ?)", &[Value::Integer(1), Value::text("a")])
            .expect("insert");
        let dup = conn
            .execute("INSERT INTO p VALUES (?, ?)", &[Value::Integer(1), Value::text("b")])
            .expect_err("duplicate");
        assert_eq!(dup.sqlstate, "23505");
        let orphan = conn
            .execute("INSERT INTO c VALUES (?, ?)", &[Value::Integer(1), Value::Integer(9)])
            .expect_err("orphan");
        assert_eq!(orphan.sqlstate, "23503");
        let syntax = conn.execute("INSERT INTO", &[]).expect_err("syntax");
        assert_eq!(syntax.sqlstate, "42000");
    }

    #[test]
    fn query_rows_and_transactions() {
        let mut conn = open();
        conn.begin().expect("begin");
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO p VALUES (1, 'a'), (2, NULL)", &[])
            .expect("insert");
        conn.rollback().expect("rollback");
        assert!(!conn.in_transaction());
        conn.execute("INSERT INTO p VALUES (3, 'c')", &[]).expect("insert");
        conn.commit().expect("commit without txn is a no-op");

        let mut stmt = conn
            .query("SELECT id, name FROM p ORDER BY id", &[])
            .expect("query");
        assert_eq!(
            stmt.fetch().expect("row"),
            Some(vec![Value::Integer(3), Value::text("c")])
        );
        assert_eq!(stmt.fetch().expect("end"), None);
        stmt.close().expect("close");
        conn.disconnect().expect("disconnect");
        assert_eq!(conn.execute("SELECT 1", &[]).expect_err("gone").sqlstate, "08003");
    }
}
