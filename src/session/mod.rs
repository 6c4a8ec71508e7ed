pub mod context;
pub mod diff;
pub mod dirty;

use crate::bind::TableBindSet;
use crate::catalog::types::Value;
use crate::catalog::{ColumnIndex, ConfigVersion, TableIndex};
use crate::config::ConnectionType;
use crate::cursor::Cursor;
use crate::driver::{DriverConnection, ErrorTranslator, StatementGuard, StatementHandle};
use crate::error::{DalError, DalResult, DalResultCode, DriverError};
use crate::query::template::QueryTemplateId;
use crate::query::{CompiledQuery, ddl};
use crate::session::context::WriteExclusionGuard;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use context::DalContext;
pub use dirty::{CfgMode, DirtyOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// One database connection and the configuration operations run over it.
///
/// Writes open a transaction lazily; it stays open until
/// [`SessionManager::commit_transaction`] or
/// [`SessionManager::rollback_transaction`]. Dropping the session rolls back
/// anything pending and disconnects.
pub struct SessionManager {
    ctx: Arc<DalContext>,
    conn_type: ConnectionType,
    cfg_mode: CfgMode,
    conn: Option<Box<dyn DriverConnection>>,
    state: ConnectionState,
    write_count: u64,
    write_guard: Option<WriteExclusionGuard>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("conn_type", &self.conn_type)
            .field("cfg_mode", &self.cfg_mode)
            .field("state", &self.state)
            .field("write_count", &self.write_count)
            .field("holds_write_lock", &self.write_guard.is_some())
            .finish()
    }
}

impl SessionManager {
    pub fn new(ctx: Arc<DalContext>, conn_type: ConnectionType) -> Self {
        Self {
            ctx,
            conn_type,
            cfg_mode: CfgMode::Global,
            conn: None,
            state: ConnectionState::Disconnected,
            write_count: 0,
            write_guard: None,
        }
    }

    /// `new` followed by `connect`.
    pub fn open(ctx: Arc<DalContext>, conn_type: ConnectionType) -> DalResult<Self> {
        let mut session = Self::new(ctx, conn_type);
        session.connect()?;
        Ok(session)
    }

    pub fn context(&self) -> &Arc<DalContext> {
        &self.ctx
    }

    pub fn conn_type(&self) -> ConnectionType {
        self.conn_type
    }

    pub fn cfg_mode(&self) -> &CfgMode {
        &self.cfg_mode
    }

    /// Scope used when writes mark tables dirty.
    pub fn set_cfg_mode(&mut self, mode: CfgMode) {
        self.cfg_mode = mode;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Writes executed since the last commit or rollback.
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn connect(&mut self) -> DalResult<()> {
        if self.conn.is_some() && self.state == ConnectionState::Connected {
            return Ok(());
        }
        let conn_string = self.ctx.config().connection_string(self.conn_type);
        let conn = self
            .ctx
            .driver()
            .connect(&conn_string)
            .map_err(ErrorTranslator::to_dal_error)?;
        self.conn = Some(conn);
        self.state = ConnectionState::Connected;
        self.write_count = 0;
        info!(conn_type = ?self.conn_type, dsn = %conn_string.dsn, "connected");
        Ok(())
    }

    /// Closes the connection. Refused while writes are pending.
    pub fn disconnect(&mut self) -> DalResult<()> {
        if self.write_count > 0 {
            return Err(DalError::NotDisconnected);
        }
        let Some(mut conn) = self.conn.take() else {
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };
        self.state = ConnectionState::Disconnected;
        self.write_guard = None;
        conn.disconnect().map_err(ErrorTranslator::to_dal_error)?;
        info!(conn_type = ?self.conn_type, "disconnected");
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> DalResult<()> {
        let writes = self.write_count;
        let outcome = self.conn.as_mut().map(|conn| conn.commit());
        self.end_transaction();
        match outcome {
            Some(result) => self.track(result)?,
            None => return Err(DalError::ConnNotEstablished),
        }
        info!(writes, "transaction committed");
        Ok(())
    }

    /// Rolls back pending writes. When any were pending the dirty cache is
    /// reloaded, since marks set or cleared in the transaction went with it.
    pub fn rollback_transaction(&mut self) -> DalResult<()> {
        let writes = self.write_count;
        let outcome = self.conn.as_mut().map(|conn| conn.rollback());
        self.end_transaction();
        match outcome {
            Some(result) => self.track(result)?,
            None => return Err(DalError::ConnNotEstablished),
        }
        info!(writes, "transaction rolled back");
        if writes > 0 {
            self.load_dirty_cache()?;
        }
        Ok(())
    }

    fn end_transaction(&mut self) {
        self.write_guard = None;
        self.write_count = 0;
    }

    /// Creates the tables of `versions` and the dirty-tracking tables, then
    /// commits.
    pub fn install_schema(&mut self, versions: &[ConfigVersion]) -> DalResult<()> {
        let statements = ddl::schema_statements(self.ctx.catalog().as_ref(), versions)?;
        for sql in &statements {
            self.exec_sql(sql, &[])?;
        }
        self.commit_transaction()?;
        info!(statements = statements.len(), ?versions, "schema installed");
        Ok(())
    }

    // ---- reads -------------------------------------------------------------

    /// Fetches the first row matching `bind` into its output cells.
    pub fn get_single_record(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &mut TableBindSet,
    ) -> DalResult<()> {
        self.validate(version, table, Some(&*bind))?;
        let query =
            self.compile(QueryTemplateId::GetSingleRecord, Some(&*bind), table, version, None)?;
        let Some(row) = self.fetch_first(&query.sql, &query.params)? else {
            return Err(DalError::RecordNotFound);
        };
        let columns = bind.selected_columns();
        bind.reset_output_buffers();
        bind.fill_from_row(&columns, row)?;
        bind.copy_result_to_app()
    }

    /// Cursor over matching rows in key order. `max_records == 0` means no
    /// limit.
    pub fn get_multiple_records(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        bind: TableBindSet,
    ) -> DalResult<Cursor> {
        self.validate(version, table, Some(&bind))?;
        let query =
            self.compile(QueryTemplateId::GetMultipleRecords, Some(&bind), table, version, None)?;
        self.open_cursor(query, max_records, bind)
    }

    pub fn record_exists(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
    ) -> DalResult<bool> {
        self.validate(version, table, bind)?;
        let query = self.compile(QueryTemplateId::RecordExists, bind, table, version, None)?;
        Ok(self.fetch_first(&query.sql, &query.params)?.is_some())
    }

    pub fn get_record_count(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
    ) -> DalResult<u64> {
        self.validate(version, table, bind)?;
        let query = self.compile(QueryTemplateId::GetRecordCount, bind, table, version, None)?;
        self.fetch_count(&query)
    }

    /// Rows from the match-bound key onwards, including the key itself.
    pub fn get_sibling_begin(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        bind: TableBindSet,
    ) -> DalResult<Cursor> {
        self.validate(version, table, Some(&bind))?;
        let query =
            self.compile(QueryTemplateId::GetSiblingBegin, Some(&bind), table, version, None)?;
        self.open_cursor(query, max_records, bind)
    }

    /// Rows strictly after the match-bound key.
    pub fn get_sibling_records(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        bind: TableBindSet,
    ) -> DalResult<Cursor> {
        self.validate(version, table, Some(&bind))?;
        let query =
            self.compile(QueryTemplateId::GetSiblingRecords, Some(&bind), table, version, None)?;
        self.open_cursor(query, max_records, bind)
    }

    pub fn get_sibling_count_begin(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<u64> {
        self.validate(version, table, Some(bind))?;
        let query =
            self.compile(QueryTemplateId::GetSiblingCountBegin, Some(bind), table, version, None)?;
        self.fetch_count(&query)
    }

    pub fn get_sibling_count(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<u64> {
        self.validate(version, table, Some(bind))?;
        let query =
            self.compile(QueryTemplateId::GetSiblingCount, Some(bind), table, version, None)?;
        self.fetch_count(&query)
    }

    /// Runs caller-written SQL. Parameters are the bound input values
    /// followed by the match values, each in column order. Row-returning
    /// statements yield a cursor whose rows carry the bound output columns
    /// (or every column of the table) in column order.
    pub fn execute_app_query(&mut self, sql: &str, bind: TableBindSet) -> DalResult<Option<Cursor>> {
        if sql.trim().is_empty() {
            return Err(DalError::InvalidParameter("application query is empty".into()));
        }
        let params: Vec<Value> = bind
            .input_columns()
            .chain(bind.match_columns())
            .map(|(_, value)| value.clone())
            .collect();
        if !returns_rows(sql) {
            self.exec_sql(sql, &params)?;
            return Ok(None);
        }
        debug!(sql, params = params.len(), "application query");
        let columns = bind.selected_columns();
        let handle = self.open_sql(sql, &params)?;
        Ok(Some(Cursor::single(handle, Some(bind), columns)))
    }

    pub fn get_next_record(&mut self, cursor: &mut Cursor) -> DalResult<()> {
        let result = cursor.get_next();
        if let Err(err) = &result {
            self.note_failure(err.code());
        }
        result
    }

    /// Releases the cursor's handles and returns its bind sets unless
    /// `delete_bind` is set.
    pub fn close_cursor(&mut self, cursor: Cursor, delete_bind: bool) -> DalResult<Vec<TableBindSet>> {
        let result = cursor.close(delete_bind);
        if let Err(err) = &result {
            self.note_failure(err.code());
        }
        result
    }

    // ---- writes ------------------------------------------------------------

    /// Inserts one row. In CANDIDATE a row recreated after a delete in the
    /// same session carries `u_flag` and its CANDIDATE_DEL shadow is removed.
    pub fn create_record(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<()> {
        self.validate(version, table, Some(bind))?;
        if version != ConfigVersion::Candidate {
            return self
                .run(QueryTemplateId::CreateRecord, Some(bind), table, version, None)
                .map_err(|err| self.disambiguate_create(version, table, bind, err))
                .map(|_| ());
        }

        let mode = self.cfg_mode.clone();
        let recreate = self.is_tbl_dirty(DirtyOp::Delete, table, &mode)? && {
            let key = self.key_match(table, bind)?;
            self.record_exists(ConfigVersion::CandidateDel, table, Some(&key))?
        };
        let template = if recreate {
            QueryTemplateId::CreateRecordWithUFlag
        } else {
            QueryTemplateId::CreateRecordWithCFlag
        };
        if let Err(err) = self.run(template, Some(bind), table, version, None) {
            return Err(self.disambiguate_create(version, table, bind, err));
        }

        if recreate {
            let key = self.key_match(table, bind)?;
            self.run(
                QueryTemplateId::DeleteRecords,
                Some(&key),
                table,
                ConfigVersion::CandidateDel,
                None,
            )?;
            debug!(%table, "recreated row after delete");
            self.set_table_dirty(version, table, DirtyOp::Update, &mode)
        } else {
            self.set_table_dirty(version, table, DirtyOp::Create, &mode)
        }
    }

    /// Updates matching rows with the bound input values. Returns the number
    /// of rows changed.
    pub fn update_records(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<u64> {
        self.validate(version, table, Some(bind))?;
        if version != ConfigVersion::Candidate {
            return self.run(QueryTemplateId::UpdateRecord, Some(bind), table, version, None);
        }
        let updated = self.run(QueryTemplateId::UpdateRecordWithUFlag, Some(bind), table, version, None)?;
        self.mark_dirty(table, DirtyOp::Update)?;
        Ok(updated)
    }

    /// Deletes the rows matching `bind`, or every row when `truncate` is set
    /// or nothing is match-bound. In CANDIDATE the RUNNING originals of the
    /// deleted rows are shadowed into CANDIDATE_DEL first; shadow rows of
    /// earlier deletes stay.
    pub fn delete_records(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
        truncate: bool,
    ) -> DalResult<u64> {
        self.validate(version, table, bind)?;
        let filter = bind
            .map(TableBindSet::match_only)
            .filter(|m| m.match_count() > 0 && !truncate);

        if version == ConfigVersion::Candidate {
            self.mark_dirty(table, DirtyOp::Delete)?;
            // Keyed on the CANDIDATE rows being deleted; the filter sees
            // their CANDIDATE values.
            let shadowed = self.run(
                QueryTemplateId::CopyDeletedToShadow,
                filter.as_ref(),
                table,
                ConfigVersion::CandidateDel,
                Some(ConfigVersion::Running),
            )?;
            debug!(%table, rows = shadowed, "running originals shadowed");
        }

        match &filter {
            Some(m) => self.run(QueryTemplateId::DeleteRecords, Some(m), table, version, None),
            None => self.run(QueryTemplateId::TruncateTable, None, table, version, None),
        }
    }

    /// Replaces the contents of `dest` with those of `src`.
    pub fn copy_entire_records(
        &mut self,
        dest: ConfigVersion,
        src: ConfigVersion,
        table: TableIndex,
    ) -> DalResult<u64> {
        self.validate_pair(dest, src, table, None)?;
        self.run(QueryTemplateId::TruncateTable, None, table, dest, None)?;
        self.run(QueryTemplateId::CopyEntireRecords, None, table, dest, Some(src))
    }

    /// Replaces the rows of `dest` matching `bind` with the matching rows of
    /// `src`.
    pub fn copy_matching_records(
        &mut self,
        dest: ConfigVersion,
        src: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<u64> {
        self.validate_pair(dest, src, table, Some(bind))?;
        let filter = bind.match_only();
        if filter.match_count() == 0 {
            return Err(DalError::InvalidParameter(
                "copy of matching records needs match bindings".into(),
            ));
        }
        self.run(QueryTemplateId::DeleteRecords, Some(&filter), table, dest, None)?;
        self.run(QueryTemplateId::CopyMatchingRecords, Some(&filter), table, dest, Some(src))
    }

    /// Resets `c_flag`/`u_flag` in CANDIDATE, for the matching rows or for
    /// every flagged row.
    pub fn clear_create_update_flags(
        &mut self,
        table: TableIndex,
        bind: Option<&TableBindSet>,
    ) -> DalResult<u64> {
        self.validate(ConfigVersion::Candidate, table, bind)?;
        match bind.map(TableBindSet::match_only).filter(|m| m.match_count() > 0) {
            Some(m) => self.run(
                QueryTemplateId::DirtyFlagReset,
                Some(&m),
                table,
                ConfigVersion::Candidate,
                None,
            ),
            None => self.run(QueryTemplateId::DirtyFlagClear, None, table, ConfigVersion::Candidate, None),
        }
    }

    // ---- helpers -----------------------------------------------------------

    pub(crate) fn validate(
        &self,
        version: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
    ) -> DalResult<()> {
        if !version.is_valid() {
            return Err(DalError::InvalidParameter("invalid config version".into()));
        }
        self.ctx.catalog().check_table(table)?;
        if let Some(actual) = bind.map(TableBindSet::table).filter(|t| *t != table) {
            return Err(DalError::BindTableMismatch {
                expected: table,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn validate_pair(
        &self,
        dest: ConfigVersion,
        src: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
    ) -> DalResult<()> {
        self.validate(dest, table, bind)?;
        if !src.is_valid() {
            return Err(DalError::InvalidParameter("invalid source config version".into()));
        }
        if dest == src {
            return Err(DalError::InvalidParameter(format!(
                "source and destination are both {dest}"
            )));
        }
        Ok(())
    }

    pub(crate) fn compile(
        &self,
        template: QueryTemplateId,
        bind: Option<&TableBindSet>,
        table: TableIndex,
        version_a: ConfigVersion,
        version_b: Option<ConfigVersion>,
    ) -> DalResult<CompiledQuery> {
        self.ctx
            .engine()
            .compile(template, bind, table, version_a, version_b)
    }

    /// Compiles and executes a statement that returns no rows.
    pub(crate) fn run(
        &mut self,
        template: QueryTemplateId,
        bind: Option<&TableBindSet>,
        table: TableIndex,
        version_a: ConfigVersion,
        version_b: Option<ConfigVersion>,
    ) -> DalResult<u64> {
        let query = self.compile(template, bind, table, version_a, version_b)?;
        self.exec_sql(&query.sql, &query.params)
    }

    /// Executes a write inside the session transaction, taking the RUNNING
    /// write lock first when the statement updates a RUNNING table.
    pub(crate) fn exec_sql(&mut self, sql: &str, params: &[Value]) -> DalResult<u64> {
        if self.ctx.config().write_exclusion && self.write_guard.is_none() && updates_running(sql) {
            let timeout = Duration::from_millis(self.ctx.config().write_lock_timeout_ms);
            let guard = self.ctx.write_exclusion().acquire(timeout)?;
            debug!("running write lock acquired");
            self.write_guard = Some(guard);
        }
        let begin = {
            let conn = self.conn_mut()?;
            if conn.in_transaction() { Ok(()) } else { conn.begin() }
        };
        self.track(begin)?;
        let result = self.conn_mut()?.execute(sql, params);
        let affected = self.track(result)?;
        self.write_count += 1;
        Ok(affected)
    }

    fn open_sql(&mut self, sql: &str, params: &[Value]) -> DalResult<Box<dyn StatementHandle>> {
        let result = self.conn_mut()?.query(sql, params);
        self.track(result)
    }

    fn open_cursor(
        &mut self,
        query: CompiledQuery,
        max_records: usize,
        bind: TableBindSet,
    ) -> DalResult<Cursor> {
        let (handle, bind, columns) = self.open_leg(query, max_records, bind)?;
        Ok(Cursor::single(handle, bind, columns))
    }

    pub(crate) fn open_leg(
        &mut self,
        query: CompiledQuery,
        max_records: usize,
        bind: TableBindSet,
    ) -> DalResult<(Box<dyn StatementHandle>, Option<TableBindSet>, Vec<ColumnIndex>)> {
        let sql = with_limit(query.sql, max_records);
        let handle = self.open_sql(&sql, &query.params)?;
        let columns = bind.selected_columns();
        Ok((handle, Some(bind), columns))
    }

    fn fetch_first(&mut self, sql: &str, params: &[Value]) -> DalResult<Option<Vec<Value>>> {
        let mut guard = StatementGuard::new(self.open_sql(sql, params)?);
        let row = guard.fetch();
        let row = self.track(row)?;
        let released = guard.release();
        self.track(released)?;
        Ok(row)
    }

    pub(crate) fn select_rows(&mut self, sql: &str, params: &[Value]) -> DalResult<Vec<Vec<Value>>> {
        let mut guard = StatementGuard::new(self.open_sql(sql, params)?);
        let mut rows = Vec::new();
        loop {
            let next = guard.fetch();
            match self.track(next)? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        let released = guard.release();
        self.track(released)?;
        Ok(rows)
    }

    pub(crate) fn fetch_count(&mut self, query: &CompiledQuery) -> DalResult<u64> {
        let row = self.fetch_first(&query.sql, &query.params)?;
        row.as_ref()
            .and_then(|r| r.first())
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| DalError::Internal(format!("{:?} returned no count", query.template)))
    }

    fn conn_mut(&mut self) -> DalResult<&mut Box<dyn DriverConnection>> {
        if self.state != ConnectionState::Connected {
            return Err(DalError::ConnNotEstablished);
        }
        self.conn.as_mut().ok_or(DalError::ConnNotEstablished)
    }

    /// Translates a driver result, noting connectivity loss.
    fn track<T>(&mut self, result: Result<T, DriverError>) -> DalResult<T> {
        result.map_err(|err| {
            let err = ErrorTranslator::to_dal_error(err);
            self.note_failure(err.code());
            err
        })
    }

    fn note_failure(&mut self, code: DalResultCode) {
        if code.is_connectivity_loss() && self.state == ConnectionState::Connected {
            warn!(%code, "connection lost");
            self.state = ConnectionState::Disconnected;
            self.end_transaction();
        }
    }

    fn mark_dirty(&mut self, table: TableIndex, op: DirtyOp) -> DalResult<()> {
        let mode = self.cfg_mode.clone();
        self.set_table_dirty(ConfigVersion::Candidate, table, op, &mode)
    }

    /// Match bindings on the primary key, valued from the input bindings.
    fn key_match(&self, table: TableIndex, bind: &TableBindSet) -> DalResult<TableBindSet> {
        let catalog = self.ctx.catalog();
        let mut key = TableBindSet::new(Arc::clone(catalog), table)?;
        let pk = catalog.table_pk_cols(table);
        for column in catalog.columns(table).into_iter().take(pk) {
            let Some(descriptor) = bind.descriptor(column) else {
                return Err(DalError::InvalidParameter(format!(
                    "primary key column {column} is not bound"
                )));
            };
            let Some(value) = descriptor.input_value() else {
                return Err(DalError::InvalidParameter(format!(
                    "primary key column {column} has no input value"
                )));
            };
            key.bind_match(column, descriptor.app_type(), descriptor.array_size(), value.clone())?;
        }
        Ok(key)
    }

    /// Narrows a failed insert down with instance and parent lookups.
    fn disambiguate_create(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
        err: DalError,
    ) -> DalError {
        if !matches!(
            err.code(),
            DalResultCode::ParentNotFound
                | DalResultCode::RecordAlreadyExists
                | DalResultCode::DataError
                | DalResultCode::GeneralError
        ) {
            return err;
        }
        match self.instance_exists(version, table, bind) {
            Ok(true) => return DalError::RecordAlreadyExists,
            Ok(false) => {}
            Err(check) => {
                debug!(error = %check, "instance lookup after failed insert");
                return err;
            }
        }
        if self.ctx.catalog().table_parent_index(table).is_none() {
            return err;
        }
        match self.parent_exists(version, table, bind) {
            Ok(false) => DalError::ParentNotFound,
            Ok(true) => err,
            Err(check) => {
                debug!(error = %check, "parent lookup after failed insert");
                err
            }
        }
    }

    fn instance_exists(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<bool> {
        let query = self.compile(QueryTemplateId::InstanceExists, Some(bind), table, version, None)?;
        Ok(self.fetch_first(&query.sql, &query.params)?.is_some())
    }

    fn parent_exists(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        bind: &TableBindSet,
    ) -> DalResult<bool> {
        let query = self.compile(QueryTemplateId::ParentExists, Some(bind), table, version, None)?;
        Ok(self.fetch_first(&query.sql, &query.params)?.is_some())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.write_count > 0 && self.state == ConnectionState::Connected {
            if let Err(err) = self.rollback_transaction() {
                warn!(error = %err, "rollback on drop failed");
            }
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if conn.in_transaction() {
            if let Err(err) = conn.rollback() {
                warn!(sqlstate = %err.sqlstate, error = %err.message, "rollback on drop failed");
            }
        }
        if let Err(err) = conn.disconnect() {
            warn!(sqlstate = %err.sqlstate, error = %err.message, "disconnect on drop failed");
        }
        self.write_guard = None;
    }
}

fn with_limit(sql: String, max_records: usize) -> String {
    if max_records == 0 {
        sql
    } else {
        format!("{sql} LIMIT {max_records}")
    }
}

fn first_words(sql: &str) -> (Option<&str>, Option<&str>) {
    let mut words = sql.split_whitespace();
    (words.next(), words.next())
}

/// `UPDATE ru_...`, the statements serialized by the RUNNING write lock.
fn updates_running(sql: &str) -> bool {
    match first_words(sql) {
        (Some(verb), Some(target)) => {
            verb.eq_ignore_ascii_case("UPDATE") && target.to_ascii_lowercase().starts_with("ru_")
        }
        _ => false,
    }
}

fn returns_rows(sql: &str) -> bool {
    first_words(sql)
        .0
        .is_some_and(|verb| ["SELECT", "WITH", "VALUES"].iter().any(|k| verb.eq_ignore_ascii_case(k)))
}
