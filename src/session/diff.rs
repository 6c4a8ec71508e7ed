//! Version-to-version comparisons and the commit, abort and import merges.
//!
//! Between CANDIDATE and RUNNING the dirty cache decides which statements
//! run at all: a table with no pending operation of a kind skips the query
//! for that kind.

use crate::bind::TableBindSet;
use crate::catalog::{ConfigVersion, TableIndex};
use crate::cursor::Cursor;
use crate::driver::EmptyStatement;
use crate::error::{DalError, DalResult};
use crate::query::template::QueryTemplateId;
use crate::session::SessionManager;
use crate::session::dirty::{CfgMode, DirtyOp};
use tracing::{debug, info};

/// Which merge `copy_modified_records` performs for a version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Commit,
    Abort,
    Import,
    Plain,
}

impl Merge {
    fn of(dest: ConfigVersion, src: ConfigVersion) -> Self {
        match (dest, src) {
            (ConfigVersion::Running, ConfigVersion::Candidate) => Merge::Commit,
            (ConfigVersion::Candidate, ConfigVersion::Running) => Merge::Abort,
            (ConfigVersion::Candidate, ConfigVersion::Import) => Merge::Import,
            _ => Merge::Plain,
        }
    }
}

fn is_edit_pair(v1: ConfigVersion, v2: ConfigVersion) -> bool {
    matches!(
        (v1, v2),
        (ConfigVersion::Candidate, ConfigVersion::Running)
            | (ConfigVersion::Running, ConfigVersion::Candidate)
    )
}

impl SessionManager {
    /// Rows of `v1` whose key is absent from `v2`.
    pub fn get_created_records(
        &mut self,
        v1: ConfigVersion,
        v2: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        bind: TableBindSet,
        mode: &CfgMode,
    ) -> DalResult<Cursor> {
        self.validate_pair(v1, v2, table, Some(&bind))?;
        if is_edit_pair(v1, v2) && !self.is_tbl_dirty(DirtyOp::Create, table, mode)? {
            return Ok(skipped(bind));
        }
        let query = self.compile(QueryTemplateId::DiffCreatedRecords, Some(&bind), table, v1, Some(v2))?;
        let (handle, bind, columns) = self.open_leg(query, max_records, bind)?;
        Ok(Cursor::single(handle, bind, columns))
    }

    /// Rows present in both versions with differing non-key columns. Handle 1
    /// yields the `v1` side into `new`, handle 2 the `v2` side into `old`;
    /// both run in key order so the two legs stay aligned. The match
    /// bindings of `new` filter both sides.
    #[allow(clippy::too_many_arguments)]
    pub fn get_updated_records(
        &mut self,
        v1: ConfigVersion,
        v2: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        new: TableBindSet,
        old: TableBindSet,
        mode: &CfgMode,
    ) -> DalResult<Cursor> {
        self.validate_pair(v1, v2, table, Some(&new))?;
        self.validate(v2, table, Some(&old))?;
        if is_edit_pair(v1, v2) && !self.is_tbl_dirty(DirtyOp::Update, table, mode)? {
            let (new_columns, old_columns) = (new.selected_columns(), old.selected_columns());
            return Ok(Cursor::paired(
                (Box::new(EmptyStatement), Some(new), new_columns),
                (Box::new(EmptyStatement), Some(old), old_columns),
            ));
        }
        let old_filter = with_matches_of(&old, &new)?;
        let first = self.compile(QueryTemplateId::DiffUpdatedRecords, Some(&new), table, v1, Some(v2))?;
        let second =
            self.compile(QueryTemplateId::DiffUpdatedRecords, Some(&old_filter), table, v2, Some(v1))?;
        let first = self.open_leg(first, max_records, new)?;
        let second = self.open_leg(second, max_records, old)?;
        Ok(Cursor::paired(first, second))
    }

    /// Rows of `v2` whose key is absent from `v1`. Between CANDIDATE and
    /// RUNNING the rows come from the CANDIDATE_DEL shadow, so a row deleted
    /// and recreated in the session is not reported.
    pub fn get_deleted_records(
        &mut self,
        v1: ConfigVersion,
        v2: ConfigVersion,
        table: TableIndex,
        max_records: usize,
        bind: TableBindSet,
        mode: &CfgMode,
    ) -> DalResult<Cursor> {
        self.validate_pair(v1, v2, table, Some(&bind))?;
        let query = if (v1, v2) == (ConfigVersion::Candidate, ConfigVersion::Running) {
            if !self.is_tbl_dirty(DirtyOp::Delete, table, mode)? {
                return Ok(skipped(bind));
            }
            self.compile(
                QueryTemplateId::DiffDeletedFromShadow,
                Some(&bind),
                table,
                ConfigVersion::CandidateDel,
                Some(ConfigVersion::Running),
            )?
        } else {
            if is_edit_pair(v1, v2) && !self.is_tbl_dirty(DirtyOp::Delete, table, mode)? {
                return Ok(skipped(bind));
            }
            self.compile(QueryTemplateId::DiffDeletedRecords, Some(&bind), table, v1, Some(v2))?
        };
        let (handle, bind, columns) = self.open_leg(query, max_records, bind)?;
        Ok(Cursor::single(handle, bind, columns))
    }

    /// True when every row (restricted to the match bindings) is identical
    /// in both versions.
    pub fn check_records_identical(
        &mut self,
        v1: ConfigVersion,
        v2: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
        mode: &CfgMode,
    ) -> DalResult<bool> {
        self.validate_pair(v1, v2, table, bind)?;
        if is_edit_pair(v1, v2) {
            let mut dirty = false;
            for op in DirtyOp::ALL {
                if self.is_tbl_dirty(op, table, mode)? {
                    dirty = true;
                    break;
                }
            }
            if !dirty {
                return Ok(true);
            }
        }
        let forward = self.compile(QueryTemplateId::DiffMismatchCount, bind, table, v1, Some(v2))?;
        if self.fetch_count(&forward)? > 0 {
            return Ok(false);
        }
        let backward = self.compile(QueryTemplateId::DiffMismatchCount, bind, table, v2, Some(v1))?;
        Ok(self.fetch_count(&backward)? == 0)
    }

    /// Brings `dest` in line with `src` by deleting, creating and updating
    /// only the rows that differ.
    ///
    /// * RUNNING <- CANDIDATE commits; with a VTN `mode` only the rows
    ///   matching `bind` move.
    /// * CANDIDATE <- RUNNING aborts the session edits.
    /// * CANDIDATE <- IMPORT merges an imported configuration, flagging the
    ///   rows it touches.
    ///
    /// Abort and import only run in global scope.
    pub fn copy_modified_records(
        &mut self,
        dest: ConfigVersion,
        src: ConfigVersion,
        table: TableIndex,
        bind: Option<&TableBindSet>,
        mode: &CfgMode,
    ) -> DalResult<()> {
        self.validate_pair(dest, src, table, bind)?;
        let merge = Merge::of(dest, src);
        if matches!(merge, Merge::Abort | Merge::Import) && mode.vtn_name().is_some() {
            return Err(DalError::InvalidParameter(format!(
                "{merge:?} of table {table} is only supported in global scope"
            )));
        }
        match merge {
            Merge::Commit => self.commit_table(table, bind, mode),
            Merge::Abort => self.abort_table(table, mode),
            Merge::Import => self.import_table(table, mode),
            Merge::Plain => {
                self.run(QueryTemplateId::CopyModifiedDelete, None, table, dest, Some(src))?;
                self.run(QueryTemplateId::CopyModifiedCreate, None, table, dest, Some(src))?;
                if self.has_non_key_columns(table) {
                    self.run(QueryTemplateId::CopyModifiedUpdate, None, table, dest, Some(src))?;
                }
                Ok(())
            }
        }
    }

    fn commit_table(
        &mut self,
        table: TableIndex,
        bind: Option<&TableBindSet>,
        mode: &CfgMode,
    ) -> DalResult<()> {
        let (running, candidate) = (ConfigVersion::Running, ConfigVersion::Candidate);
        let filter = match mode {
            CfgMode::Vtn(vtn) => {
                let Some(filter) = bind.map(TableBindSet::match_only).filter(|m| m.match_count() > 0)
                else {
                    return Err(DalError::InvalidParameter(format!(
                        "commit of vtn {vtn} needs match bindings"
                    )));
                };
                Some(filter)
            }
            CfgMode::Global | CfgMode::Virtual => None,
        };
        let (delete, create, update) = match filter {
            Some(_) => (
                QueryTemplateId::CopyModifiedDeleteVtn,
                QueryTemplateId::CopyModifiedCreateVtn,
                QueryTemplateId::CopyModifiedUpdateVtn,
            ),
            None => (
                QueryTemplateId::CopyModifiedDelete,
                QueryTemplateId::CopyModifiedCreate,
                QueryTemplateId::CopyModifiedUpdate,
            ),
        };
        let filter = filter.as_ref();

        let mut touched = false;
        if self.is_tbl_dirty(DirtyOp::Delete, table, mode)? {
            let n = self.run(delete, filter, table, running, Some(candidate))?;
            debug!(%table, rows = n, "committed deletes");
            touched = true;
        }
        if self.is_tbl_dirty(DirtyOp::Create, table, mode)? {
            let n = self.run(create, filter, table, running, Some(candidate))?;
            debug!(%table, rows = n, "committed creates");
            touched = true;
        }
        if self.is_tbl_dirty(DirtyOp::Update, table, mode)? {
            if self.has_non_key_columns(table) {
                let n = self.run(update, filter, table, running, Some(candidate))?;
                debug!(%table, rows = n, "committed updates");
            }
            touched = true;
        }
        if !touched {
            return Ok(());
        }

        match filter {
            Some(m) => {
                self.run(QueryTemplateId::DeleteRecords, Some(m), table, ConfigVersion::CandidateDel, None)?;
                self.run(QueryTemplateId::DirtyFlagReset, Some(m), table, candidate, None)?;
            }
            None => {
                self.run(QueryTemplateId::TruncateTable, None, table, ConfigVersion::CandidateDel, None)?;
                self.run(QueryTemplateId::DirtyFlagClear, None, table, candidate, None)?;
            }
        }
        info!(%table, ?mode, "table committed to running");
        Ok(())
    }

    fn abort_table(&mut self, table: TableIndex, mode: &CfgMode) -> DalResult<()> {
        let (candidate, running) = (ConfigVersion::Candidate, ConfigVersion::Running);
        let mut touched = false;
        if self.is_tbl_dirty(DirtyOp::Delete, table, mode)? {
            self.run(
                QueryTemplateId::CopyModifiedCreateAbort,
                None,
                table,
                candidate,
                Some(ConfigVersion::CandidateDel),
            )?;
            touched = true;
        }
        if self.is_tbl_dirty(DirtyOp::Create, table, mode)? {
            self.run(QueryTemplateId::CopyModifiedDelete, None, table, candidate, Some(running))?;
            touched = true;
        }
        if self.is_tbl_dirty(DirtyOp::Update, table, mode)? {
            if self.has_non_key_columns(table) {
                self.run(QueryTemplateId::CopyModifiedUpdateAbort, None, table, candidate, Some(running))?;
            }
            touched = true;
        }
        if touched {
            self.run(QueryTemplateId::TruncateTable, None, table, ConfigVersion::CandidateDel, None)?;
            self.run(QueryTemplateId::DirtyFlagClear, None, table, candidate, None)?;
            info!(%table, "candidate edits aborted");
        }
        Ok(())
    }

    fn import_table(&mut self, table: TableIndex, mode: &CfgMode) -> DalResult<()> {
        let (candidate, import) = (ConfigVersion::Candidate, ConfigVersion::Import);
        let created = self.run(QueryTemplateId::CopyModifiedCreateImport, None, table, candidate, Some(import))?;
        if created > 0 {
            self.set_table_dirty(candidate, table, DirtyOp::Create, mode)?;
        }
        let updated = if self.has_non_key_columns(table) {
            self.run(QueryTemplateId::CopyModifiedUpdateImport, None, table, candidate, Some(import))?
        } else {
            0
        };
        if updated > 0 {
            self.set_table_dirty(candidate, table, DirtyOp::Update, mode)?;
        }
        info!(%table, created, updated, "import merged into candidate");
        Ok(())
    }

    fn has_non_key_columns(&self, table: TableIndex) -> bool {
        let catalog = self.context().catalog();
        catalog.table_num_cols(table) > catalog.table_pk_cols(table)
    }
}

/// Cursor for a diff whose query was skipped.
fn skipped(bind: TableBindSet) -> Cursor {
    let columns = bind.selected_columns();
    Cursor::single(Box::new(EmptyStatement), Some(bind), columns)
}

/// `outputs` with any match binding of `filter` it lacks.
fn with_matches_of(outputs: &TableBindSet, filter: &TableBindSet) -> DalResult<TableBindSet> {
    let mut merged = outputs.clone();
    for descriptor in filter.descriptors() {
        let Some(value) = descriptor.match_value() else {
            continue;
        };
        if merged.match_value(descriptor.column()).is_none() {
            merged.bind_match(
                descriptor.column(),
                descriptor.app_type(),
                descriptor.array_size(),
                value.clone(),
            )?;
        }
    }
    Ok(merged)
}
