use crate::catalog::types::Value;
use crate::catalog::{ConfigVersion, TableIndex};
use crate::error::{DalError, DalResult};
use crate::query::ddl::{CFG_TBL_DIRTY, VTN_CFG_TBL_DIRTY};
use crate::session::SessionManager;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirtyOp {
    Create,
    Update,
    Delete,
}

impl DirtyOp {
    pub const ALL: [DirtyOp; 3] = [DirtyOp::Create, DirtyOp::Update, DirtyOp::Delete];

    /// Value stored in the `operation` column.
    pub fn as_i64(self) -> i64 {
        match self {
            DirtyOp::Create => 0,
            DirtyOp::Update => 1,
            DirtyOp::Delete => 2,
        }
    }

    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(DirtyOp::Create),
            1 => Some(DirtyOp::Update),
            2 => Some(DirtyOp::Delete),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        match self {
            DirtyOp::Create => 0,
            DirtyOp::Update => 1,
            DirtyOp::Delete => 2,
        }
    }
}

/// Scope a commit, diff or dirty mark applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CfgMode {
    #[default]
    Global,
    Virtual,
    Vtn(CompactString),
}

impl CfgMode {
    pub fn vtn(name: &str) -> Self {
        CfgMode::Vtn(CompactString::from(name))
    }

    pub fn vtn_name(&self) -> Option<&str> {
        match self {
            CfgMode::Vtn(name) => Some(name.as_str()),
            CfgMode::Global | CfgMode::Virtual => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VtnMark {
    Cached,
    AlreadyCached,
    Overflow,
}

/// In-memory dirty sets. The global sets are complete; a VTN set stops
/// growing at `limit` and from then on the DB table is the only record of
/// the entries that did not fit.
#[derive(Debug, Default)]
pub(crate) struct DirtyCache {
    global: [HashSet<TableIndex>; 3],
    vtn: [HashSet<(TableIndex, CompactString)>; 3],
    exceeded: [bool; 3],
    limit: usize,
}

impl DirtyCache {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn mark_global(&mut self, op: DirtyOp, table: TableIndex) -> bool {
        self.global[op.slot()].insert(table)
    }

    pub(crate) fn mark_vtn(&mut self, op: DirtyOp, table: TableIndex, vtn: &str) -> VtnMark {
        let set = &mut self.vtn[op.slot()];
        let key = (table, CompactString::from(vtn));
        if set.contains(&key) {
            return VtnMark::AlreadyCached;
        }
        if set.len() >= self.limit {
            self.exceeded[op.slot()] = true;
            return VtnMark::Overflow;
        }
        set.insert(key);
        VtnMark::Cached
    }

    pub(crate) fn is_global(&self, op: DirtyOp, table: TableIndex) -> bool {
        self.global[op.slot()].contains(&table)
    }

    /// `vtn == None` matches any VTN.
    pub(crate) fn is_vtn_cached(&self, op: DirtyOp, table: TableIndex, vtn: Option<&str>) -> bool {
        let set = &self.vtn[op.slot()];
        match vtn {
            Some(name) => set.contains(&(table, CompactString::from(name))),
            None => set.iter().any(|(t, _)| *t == table),
        }
    }

    pub(crate) fn exceeded(&self, op: DirtyOp) -> bool {
        self.exceeded[op.slot()]
    }

    pub(crate) fn vtn_len(&self, op: DirtyOp) -> usize {
        self.vtn[op.slot()].len()
    }

    pub(crate) fn clear_global(&mut self, op: DirtyOp, table: TableIndex) {
        self.global[op.slot()].remove(&table);
        self.vtn[op.slot()].retain(|(t, _)| *t != table);
    }

    pub(crate) fn clear_vtn(&mut self, op: DirtyOp, table: TableIndex, vtn: &str) {
        self.vtn[op.slot()].remove(&(table, CompactString::from(vtn)));
    }

    /// Replaces the VTN set of `op` with `entries`, marking overflow when
    /// they do not all fit.
    pub(crate) fn reload_vtn(&mut self, op: DirtyOp, entries: Vec<(TableIndex, CompactString)>) {
        let set = &mut self.vtn[op.slot()];
        set.clear();
        let mut exceeded = false;
        for entry in entries {
            if set.len() >= self.limit {
                exceeded = true;
                break;
            }
            set.insert(entry);
        }
        self.exceeded[op.slot()] = exceeded;
    }

    pub(crate) fn reset(&mut self) {
        let limit = self.limit;
        *self = Self::new(limit);
    }
}

/// Point-in-time copy of the in-memory marks for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtySnapshot {
    pub op: DirtyOp,
    pub global: Vec<TableIndex>,
    pub vtn: Vec<(TableIndex, CompactString)>,
    pub exceeded: bool,
}

impl DirtyCache {
    pub(crate) fn snapshot(&self, op: DirtyOp) -> DirtySnapshot {
        let mut global: Vec<_> = self.global[op.slot()].iter().copied().collect();
        global.sort();
        let mut vtn: Vec<_> = self.vtn[op.slot()].iter().cloned().collect();
        vtn.sort();
        DirtySnapshot {
            op,
            global,
            vtn,
            exceeded: self.exceeded[op.slot()],
        }
    }
}

impl SessionManager {
    /// Records that `table` has a pending `op` in CANDIDATE under `mode`.
    /// Writes to other versions are not tracked.
    pub fn set_table_dirty(
        &mut self,
        version: ConfigVersion,
        table: TableIndex,
        op: DirtyOp,
        mode: &CfgMode,
    ) -> DalResult<()> {
        self.validate(version, table, None)?;
        if version != ConfigVersion::Candidate {
            return Ok(());
        }
        match mode {
            CfgMode::Global | CfgMode::Virtual => {
                let inserted = self.ctx.dirty().mark_global(op, table);
                if inserted {
                    self.persist_global_dirty(op, table)?;
                }
            }
            CfgMode::Vtn(vtn) => {
                let mark = self.ctx.dirty().mark_vtn(op, table, vtn);
                match mark {
                    VtnMark::AlreadyCached => {}
                    VtnMark::Cached => self.persist_vtn_dirty(op, table, vtn)?,
                    VtnMark::Overflow => {
                        warn!(
                            ?op,
                            %table,
                            vtn = %vtn,
                            limit = self.ctx.max_cache_limit(),
                            "vtn dirty cache full, tracking in db only"
                        );
                        self.persist_vtn_dirty(op, table, vtn)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Two-tier lookup. Global and virtual scopes see VTN-scoped marks;
    /// a VTN scope sees its own marks and global ones.
    pub fn is_tbl_dirty(&mut self, op: DirtyOp, table: TableIndex, mode: &CfgMode) -> DalResult<bool> {
        self.ctx.catalog().check_table(table)?;
        let (global, cached, exceeded) = {
            let cache = self.ctx.dirty();
            (
                cache.is_global(op, table),
                cache.is_vtn_cached(op, table, mode.vtn_name()),
                cache.exceeded(op),
            )
        };
        match mode {
            CfgMode::Global | CfgMode::Virtual => {
                if global || cached {
                    return Ok(true);
                }
                if exceeded {
                    return self.vtn_dirty_in_db(op, table, None);
                }
                Ok(false)
            }
            CfgMode::Vtn(vtn) => {
                if cached {
                    return Ok(true);
                }
                if exceeded && self.vtn_dirty_in_db(op, table, Some(vtn.as_str()))? {
                    return Ok(true);
                }
                Ok(global)
            }
        }
    }

    /// Forgets the `op` mark of `table` in `mode`. A global clear also drops
    /// every VTN mark of the table. The in-memory cache changes only after
    /// the DB rows are gone; a later rollback reloads it.
    pub fn clear_table_dirty(&mut self, op: DirtyOp, table: TableIndex, mode: &CfgMode) -> DalResult<()> {
        self.ctx.catalog().check_table(table)?;
        match mode {
            CfgMode::Global | CfgMode::Virtual => {
                let name = self.table_name(table)?;
                self.exec_sql(
                    &format!("DELETE FROM {CFG_TBL_DIRTY} WHERE tbl_name = ? AND operation = ?"),
                    &[Value::text(&name), Value::Integer(op.as_i64())],
                )?;
                self.exec_sql(
                    &format!("DELETE FROM {VTN_CFG_TBL_DIRTY} WHERE tbl_index = ? AND operation = ?"),
                    &[Value::Integer(table.as_i64()), Value::Integer(op.as_i64())],
                )?;
                self.ctx.dirty().clear_global(op, table);
            }
            CfgMode::Vtn(vtn) => {
                self.exec_sql(
                    &format!(
                        "DELETE FROM {VTN_CFG_TBL_DIRTY} \
                         WHERE tbl_index = ? AND operation = ? AND vtn_name = ?"
                    ),
                    &[
                        Value::Integer(table.as_i64()),
                        Value::Integer(op.as_i64()),
                        Value::text(vtn),
                    ],
                )?;
                self.ctx.dirty().clear_vtn(op, table, vtn);
            }
        }
        if self.ctx.dirty().exceeded(op) {
            self.refill_vtn_cache(op)?;
        }
        Ok(())
    }

    /// Drops every in-memory mark. The DB tables are left untouched.
    pub fn clear_dirty_tbl_cache(&self) {
        self.ctx.dirty().reset();
        debug!("dirty table cache cleared");
    }

    /// Rebuilds the in-memory cache from the DB tables.
    pub fn load_dirty_cache(&mut self) -> DalResult<()> {
        let global_rows = self.select_rows(
            &format!("SELECT tbl_name, operation FROM {CFG_TBL_DIRTY} WHERE dirty <> 0"),
            &[],
        )?;
        let mut global = Vec::with_capacity(global_rows.len());
        for row in global_rows {
            let (Some(name), Some(op)) = (
                row.first().and_then(Value::as_str),
                row.get(1).and_then(Value::as_i64).and_then(DirtyOp::from_i64),
            ) else {
                warn!(?row, "skipping malformed dirty table row");
                continue;
            };
            match self.ctx.table_index(name) {
                Some(table) => global.push((op, table)),
                None => warn!(table = name, "dirty table row names an unknown table"),
            }
        }

        let mut per_op: [Vec<(TableIndex, CompactString)>; 3] = Default::default();
        for op in DirtyOp::ALL {
            per_op[op.slot()] = self.vtn_rows(op)?;
        }

        let mut cache = self.ctx.dirty();
        cache.reset();
        let global_count = global.len();
        for (op, table) in global {
            cache.mark_global(op, table);
        }
        let mut vtn_count = 0;
        for (op, entries) in DirtyOp::ALL.into_iter().zip(per_op) {
            vtn_count += entries.len();
            cache.reload_vtn(op, entries);
            if cache.exceeded(op) {
                warn!(?op, limit = cache.limit(), "vtn dirty entries exceed cache limit");
            }
        }
        info!(global = global_count, vtn = vtn_count, "dirty table cache loaded");
        Ok(())
    }

    fn persist_global_dirty(&mut self, op: DirtyOp, table: TableIndex) -> DalResult<()> {
        let name = Value::text(&self.table_name(table)?);
        let op = Value::Integer(op.as_i64());
        let updated = self.exec_sql(
            &format!("UPDATE {CFG_TBL_DIRTY} SET dirty = 1 WHERE tbl_name = ? AND operation = ?"),
            &[name.clone(), op.clone()],
        )?;
        if updated == 0 {
            self.exec_sql(
                &format!("INSERT INTO {CFG_TBL_DIRTY} (tbl_name, operation, dirty) VALUES (?, ?, 1)"),
                &[name, op],
            )?;
        }
        Ok(())
    }

    fn persist_vtn_dirty(&mut self, op: DirtyOp, table: TableIndex, vtn: &str) -> DalResult<()> {
        let params = [
            Value::Integer(table.as_i64()),
            Value::Integer(op.as_i64()),
            Value::text(vtn),
        ];
        let mut all = params.to_vec();
        all.extend(params);
        self.exec_sql(
            &format!(
                "INSERT INTO {VTN_CFG_TBL_DIRTY} (tbl_index, operation, vtn_name) SELECT ?, ?, ? \
                 WHERE NOT EXISTS (SELECT 1 FROM {VTN_CFG_TBL_DIRTY} \
                 WHERE tbl_index = ? AND operation = ? AND vtn_name = ?)"
            ),
            &all,
        )?;
        Ok(())
    }

    fn vtn_dirty_in_db(&mut self, op: DirtyOp, table: TableIndex, vtn: Option<&str>) -> DalResult<bool> {
        let mut sql = format!(
            "SELECT 1 FROM {VTN_CFG_TBL_DIRTY} WHERE tbl_index = ? AND operation = ?"
        );
        let mut params = vec![Value::Integer(table.as_i64()), Value::Integer(op.as_i64())];
        if let Some(vtn) = vtn {
            sql.push_str(" AND vtn_name = ?");
            params.push(Value::text(vtn));
        }
        sql.push_str(" LIMIT 1");
        Ok(!self.select_rows(&sql, &params)?.is_empty())
    }

    fn vtn_rows(&mut self, op: DirtyOp) -> DalResult<Vec<(TableIndex, CompactString)>> {
        let rows = self.select_rows(
            &format!(
                "SELECT tbl_index, vtn_name FROM {VTN_CFG_TBL_DIRTY} WHERE operation = ? \
                 ORDER BY tbl_index, vtn_name"
            ),
            &[Value::Integer(op.as_i64())],
        )?;
        let num_tables = self.ctx.catalog().num_tables();
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let index = row
                .first()
                .and_then(Value::as_i64)
                .and_then(|i| u16::try_from(i).ok())
                .filter(|i| usize::from(*i) < num_tables);
            let vtn = row.get(1).and_then(Value::as_str);
            match (index, vtn) {
                (Some(index), Some(vtn)) => {
                    entries.push((TableIndex::new(index), CompactString::from(vtn)));
                }
                _ => warn!(?row, "skipping malformed vtn dirty row"),
            }
        }
        Ok(entries)
    }

    /// After a clear, pulls the DB entries back into memory once they fit.
    fn refill_vtn_cache(&mut self, op: DirtyOp) -> DalResult<()> {
        let entries = self.vtn_rows(op)?;
        let mut cache = self.ctx.dirty();
        if entries.len() <= cache.limit() {
            cache.reload_vtn(op, entries);
            info!(?op, entries = cache.vtn_len(op), "vtn dirty cache back within limit");
        }
        Ok(())
    }

    fn table_name(&self, table: TableIndex) -> DalResult<String> {
        self.ctx
            .catalog()
            .table_name(table)
            .map(str::to_owned)
            .ok_or(DalError::TableOutOfRange(table))
    }
}

#[cfg(test)]
mod tests {
    use super::{DirtyCache, DirtyOp, VtnMark};
    use crate::catalog::TableIndex;
    use compact_str::CompactString;

    const T0: TableIndex = TableIndex::new(0);
    const T1: TableIndex = TableIndex::new(1);

    #[test]
    fn vtn_set_stops_at_limit() {
        let mut cache = DirtyCache::new(2);
        assert_eq!(cache.mark_vtn(DirtyOp::Create, T0, "vtn1"), VtnMark::Cached);
        assert_eq!(cache.mark_vtn(DirtyOp::Create, T0, "vtn1"), VtnMark::AlreadyCached);
        assert_eq!(cache.mark_vtn(DirtyOp::Create, T1, "vtn1"), VtnMark::Cached);
        assert_eq!(cache.mark_vtn(DirtyOp::Create, T1, "vtn2"), VtnMark::Overflow);
        assert_eq!(cache.vtn_len(DirtyOp::Create), 2);
        assert!(cache.exceeded(DirtyOp::Create));
        assert!(!cache.exceeded(DirtyOp::Update));
    }

    #[test]
    fn global_clear_drops_vtn_marks() {
        let mut cache = DirtyCache::new(8);
        cache.mark_global(DirtyOp::Delete, T0);
        cache.mark_vtn(DirtyOp::Delete, T0, "vtn1");
        cache.mark_vtn(DirtyOp::Delete, T1, "vtn1");
        cache.clear_global(DirtyOp::Delete, T0);
        assert!(!cache.is_global(DirtyOp::Delete, T0));
        assert!(!cache.is_vtn_cached(DirtyOp::Delete, T0, None));
        assert!(cache.is_vtn_cached(DirtyOp::Delete, T1, Some("vtn1")));
    }

    #[test]
    fn reload_resets_overflow_when_entries_fit() {
        let mut cache = DirtyCache::new(1);
        cache.mark_vtn(DirtyOp::Update, T0, "a");
        cache.mark_vtn(DirtyOp::Update, T0, "b");
        assert!(cache.exceeded(DirtyOp::Update));
        cache.reload_vtn(DirtyOp::Update, vec![(T0, CompactString::from("b"))]);
        assert!(!cache.exceeded(DirtyOp::Update));
        assert!(cache.is_vtn_cached(DirtyOp::Update, T0, Some("b")));
    }

    #[test]
    fn op_codes_round_trip() {
        for op in DirtyOp::ALL {
            assert_eq!(DirtyOp::from_i64(op.as_i64()), Some(op));
        }
        assert_eq!(DirtyOp::from_i64(7), None);
    }
}
