pub mod schema;
pub mod types;
pub mod version;

use crate::catalog::schema::TableDef;
use crate::catalog::types::{AppType, DbType};
use crate::error::DalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use version::ConfigVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIndex(u16);

impl TableIndex {
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl std::fmt::Display for TableIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnIndex(u16);

impl ColumnIndex {
    /// Pseudo column standing for `COUNT(*)` in an output list.
    pub const RECORD_COUNT: ColumnIndex = ColumnIndex(u16::MAX);

    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }

    pub fn is_record_count(self) -> bool {
        self == Self::RECORD_COUNT
    }
}

impl std::fmt::Display for ColumnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_record_count() {
            f.write_str("count(*)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Table and column metadata consumed by the bind layer and the query
/// generator. Accessors return `None`/0 for out-of-range indexes.
pub trait SchemaCatalog: Send + Sync {
    fn num_tables(&self) -> usize;
    fn table_name(&self, table: TableIndex) -> Option<&str>;
    fn column_name(&self, table: TableIndex, column: ColumnIndex) -> Option<&str>;
    fn table_num_cols(&self, table: TableIndex) -> usize;
    fn table_pk_cols(&self, table: TableIndex) -> usize;
    fn table_fk_cols(&self, table: TableIndex) -> usize;
    fn table_parent_index(&self, table: TableIndex) -> Option<TableIndex>;
    fn column_app_type(&self, table: TableIndex, column: ColumnIndex) -> Option<AppType>;
    fn column_db_type(&self, table: TableIndex, column: ColumnIndex) -> Option<DbType>;
    fn column_array_size(&self, table: TableIndex, column: ColumnIndex) -> usize;
    fn addtl_bind_for_instance_exists_check(&self, table: TableIndex, column: ColumnIndex)
    -> bool;

    fn check_table(&self, table: TableIndex) -> Result<(), DalError> {
        if table.as_usize() < self.num_tables() {
            Ok(())
        } else {
            Err(DalError::TableOutOfRange(table))
        }
    }

    fn check_column(&self, table: TableIndex, column: ColumnIndex) -> Result<(), DalError> {
        self.check_table(table)?;
        if column.as_usize() < self.table_num_cols(table) {
            Ok(())
        } else {
            Err(DalError::ColumnOutOfRange { table, column })
        }
    }

    fn is_primary_key(&self, table: TableIndex, column: ColumnIndex) -> bool {
        !column.is_record_count() && column.as_usize() < self.table_pk_cols(table)
    }

    fn columns(&self, table: TableIndex) -> Vec<ColumnIndex> {
        (0..self.table_num_cols(table))
            .filter_map(|c| u16::try_from(c).ok().map(ColumnIndex::new))
            .collect()
    }
}

/// Maps catalog table names to their indexes.
pub fn table_name_index(catalog: &dyn SchemaCatalog) -> HashMap<String, TableIndex> {
    let mut map = HashMap::with_capacity(catalog.num_tables());
    for idx in 0..catalog.num_tables() {
        let Ok(raw) = u16::try_from(idx) else {
            break;
        };
        let table = TableIndex::new(raw);
        if let Some(name) = catalog.table_name(table) {
            map.insert(name.to_string(), table);
        }
    }
    map
}

/// In-memory catalog built from table definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: Vec<TableDef>,
    parents: Vec<Option<TableIndex>>,
}

impl StaticCatalog {
    pub fn new(tables: Vec<TableDef>) -> Result<Self, DalError> {
        if tables.len() > usize::from(u16::MAX) {
            return Err(DalError::InvalidParameter("too many tables".into()));
        }
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (idx, table) in tables.iter().enumerate() {
            if table.name.is_empty() {
                return Err(DalError::InvalidParameter(format!(
                    "table {idx} has an empty name"
                )));
            }
            // ca_ + del_x would alias ca_del_ + x.
            if table.name.starts_with("del_") {
                return Err(DalError::InvalidParameter(format!(
                    "table name '{}' must not start with 'del_'",
                    table.name
                )));
            }
            if names.insert(table.name.as_str(), idx).is_some() {
                return Err(DalError::InvalidParameter(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
            if table.columns.is_empty() || table.columns.len() >= usize::from(u16::MAX) {
                return Err(DalError::InvalidParameter(format!(
                    "table '{}' has an invalid column count",
                    table.name
                )));
            }
            if table.pk_cols == 0 || table.pk_cols > table.columns.len() {
                return Err(DalError::InvalidParameter(format!(
                    "table '{}' has an invalid primary key width",
                    table.name
                )));
            }
            if let Some(col) = table.columns.iter().find(|c| c.array_size == 0) {
                return Err(DalError::InvalidParameter(format!(
                    "column '{}.{}' has zero array size",
                    table.name, col.name
                )));
            }
        }

        let mut parents = Vec::with_capacity(tables.len());
        for table in &tables {
            let parent = match &table.parent {
                None => {
                    if table.fk_cols != 0 {
                        return Err(DalError::InvalidParameter(format!(
                            "table '{}' declares foreign keys without a parent",
                            table.name
                        )));
                    }
                    None
                }
                Some(parent_name) => {
                    let Some(&parent_idx) = names.get(parent_name.as_str()) else {
                        return Err(DalError::InvalidParameter(format!(
                            "table '{}' references unknown parent '{parent_name}'",
                            table.name
                        )));
                    };
                    let parent_pk = tables[parent_idx].pk_cols;
                    if table.fk_cols != parent_pk || table.fk_cols > table.pk_cols {
                        return Err(DalError::InvalidParameter(format!(
                            "table '{}' must carry the {parent_pk} key columns of '{parent_name}'",
                            table.name
                        )));
                    }
                    u16::try_from(parent_idx).ok().map(TableIndex::new)
                }
            };
            parents.push(parent);
        }
        Ok(Self { tables, parents })
    }

    fn table(&self, table: TableIndex) -> Option<&TableDef> {
        self.tables.get(table.as_usize())
    }

    fn column(&self, table: TableIndex, column: ColumnIndex) -> Option<&schema::ColumnDef> {
        if column.is_record_count() {
            return None;
        }
        self.table(table)?.columns.get(column.as_usize())
    }

    pub fn table_index(&self, name: &str) -> Option<TableIndex> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .and_then(|idx| u16::try_from(idx).ok())
            .map(TableIndex::new)
    }

    pub fn column_index(&self, table: TableIndex, name: &str) -> Option<ColumnIndex> {
        self.table(table)?
            .columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|idx| u16::try_from(idx).ok())
            .map(ColumnIndex::new)
    }
}

impl SchemaCatalog for StaticCatalog {
    fn num_tables(&self) -> usize {
        self.tables.len()
    }

    fn table_name(&self, table: TableIndex) -> Option<&str> {
        self.table(table).map(|t| t.name.as_str())
    }

    fn column_name(&self, table: TableIndex, column: ColumnIndex) -> Option<&str> {
        self.column(table, column).map(|c| c.name.as_str())
    }

    fn table_num_cols(&self, table: TableIndex) -> usize {
        self.table(table).map_or(0, |t| t.columns.len())
    }

    fn table_pk_cols(&self, table: TableIndex) -> usize {
        self.table(table).map_or(0, |t| t.pk_cols)
    }

    fn table_fk_cols(&self, table: TableIndex) -> usize {
        self.table(table).map_or(0, |t| t.fk_cols)
    }

    fn table_parent_index(&self, table: TableIndex) -> Option<TableIndex> {
        self.parents.get(table.as_usize()).copied().flatten()
    }

    fn column_app_type(&self, table: TableIndex, column: ColumnIndex) -> Option<AppType> {
        self.column(table, column).map(|c| c.app_type)
    }

    fn column_db_type(&self, table: TableIndex, column: ColumnIndex) -> Option<DbType> {
        self.column(table, column).map(|c| c.db_type)
    }

    fn column_array_size(&self, table: TableIndex, column: ColumnIndex) -> usize {
        self.column(table, column).map_or(0, |c| c.array_size)
    }

    fn addtl_bind_for_instance_exists_check(
        &self,
        table: TableIndex,
        column: ColumnIndex,
    ) -> bool {
        self.column(table, column)
            .is_some_and(|c| c.instance_exists_check)
    }
}

#[cfg(test)]
mod tests {
    use super::schema::{ColumnDef, TableDef};
    use super::{ColumnIndex, SchemaCatalog, StaticCatalog, TableIndex, table_name_index};
    use crate::error::DalResultCode;

    fn two_level() -> StaticCatalog {
        StaticCatalog::new(vec![
            TableDef::new(
                "vtn",
                1,
                vec![ColumnDef::text("vtn_name", 32), ColumnDef::text("description", 64)],
            ),
            TableDef::new(
                "vbr",
                2,
                vec![
                    ColumnDef::text("vtn_name", 32),
                    ColumnDef::text("vbridge_name", 32),
                    ColumnDef::text("controller_name", 32).with_instance_exists_check(),
                ],
            )
            .with_parent("vtn", 1),
        ])
        .expect("catalog")
    }

    #[test]
    fn accessors_report_metadata() {
        let catalog = two_level();
        let vbr = TableIndex::new(1);
        assert_eq!(catalog.num_tables(), 2);
        assert_eq!(catalog.table_name(vbr), Some("vbr"));
        assert_eq!(catalog.table_pk_cols(vbr), 2);
        assert_eq!(catalog.table_fk_cols(vbr), 1);
        assert_eq!(catalog.table_parent_index(vbr), Some(TableIndex::new(0)));
        assert_eq!(catalog.table_parent_index(TableIndex::new(0)), None);
        assert_eq!(catalog.column_name(vbr, ColumnIndex::new(1)), Some("vbridge_name"));
        assert!(catalog.addtl_bind_for_instance_exists_check(vbr, ColumnIndex::new(2)));
        assert!(catalog.is_primary_key(vbr, ColumnIndex::new(1)));
        assert!(!catalog.is_primary_key(vbr, ColumnIndex::new(2)));
        assert_eq!(catalog.column_index(vbr, "controller_name"), Some(ColumnIndex::new(2)));
    }

    #[test]
    fn bounds_are_checked() {
        let catalog = two_level();
        let err = catalog.check_table(TableIndex::new(2)).expect_err("out of range");
        assert_eq!(err.code(), DalResultCode::InvalidParameter);
        assert!(catalog.check_column(TableIndex::new(0), ColumnIndex::new(2)).is_err());
        assert!(catalog.check_column(TableIndex::new(0), ColumnIndex::new(1)).is_ok());
        assert_eq!(catalog.column_name(TableIndex::new(0), ColumnIndex::RECORD_COUNT), None);
    }

    #[test]
    fn rejects_inconsistent_definitions() {
        let dup = StaticCatalog::new(vec![
            TableDef::new("a", 1, vec![ColumnDef::uint32("id")]),
            TableDef::new("a", 1, vec![ColumnDef::uint32("id")]),
        ]);
        assert!(dup.is_err());

        let aliasing = StaticCatalog::new(vec![TableDef::new(
            "del_vtn",
            1,
            vec![ColumnDef::uint32("id")],
        )]);
        assert!(aliasing.is_err());

        let bad_fk = StaticCatalog::new(vec![
            TableDef::new("p", 1, vec![ColumnDef::uint32("id")]),
            TableDef::new("c", 1, vec![ColumnDef::uint32("id")]).with_parent("p", 2),
        ]);
        assert!(bad_fk.is_err());
    }

    #[test]
    fn name_map_covers_every_table() {
        let catalog = two_level();
        let map = table_name_index(&catalog);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("vbr"), Some(&TableIndex::new(1)));
    }
}
