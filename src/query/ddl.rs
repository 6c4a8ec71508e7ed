use crate::catalog::{ConfigVersion, SchemaCatalog, TableIndex};
use crate::error::{DalError, DalResult};

pub const CFG_TBL_DIRTY: &str = "cfg_tbl_dirty";
pub const VTN_CFG_TBL_DIRTY: &str = "vtn_cfg_tbl_dirty";

/// Persisted dirty-tracking tables.
pub fn dirty_table_ddl() -> [String; 2] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {CFG_TBL_DIRTY} (tbl_name VARCHAR(64) NOT NULL, \
             operation SMALLINT NOT NULL, dirty SMALLINT NOT NULL DEFAULT 0, \
             PRIMARY KEY (tbl_name, operation))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {VTN_CFG_TBL_DIRTY} (tbl_index INTEGER NOT NULL, \
             operation SMALLINT NOT NULL, vtn_name VARCHAR(32) NOT NULL, \
             PRIMARY KEY (tbl_index, operation, vtn_name))"
        ),
    ]
}

/// `CREATE TABLE` for one (table, version). CANDIDATE tables carry the
/// `c_flag`/`u_flag` markers and a foreign key to the parent's CANDIDATE
/// table.
pub fn create_table_sql(
    catalog: &dyn SchemaCatalog,
    table: TableIndex,
    version: ConfigVersion,
) -> DalResult<String> {
    catalog.check_table(table)?;
    let name = catalog
        .table_name(table)
        .ok_or(DalError::TableOutOfRange(table))?;
    let physical = version
        .physical_name(name)
        .ok_or_else(|| DalError::InvalidParameter(format!("no tables for version {version}")))?;

    let mut defs = Vec::new();
    let mut pk_names = Vec::new();
    for column in catalog.columns(table) {
        let col_name = catalog
            .column_name(table, column)
            .ok_or(DalError::ColumnOutOfRange { table, column })?;
        let db_type = catalog
            .column_db_type(table, column)
            .ok_or(DalError::ColumnOutOfRange { table, column })?;
        let sql_type = db_type.sql_name(catalog.column_array_size(table, column));
        if catalog.is_primary_key(table, column) {
            defs.push(format!("{col_name} {sql_type} NOT NULL"));
            pk_names.push(col_name);
        } else {
            defs.push(format!("{col_name} {sql_type}"));
        }
    }
    if version == ConfigVersion::Candidate {
        defs.push("c_flag SMALLINT NOT NULL DEFAULT 0".into());
        defs.push("u_flag SMALLINT NOT NULL DEFAULT 0".into());
    }
    defs.push(format!("PRIMARY KEY ({})", pk_names.join(", ")));

    if version == ConfigVersion::Candidate {
        if let Some(parent) = catalog.table_parent_index(table) {
            defs.push(foreign_key(catalog, table, parent, version)?);
        }
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {physical} ({})",
        defs.join(", ")
    ))
}

fn foreign_key(
    catalog: &dyn SchemaCatalog,
    table: TableIndex,
    parent: TableIndex,
    version: ConfigVersion,
) -> DalResult<String> {
    let width = catalog.table_fk_cols(table);
    let parent_name = catalog
        .table_name(parent)
        .and_then(|n| version.physical_name(n))
        .ok_or(DalError::TableOutOfRange(parent))?;
    let own: Vec<_> = catalog
        .columns(table)
        .into_iter()
        .take(width)
        .filter_map(|c| catalog.column_name(table, c))
        .collect();
    let theirs: Vec<_> = catalog
        .columns(parent)
        .into_iter()
        .take(width)
        .filter_map(|c| catalog.column_name(parent, c))
        .collect();
    if own.len() != width || theirs.len() != width {
        return Err(DalError::Internal(format!(
            "foreign key of table {table} does not line up with parent {parent}"
        )));
    }
    Ok(format!(
        "FOREIGN KEY ({}) REFERENCES {parent_name} ({})",
        own.join(", "),
        theirs.join(", ")
    ))
}

/// Every statement needed to create the tables of `versions`, parents
/// before children, followed by the dirty-tracking tables.
pub fn schema_statements(
    catalog: &dyn SchemaCatalog,
    versions: &[ConfigVersion],
) -> DalResult<Vec<String>> {
    let mut statements = Vec::new();
    for version in versions {
        for table in creation_order(catalog) {
            statements.push(create_table_sql(catalog, table, *version)?);
        }
    }
    statements.extend(dirty_table_ddl());
    Ok(statements)
}

fn creation_order(catalog: &dyn SchemaCatalog) -> Vec<TableIndex> {
    let all: Vec<TableIndex> = (0..catalog.num_tables())
        .filter_map(|i| u16::try_from(i).ok().map(TableIndex::new))
        .collect();
    let depth = |mut table: TableIndex| {
        let mut d = 0usize;
        while let Some(parent) = catalog.table_parent_index(table) {
            d += 1;
            table = parent;
            if d > all.len() {
                break;
            }
        }
        d
    };
    let mut ordered = all.clone();
    ordered.sort_by_key(|t| (depth(*t), *t));
    ordered
}
