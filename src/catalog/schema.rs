use crate::catalog::types::{AppType, DbType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub app_type: AppType,
    pub db_type: DbType,
    pub array_size: usize,
    /// Column joins the primary key in instance-exists checks.
    #[serde(default)]
    pub instance_exists_check: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, app_type: AppType, db_type: DbType, array_size: usize) -> Self {
        Self {
            name: name.into(),
            app_type,
            db_type,
            array_size,
            instance_exists_check: false,
        }
    }

    pub fn text(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, AppType::Text, DbType::Varchar, len)
    }

    pub fn uint32(name: impl Into<String>) -> Self {
        Self::new(name, AppType::Uint32, DbType::BigInt, 1)
    }

    pub fn uint8(name: impl Into<String>) -> Self {
        Self::new(name, AppType::Uint8, DbType::SmallInt, 1)
    }

    pub fn with_instance_exists_check(mut self) -> Self {
        self.instance_exists_check = true;
        self
    }
}

/// One logical table. The first `pk_cols` columns form the primary key; the
/// leading `fk_cols` of those reference the parent's primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub pk_cols: usize,
    #[serde(default)]
    pub fk_cols: usize,
    #[serde(default)]
    pub parent: Option<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, pk_cols: usize, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            pk_cols,
            fk_cols: 0,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>, fk_cols: usize) -> Self {
        self.parent = Some(parent.into());
        self.fk_cols = fk_cols;
        self
    }
}
