#![allow(dead_code)]

use cfgdal::catalog::schema::{ColumnDef, TableDef};
use cfgdal::{
    CfgMode, ColumnIndex, ConfigVersion, ConnectionType, Cursor, DalConfig, DalContext,
    DalResultCode, SchemaCatalog, SessionManager, StaticCatalog, TableBindSet, TableIndex,
    ValueCell,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const VTN: TableIndex = TableIndex::new(0);
pub const VBR: TableIndex = TableIndex::new(1);
pub const BOUNDARY: TableIndex = TableIndex::new(2);

pub const NAME: ColumnIndex = ColumnIndex::new(0);
pub const DESC: ColumnIndex = ColumnIndex::new(1);
pub const VBR_NAME: ColumnIndex = ColumnIndex::new(1);
pub const VBR_DESC: ColumnIndex = ColumnIndex::new(2);

pub const ALL_VERSIONS: [ConfigVersion; 5] = [
    ConfigVersion::Candidate,
    ConfigVersion::Running,
    ConfigVersion::Startup,
    ConfigVersion::Import,
    ConfigVersion::CandidateDel,
];

pub fn catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        TableDef::new(
            "vtn",
            1,
            vec![
                ColumnDef::text("vtn_name", 32),
                ColumnDef::text("description", 64),
                ColumnDef::uint8("admin_status"),
            ],
        ),
        TableDef::new(
            "vbr",
            2,
            vec![
                ColumnDef::text("vtn_name", 32),
                ColumnDef::text("vbr_name", 32),
                ColumnDef::text("description", 64),
            ],
        )
        .with_parent("vtn", 1),
        TableDef::new(
            "boundary",
            1,
            vec![
                ColumnDef::text("boundary_id", 32),
                ColumnDef::text("description", 64),
                ColumnDef::text("controller_name1", 32),
                ColumnDef::text("domain_name1", 32),
            ],
        ),
    ])
    .expect("catalog")
}

/// On-disk database with every version installed. Each session opens its own
/// connection, so the database cannot be `:memory:`.
pub struct Fixture {
    _dir: TempDir,
    pub ctx: Arc<DalContext>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_config(tune: impl FnOnce(DalConfig) -> DalConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.db");
        let mut config = DalConfig::with_dsn(path.to_string_lossy().into_owned());
        config.write_lock_timeout_ms = 100;
        config.query_timeout_ms = 1_000;
        let config = tune(config);
        let ctx = DalContext::with_sqlite(Arc::new(catalog()), config).expect("context");
        let mut session = SessionManager::open(Arc::clone(&ctx), ConnectionType::ReadWrite)
            .expect("install session");
        session.install_schema(&ALL_VERSIONS).expect("install schema");
        drop(session);
        Self { _dir: dir, ctx }
    }

    pub fn session(&self) -> SessionManager {
        SessionManager::open(Arc::clone(&self.ctx), ConnectionType::ReadWrite).expect("session")
    }

    pub fn catalog(&self) -> Arc<dyn SchemaCatalog> {
        Arc::clone(self.ctx.catalog())
    }

    pub fn bind(&self, table: TableIndex) -> TableBindSet {
        TableBindSet::new(self.catalog(), table).expect("bind")
    }

    pub fn vtn_row(&self, name: &str, desc: &str) -> TableBindSet {
        let mut bind = self.bind(VTN);
        bind.bind_input_value(NAME, name).expect("name");
        bind.bind_input_value(DESC, desc).expect("desc");
        bind
    }

    pub fn vtn_match(&self, name: &str) -> TableBindSet {
        let mut bind = self.bind(VTN);
        bind.bind_match_value(NAME, name).expect("match");
        bind
    }

    pub fn vbr_row(&self, vtn: &str, vbr: &str, desc: &str) -> TableBindSet {
        let mut bind = self.bind(VBR);
        bind.bind_input_value(NAME, vtn).expect("vtn");
        bind.bind_input_value(VBR_NAME, vbr).expect("vbr");
        bind.bind_input_value(VBR_DESC, desc).expect("desc");
        bind
    }

    /// Writes the same VTN rows to RUNNING and CANDIDATE and commits.
    pub fn seed_vtns(&self, rows: &[(&str, &str)]) {
        let mut session = self.session();
        for (name, desc) in rows {
            session
                .create_record(ConfigVersion::Running, VTN, &self.vtn_row(name, desc))
                .expect("seed running");
        }
        session
            .copy_entire_records(ConfigVersion::Candidate, ConfigVersion::Running, VTN)
            .expect("seed candidate");
        session.commit_transaction().expect("seed commit");
    }

    /// Every `(vtn_name, description)` of `version`, in key order.
    pub fn vtn_rows(&self, session: &mut SessionManager, version: ConfigVersion) -> Vec<(String, String)> {
        let (bind, name, desc) = self.vtn_outputs();
        let cursor = session
            .get_multiple_records(version, VTN, 0, bind)
            .expect("cursor");
        drain_pairs(session, cursor, &name, &desc)
    }

    pub fn vtn_outputs(&self) -> (TableBindSet, ValueCell, ValueCell) {
        let name = ValueCell::new();
        let desc = ValueCell::new();
        let mut bind = self.bind(VTN);
        bind.bind_output_cell(NAME, &name).expect("name");
        bind.bind_output_cell(DESC, &desc).expect("desc");
        (bind, name, desc)
    }

    pub fn count(&self, session: &mut SessionManager, version: ConfigVersion, table: TableIndex) -> u64 {
        session
            .get_record_count(version, table, None)
            .expect("count")
    }
}

/// Reads `name` after every row until the cursor runs dry, then closes it.
pub fn drain_names(session: &mut SessionManager, mut cursor: Cursor, name: &ValueCell) -> Vec<String> {
    let mut names = Vec::new();
    loop {
        match session.get_next_record(&mut cursor) {
            Ok(()) => names.push(name.get_text().unwrap_or_default()),
            Err(err) => {
                assert_eq!(err.code(), DalResultCode::RecordNoMore, "{err}");
                break;
            }
        }
    }
    session.close_cursor(cursor, true).expect("close");
    names
}

pub fn drain_pairs(
    session: &mut SessionManager,
    mut cursor: Cursor,
    first: &ValueCell,
    second: &ValueCell,
) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    loop {
        match session.get_next_record(&mut cursor) {
            Ok(()) => rows.push((
                first.get_text().unwrap_or_default(),
                second.get_text().unwrap_or_default(),
            )),
            Err(err) => {
                assert_eq!(err.code(), DalResultCode::RecordNoMore, "{err}");
                break;
            }
        }
    }
    session.close_cursor(cursor, true).expect("close");
    rows
}

pub fn global() -> CfgMode {
    CfgMode::Global
}
