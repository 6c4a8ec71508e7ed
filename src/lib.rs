//! Data access layer for a versioned network-configuration store.
//!
//! Every logical table exists once per [`ConfigVersion`] (`ca_`, `ru_`,
//! `su_`, ...). Callers describe a request with a [`TableBindSet`], the
//! [`QueryTemplateEngine`] turns it into parameterized SQL, and a
//! [`SessionManager`] runs it over one driver connection while tracking
//! which CANDIDATE tables are dirty relative to RUNNING.

pub mod bind;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod query;
pub mod session;

pub use bind::{TableBindSet, ValueCell};
pub use catalog::types::{AppType, DbType, Value};
pub use catalog::{ColumnIndex, ConfigVersion, SchemaCatalog, StaticCatalog, TableIndex};
pub use config::{ConnectionType, DalConfig};
pub use cursor::Cursor;
pub use driver::{Driver, ErrorTranslator, SqliteDriver};
pub use error::{DalError, DalResult, DalResultCode, DriverError};
pub use query::template::QueryTemplateId;
pub use query::{CompiledQuery, QueryTemplateEngine};
pub use session::dirty::DirtySnapshot;
pub use session::{CfgMode, ConnectionState, DalContext, DirtyOp, SessionManager};
