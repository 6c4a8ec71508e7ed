pub mod ddl;
pub(crate) mod generators;
pub mod template;
pub mod token;

use crate::bind::TableBindSet;
use crate::catalog::types::Value;
use crate::catalog::{ConfigVersion, SchemaCatalog, TableIndex};
use crate::error::{DalError, DalResult};
use crate::query::generators::{GenContext, generator};
use crate::query::template::QueryTemplateId;
use crate::query::token::{Segment, scan};
use std::sync::Arc;
use tracing::debug;

/// Generated statement and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub template: QueryTemplateId,
    pub sql: String,
    pub params: Vec<Value>,
}

/// Expands statement templates against catalog metadata and bind sets.
#[derive(Clone)]
pub struct QueryTemplateEngine {
    catalog: Arc<dyn SchemaCatalog>,
}

impl std::fmt::Debug for QueryTemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTemplateEngine")
            .field("num_tables", &self.catalog.num_tables())
            .finish()
    }
}

impl QueryTemplateEngine {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    /// SQL text only; see [`QueryTemplateEngine::compile`].
    pub fn get_sql(
        &self,
        template: QueryTemplateId,
        bind: Option<&TableBindSet>,
        table: TableIndex,
        version_a: ConfigVersion,
        version_b: Option<ConfigVersion>,
    ) -> DalResult<String> {
        self.compile(template, bind, table, version_a, version_b)
            .map(|q| q.sql)
    }

    /// Expands every token of `template`. Any failure discards the whole
    /// statement.
    pub fn compile(
        &self,
        template: QueryTemplateId,
        bind: Option<&TableBindSet>,
        table: TableIndex,
        version_a: ConfigVersion,
        version_b: Option<ConfigVersion>,
    ) -> DalResult<CompiledQuery> {
        self.catalog
            .check_table(table)
            .map_err(|e| DalError::query_build(template, e.to_string()))?;
        if let Some(actual) = bind.map(TableBindSet::table).filter(|t| *t != table) {
            return Err(DalError::BindTableMismatch {
                expected: table,
                actual,
            });
        }
        if !version_a.is_valid() {
            return Err(DalError::query_build(template, "invalid config version"));
        }
        if template.requires_two_versions() {
            let Some(b) = version_b else {
                return Err(DalError::query_build(template, "second config version required"));
            };
            if !b.is_valid() {
                return Err(DalError::query_build(template, "invalid second config version"));
            }
            if b == version_a {
                return Err(DalError::query_build(
                    template,
                    format!("both config versions are {version_a}"),
                ));
            }
        }
        if let Some(required) = template.required_version_a().filter(|v| *v != version_a) {
            return Err(DalError::query_build(
                template,
                format!("template only applies to {required}, got {version_a}"),
            ));
        }

        let ctx = GenContext {
            catalog: self.catalog.as_ref(),
            table,
            bind,
            version_a,
            version_b: if template.requires_two_versions() { version_b } else { None },
        };
        let segments = scan(template.text()).map_err(|e| DalError::query_build(template, e))?;
        let mut sql = String::with_capacity(template.text().len() * 2);
        let mut params = Vec::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => sql.push_str(text),
                Segment::Token(token) => {
                    let fragment = generator(token)(&ctx).map_err(|reason| {
                        DalError::query_build(template, format!("{}: {reason}", token.name()))
                    })?;
                    sql.push_str(&fragment.text);
                    params.extend(fragment.params);
                }
            }
        }
        let sql = normalize_whitespace(&sql);
        debug!(?template, %table, params = params.len(), sql = %sql, "generated sql");
        Ok(CompiledQuery {
            template,
            sql,
            params,
        })
    }
}

fn normalize_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
