//! One pure generator per token. Each returns the SQL fragment and the
//! parameters it introduces, in textual order.

use crate::bind::TableBindSet;
use crate::catalog::types::Value;
use crate::catalog::{ColumnIndex, ConfigVersion, SchemaCatalog, TableIndex};
use crate::query::token::Token;

pub(crate) struct GenContext<'a> {
    pub catalog: &'a dyn SchemaCatalog,
    pub table: TableIndex,
    pub bind: Option<&'a TableBindSet>,
    pub version_a: ConfigVersion,
    pub version_b: Option<ConfigVersion>,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Fragment {
    pub text: String,
    pub params: Vec<Value>,
}

impl Fragment {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }
}

type GenResult = Result<Fragment, String>;
pub(crate) type Generator = fn(&GenContext<'_>) -> GenResult;

pub(crate) fn generator(token: Token) -> Generator {
    match token {
        Token::MandInColumns => mand_in_columns,
        Token::MandInColumnsWithQ => mand_in_columns_with_q,
        Token::MandInColumnsEqQ => mand_in_columns_eq_q,
        Token::OptOutColumns => opt_out_columns,
        Token::OptOutColumnsTmp => opt_out_columns_tmp,
        Token::OptWhereMatchColumnsEq => opt_where_match_columns_eq,
        Token::MandWhereMatchColumnsEq => mand_where_match_columns_eq,
        Token::MandWhereMatchColumnsSiblingGt => mand_where_sibling_gt,
        Token::MandWhereMatchColumnsSiblingGe => mand_where_sibling_ge,
        Token::OptAndMatchColumnsEqTmp => opt_and_match_columns_eq_tmp,
        Token::MandAndMatchColumnsEqTmp => mand_and_match_columns_eq_tmp,
        Token::MandAndMatchColumnsEq => mand_and_match_columns_eq,
        Token::OptAndMatchColumnsEqCandidate => opt_and_match_columns_eq_candidate,
        Token::MandWhereInstanceKeyEq => mand_where_instance_key_eq,
        Token::MandWhereParentKeyEq => mand_where_parent_key_eq,
        Token::PrimaryKeyColumns => primary_key_columns,
        Token::PrimaryKeyColumnsTmp => primary_key_columns_tmp,
        Token::Config1PkEqTmp => config1_pk_eq_tmp,
        Token::Config2PkEqTmp => config2_pk_eq_tmp,
        Token::Config1NonPkEqTmp => config1_non_pk_eq_tmp,
        Token::Config2NonPkEqTmp => config2_non_pk_eq_tmp,
        Token::Config2AllColsEqTmp => config2_all_cols_eq_tmp,
        Token::Config1SetNonPkFromConfig2 => config1_set_non_pk_from_config2,
        Token::CandidatePkEqTmp => candidate_pk_eq_tmp,
        Token::Config1TableName => config1_table_name,
        Token::Config2TableName => config2_table_name,
        Token::CandidateTableName => candidate_table_name,
        Token::ParentTableName => parent_table_name,
    }
}

// ---- helpers ---------------------------------------------------------------

fn column_name<'a>(ctx: &GenContext<'a>, column: ColumnIndex) -> Result<&'a str, String> {
    ctx.catalog
        .column_name(ctx.table, column)
        .ok_or_else(|| format!("column {column} has no name in table {}", ctx.table))
}

fn table1(ctx: &GenContext<'_>) -> Result<String, String> {
    physical(ctx, ctx.table, ctx.version_a)
}

fn table2(ctx: &GenContext<'_>) -> Result<String, String> {
    let version = ctx
        .version_b
        .ok_or_else(|| "second version required".to_string())?;
    physical(ctx, ctx.table, version)
}

/// The CANDIDATE table, the live side of the delete shadow.
fn candidate(ctx: &GenContext<'_>) -> Result<String, String> {
    physical(ctx, ctx.table, ConfigVersion::Candidate)
}

fn physical(ctx: &GenContext<'_>, table: TableIndex, version: ConfigVersion) -> Result<String, String> {
    let name = ctx
        .catalog
        .table_name(table)
        .ok_or_else(|| format!("table index {table} out of range"))?;
    version
        .physical_name(name)
        .ok_or_else(|| format!("no table prefix for version {version}"))
}

fn pk_columns(ctx: &GenContext<'_>) -> Vec<ColumnIndex> {
    let pk = ctx.catalog.table_pk_cols(ctx.table);
    ctx.catalog.columns(ctx.table).into_iter().take(pk).collect()
}

fn non_pk_columns(ctx: &GenContext<'_>) -> Vec<ColumnIndex> {
    let pk = ctx.catalog.table_pk_cols(ctx.table);
    ctx.catalog.columns(ctx.table).into_iter().skip(pk).collect()
}

fn inputs<'a>(ctx: &GenContext<'a>) -> Vec<(ColumnIndex, &'a Value)> {
    ctx.bind
        .map(|b| b.input_columns().collect())
        .unwrap_or_default()
}

fn matches<'a>(ctx: &GenContext<'a>) -> Vec<(ColumnIndex, &'a Value)> {
    ctx.bind
        .map(|b| b.match_columns().collect())
        .unwrap_or_default()
}

fn join_names(ctx: &GenContext<'_>, columns: &[ColumnIndex], prefix: &str) -> Result<String, String> {
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        parts.push(format!("{prefix}{}", column_name(ctx, *column)?));
    }
    Ok(parts.join(", "))
}

/// `col = ? <sep> col = ?` over `(column, value)` pairs.
fn eq_chain(
    ctx: &GenContext<'_>,
    pairs: &[(ColumnIndex, &Value)],
    prefix: &str,
    sep: &str,
) -> GenResult {
    let mut parts = Vec::with_capacity(pairs.len());
    let mut params = Vec::with_capacity(pairs.len());
    for (column, value) in pairs {
        parts.push(format!("{prefix}{} = ?", column_name(ctx, *column)?));
        params.push((*value).clone());
    }
    Ok(Fragment {
        text: parts.join(sep),
        params,
    })
}

fn prefixed(keyword: &str, mut fragment: Fragment) -> Fragment {
    fragment.text = format!("{keyword} {}", fragment.text);
    fragment
}

/// `<table>.col = tmp.col AND ...`
fn correlate(ctx: &GenContext<'_>, table: &str, columns: &[ColumnIndex]) -> GenResult {
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        let name = column_name(ctx, *column)?;
        parts.push(format!("{table}.{name} = tmp.{name}"));
    }
    Ok(Fragment::text(parts.join(" AND ")))
}

/// Null-safe variant of `correlate`; an empty column list is always true.
fn correlate_null_safe(ctx: &GenContext<'_>, table: &str, columns: &[ColumnIndex]) -> GenResult {
    if columns.is_empty() {
        return Ok(Fragment::text("1 = 1"));
    }
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        let name = column_name(ctx, *column)?;
        parts.push(format!(
            "({table}.{name} = tmp.{name} OR ({table}.{name} IS NULL AND tmp.{name} IS NULL))"
        ));
    }
    Ok(Fragment::text(parts.join(" AND ")))
}

fn out_columns(ctx: &GenContext<'_>, prefix: &str) -> GenResult {
    let columns = match ctx.bind {
        Some(bind) => bind.selected_columns(),
        None => ctx.catalog.columns(ctx.table),
    };
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        if column.is_record_count() {
            parts.push("COUNT(*)".to_string());
        } else {
            parts.push(format!("{prefix}{}", column_name(ctx, column)?));
        }
    }
    Ok(Fragment::text(parts.join(", ")))
}

fn sibling(ctx: &GenContext<'_>, op: &str) -> GenResult {
    let pairs = matches(ctx);
    let Some(pivot) = pairs
        .iter()
        .map(|(column, _)| *column)
        .filter(|column| ctx.catalog.is_primary_key(ctx.table, *column))
        .max()
    else {
        return Err("sibling query needs a match-bound primary key column".into());
    };
    let mut parts = Vec::with_capacity(pairs.len());
    let mut params = Vec::with_capacity(pairs.len());
    for (column, value) in &pairs {
        let cmp = if *column == pivot { op } else { "=" };
        parts.push(format!("{} {cmp} ?", column_name(ctx, *column)?));
        params.push((*value).clone());
    }
    Ok(Fragment {
        text: format!("WHERE {}", parts.join(" AND ")),
        params,
    })
}

// ---- generators ------------------------------------------------------------

fn mand_in_columns(ctx: &GenContext<'_>) -> GenResult {
    let columns: Vec<_> = inputs(ctx).into_iter().map(|(c, _)| c).collect();
    if columns.is_empty() {
        return Err("no input columns bound".into());
    }
    Ok(Fragment::text(join_names(ctx, &columns, "")?))
}

fn mand_in_columns_with_q(ctx: &GenContext<'_>) -> GenResult {
    let pairs = inputs(ctx);
    if pairs.is_empty() {
        return Err("no input columns bound".into());
    }
    Ok(Fragment {
        text: vec!["?"; pairs.len()].join(", "),
        params: pairs.into_iter().map(|(_, v)| v.clone()).collect(),
    })
}

fn mand_in_columns_eq_q(ctx: &GenContext<'_>) -> GenResult {
    let pairs = inputs(ctx);
    if pairs.is_empty() {
        return Err("no input columns bound".into());
    }
    eq_chain(ctx, &pairs, "", ", ")
}

fn opt_out_columns(ctx: &GenContext<'_>) -> GenResult {
    out_columns(ctx, "")
}

fn opt_out_columns_tmp(ctx: &GenContext<'_>) -> GenResult {
    out_columns(ctx, "tmp.")
}

fn opt_where_match_columns_eq(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Ok(Fragment::default());
    }
    Ok(prefixed("WHERE", eq_chain(ctx, &pairs, "", " AND ")?))
}

fn mand_where_match_columns_eq(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Err("no match columns bound".into());
    }
    Ok(prefixed("WHERE", eq_chain(ctx, &pairs, "", " AND ")?))
}

fn mand_where_sibling_gt(ctx: &GenContext<'_>) -> GenResult {
    sibling(ctx, ">")
}

fn mand_where_sibling_ge(ctx: &GenContext<'_>) -> GenResult {
    sibling(ctx, ">=")
}

fn opt_and_match_columns_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Ok(Fragment::default());
    }
    Ok(prefixed("AND", eq_chain(ctx, &pairs, "tmp.", " AND ")?))
}

fn mand_and_match_columns_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Err("no match columns bound".into());
    }
    Ok(prefixed("AND", eq_chain(ctx, &pairs, "tmp.", " AND ")?))
}

fn mand_and_match_columns_eq(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Err("no match columns bound".into());
    }
    Ok(prefixed("AND", eq_chain(ctx, &pairs, "", " AND ")?))
}

/// Match filter applied to the CANDIDATE rows a shadow copy correlates with.
fn opt_and_match_columns_eq_candidate(ctx: &GenContext<'_>) -> GenResult {
    let pairs = matches(ctx);
    if pairs.is_empty() {
        return Ok(Fragment::default());
    }
    let prefix = format!("{}.", candidate(ctx)?);
    Ok(prefixed("AND", eq_chain(ctx, &pairs, &prefix, " AND ")?))
}

/// Primary key plus catalog-flagged columns, taken from the input values.
/// A flagged column that is not bound is left out.
fn mand_where_instance_key_eq(ctx: &GenContext<'_>) -> GenResult {
    let Some(bind) = ctx.bind else {
        return Err("instance key needs input bindings".into());
    };
    let mut pairs = Vec::new();
    for column in ctx.catalog.columns(ctx.table) {
        let is_pk = ctx.catalog.is_primary_key(ctx.table, column);
        let flagged = ctx.catalog.addtl_bind_for_instance_exists_check(ctx.table, column);
        if !is_pk && !flagged {
            continue;
        }
        match bind.input_value(column) {
            Some(value) => pairs.push((column, value)),
            None if is_pk => return Err(format!("primary key column {column} has no input value")),
            None => {}
        }
    }
    Ok(prefixed("WHERE", eq_chain(ctx, &pairs, "", " AND ")?))
}

/// Parent key columns named as in the parent table, valued from this
/// table's leading foreign-key inputs.
fn mand_where_parent_key_eq(ctx: &GenContext<'_>) -> GenResult {
    let Some(parent) = ctx.catalog.table_parent_index(ctx.table) else {
        return Err(format!("table {} has no parent", ctx.table));
    };
    let Some(bind) = ctx.bind else {
        return Err("parent key needs input bindings".into());
    };
    let width = ctx.catalog.table_pk_cols(parent);
    let mut parts = Vec::with_capacity(width);
    let mut params = Vec::with_capacity(width);
    for column in ctx.catalog.columns(parent).into_iter().take(width) {
        let name = ctx
            .catalog
            .column_name(parent, column)
            .ok_or_else(|| format!("parent column {column} has no name"))?;
        let value = bind
            .input_value(column)
            .ok_or_else(|| format!("foreign key column {column} has no input value"))?;
        parts.push(format!("{name} = ?"));
        params.push(value.clone());
    }
    Ok(Fragment {
        text: format!("WHERE {}", parts.join(" AND ")),
        params,
    })
}

fn primary_key_columns(ctx: &GenContext<'_>) -> GenResult {
    Ok(Fragment::text(join_names(ctx, &pk_columns(ctx), "")?))
}

fn primary_key_columns_tmp(ctx: &GenContext<'_>) -> GenResult {
    Ok(Fragment::text(join_names(ctx, &pk_columns(ctx), "tmp.")?))
}

fn config1_pk_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate(ctx, &table1(ctx)?, &pk_columns(ctx))
}

fn config2_pk_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate(ctx, &table2(ctx)?, &pk_columns(ctx))
}

fn candidate_pk_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate(ctx, &candidate(ctx)?, &pk_columns(ctx))
}

fn config1_non_pk_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate_null_safe(ctx, &table1(ctx)?, &non_pk_columns(ctx))
}

fn config2_non_pk_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate_null_safe(ctx, &table2(ctx)?, &non_pk_columns(ctx))
}

fn config2_all_cols_eq_tmp(ctx: &GenContext<'_>) -> GenResult {
    correlate_null_safe(ctx, &table2(ctx)?, &ctx.catalog.columns(ctx.table))
}

/// `col = (SELECT tmp.col FROM <config2> tmp WHERE <pk correlation>)` for
/// every non-key column.
fn config1_set_non_pk_from_config2(ctx: &GenContext<'_>) -> GenResult {
    let columns = non_pk_columns(ctx);
    if columns.is_empty() {
        return Err("table has no non-key columns to update".into());
    }
    let t1 = table1(ctx)?;
    let t2 = table2(ctx)?;
    let key = correlate(ctx, &t1, &pk_columns(ctx))?.text;
    let mut parts = Vec::with_capacity(columns.len());
    for column in columns {
        let name = column_name(ctx, column)?;
        parts.push(format!("{name} = (SELECT tmp.{name} FROM {t2} tmp WHERE {key})"));
    }
    Ok(Fragment::text(parts.join(", ")))
}

fn config1_table_name(ctx: &GenContext<'_>) -> GenResult {
    Ok(Fragment::text(table1(ctx)?))
}

fn config2_table_name(ctx: &GenContext<'_>) -> GenResult {
    Ok(Fragment::text(table2(ctx)?))
}

fn candidate_table_name(ctx: &GenContext<'_>) -> GenResult {
    Ok(Fragment::text(candidate(ctx)?))
}

fn parent_table_name(ctx: &GenContext<'_>) -> GenResult {
    let parent = ctx
        .catalog
        .table_parent_index(ctx.table)
        .ok_or_else(|| format!("table {} has no parent", ctx.table))?;
    Ok(Fragment::text(physical(ctx, parent, ctx.version_a)?))
}

#[cfg(test)]
mod tests {
    use super::{GenContext, generator};
    use crate::bind::TableBindSet;
    use crate::catalog::schema::{ColumnDef, TableDef};
    use crate::catalog::types::Value;
    use crate::catalog::{ColumnIndex, ConfigVersion, SchemaCatalog, StaticCatalog, TableIndex};
    use crate::query::token::Token;
    use std::sync::Arc;

    const VBR: TableIndex = TableIndex::new(1);

    fn catalog() -> Arc<dyn SchemaCatalog> {
        Arc::new(
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
                        ColumnDef::text("vbr_name", 32),
                        ColumnDef::text("ctrlr_name", 32).with_instance_exists_check(),
                        ColumnDef::uint8("admin"),
                    ],
                )
                .with_parent("vtn", 1),
            ])
            .expect("catalog"),
        )
    }

    fn ctx<'a>(
        catalog: &'a Arc<dyn SchemaCatalog>,
        bind: Option<&'a TableBindSet>,
    ) -> GenContext<'a> {
        GenContext {
            catalog: catalog.as_ref(),
            table: VBR,
            bind,
            version_a: ConfigVersion::Candidate,
            version_b: Some(ConfigVersion::Running),
        }
    }

    #[test]
    fn sibling_pivots_on_highest_bound_key() {
        let catalog = catalog();
        let mut bind = TableBindSet::new(Arc::clone(&catalog), VBR).expect("bind");
        bind.bind_match_value(ColumnIndex::new(0), "vtn1").expect("vtn");
        bind.bind_match_value(ColumnIndex::new(1), "br1").expect("vbr");
        bind.bind_match_value(ColumnIndex::new(3), 1_i64).expect("admin");
        let frag = generator(Token::MandWhereMatchColumnsSiblingGt)(&ctx(&catalog, Some(&bind)))
            .expect("sibling");
        assert_eq!(frag.text, "WHERE vtn_name = ? AND vbr_name > ? AND admin = ?");
        assert_eq!(
            frag.params,
            vec![Value::text("vtn1"), Value::text("br1"), Value::Integer(1)]
        );

        let mut no_key = TableBindSet::new(Arc::clone(&catalog), VBR).expect("bind");
        no_key.bind_match_value(ColumnIndex::new(3), 1_i64).expect("admin");
        assert!(generator(Token::MandWhereMatchColumnsSiblingGe)(&ctx(&catalog, Some(&no_key))).is_err());
    }

    #[test]
    fn instance_and_parent_keys_use_inputs() {
        let catalog = catalog();
        let mut bind = TableBindSet::new(Arc::clone(&catalog), VBR).expect("bind");
        bind.bind_input_value(ColumnIndex::new(0), "vtn1").expect("vtn");
        bind.bind_input_value(ColumnIndex::new(1), "br1").expect("vbr");
        bind.bind_input_value(ColumnIndex::new(2), "pfc1").expect("ctrlr");
        let c = ctx(&catalog, Some(&bind));
        let instance = generator(Token::MandWhereInstanceKeyEq)(&c).expect("instance");
        assert_eq!(instance.text, "WHERE vtn_name = ? AND vbr_name = ? AND ctrlr_name = ?");
        let parent = generator(Token::MandWhereParentKeyEq)(&c).expect("parent");
        assert_eq!(parent.text, "WHERE vtn_name = ?");
        assert_eq!(parent.params, vec![Value::text("vtn1")]);
        assert_eq!(generator(Token::ParentTableName)(&c).expect("name").text, "ca_vtn");
    }

    #[test]
    fn correlation_clauses() {
        let catalog = catalog();
        let c = ctx(&catalog, None);
        assert_eq!(
            generator(Token::Config1PkEqTmp)(&c).expect("pk").text,
            "ca_vbr.vtn_name = tmp.vtn_name AND ca_vbr.vbr_name = tmp.vbr_name"
        );
        let non_pk = generator(Token::Config2NonPkEqTmp)(&c).expect("non pk").text;
        assert!(non_pk.starts_with(
            "(ru_vbr.ctrlr_name = tmp.ctrlr_name OR (ru_vbr.ctrlr_name IS NULL AND tmp.ctrlr_name IS NULL))"
        ));
        let set = generator(Token::Config1SetNonPkFromConfig2)(&c).expect("set").text;
        assert!(set.starts_with(
            "ctrlr_name = (SELECT tmp.ctrlr_name FROM ru_vbr tmp WHERE ca_vbr.vtn_name = tmp.vtn_name"
        ));
        assert_eq!(
            generator(Token::PrimaryKeyColumnsTmp)(&c).expect("pk").text,
            "tmp.vtn_name, tmp.vbr_name"
        );
    }

    #[test]
    fn shadow_filter_targets_candidate_rows() {
        let catalog = catalog();
        let mut bind = TableBindSet::new(Arc::clone(&catalog), VBR).expect("bind");
        bind.bind_match_value(ColumnIndex::new(3), 1_i64).expect("admin");
        let mut c = ctx(&catalog, Some(&bind));
        c.version_a = ConfigVersion::CandidateDel;
        let filter = generator(Token::OptAndMatchColumnsEqCandidate)(&c).expect("filter");
        assert_eq!(filter.text, "AND ca_vbr.admin = ?");
        assert_eq!(filter.params, vec![Value::Integer(1)]);
        assert_eq!(
            generator(Token::CandidatePkEqTmp)(&c).expect("pk").text,
            "ca_vbr.vtn_name = tmp.vtn_name AND ca_vbr.vbr_name = tmp.vbr_name"
        );
        assert_eq!(generator(Token::Config1TableName)(&c).expect("name").text, "ca_del_vbr");
        assert_eq!(
            generator(Token::OptAndMatchColumnsEqCandidate)(&ctx(&catalog, None))
                .expect("empty")
                .text,
            ""
        );
    }

    #[test]
    fn mandatory_generators_fail_without_bindings() {
        let catalog = catalog();
        let c = ctx(&catalog, None);
        for token in [
            Token::MandInColumns,
            Token::MandInColumnsWithQ,
            Token::MandInColumnsEqQ,
            Token::MandWhereMatchColumnsEq,
            Token::MandAndMatchColumnsEq,
            Token::MandAndMatchColumnsEqTmp,
            Token::MandWhereInstanceKeyEq,
        ] {
            assert!(generator(token)(&c).is_err(), "{token:?}");
        }
        assert_eq!(generator(Token::OptWhereMatchColumnsEq)(&c).expect("opt").text, "");
        assert_eq!(
            generator(Token::OptOutColumnsTmp)(&c).expect("opt").text,
            "tmp.vtn_name, tmp.vbr_name, tmp.ctrlr_name, tmp.admin"
        );
    }
}
