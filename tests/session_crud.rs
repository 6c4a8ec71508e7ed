mod common;

use cfgdal::{
    ColumnIndex, ConfigVersion, ConnectionState, DalResultCode, DirtyOp, TableIndex, ValueCell,
};
use common::{DESC, Fixture, NAME, VBR, VTN, drain_names, drain_pairs, global};

#[test]
fn created_record_reads_back_through_output_cells() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session
        .create_record(ConfigVersion::Candidate, VTN, &fx.vtn_row("vtn1", "first"))
        .expect("create");
    assert_eq!(session.write_count(), 3);

    let desc = ValueCell::new();
    let mut bind = fx.vtn_match("vtn1");
    bind.bind_output_cell(DESC, &desc).expect("output");
    session
        .get_single_record(ConfigVersion::Candidate, VTN, &mut bind)
        .expect("get");
    assert_eq!(desc.get_text().as_deref(), Some("first"));

    let mut missing = fx.vtn_match("nope");
    missing.bind_output_cell(DESC, &ValueCell::new()).expect("output");
    let err = session
        .get_single_record(ConfigVersion::Candidate, VTN, &mut missing)
        .expect_err("missing");
    assert_eq!(err.code(), DalResultCode::RecordNotFound);

    assert!(session.is_tbl_dirty(DirtyOp::Create, VTN, &global()).expect("dirty"));
    session.commit_transaction().expect("commit");
    assert_eq!(session.write_count(), 0);
}

#[test]
fn integrity_failures_are_disambiguated() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session
        .create_record(ConfigVersion::Candidate, VTN, &fx.vtn_row("vtn1", "d"))
        .expect("create");

    let dup = session
        .create_record(ConfigVersion::Candidate, VTN, &fx.vtn_row("vtn1", "other"))
        .expect_err("duplicate");
    assert_eq!(dup.code(), DalResultCode::RecordAlreadyExists);

    let orphan = session
        .create_record(ConfigVersion::Candidate, VBR, &fx.vbr_row("ghost", "br1", "d"))
        .expect_err("orphan");
    assert_eq!(orphan.code(), DalResultCode::ParentNotFound);

    session
        .create_record(ConfigVersion::Candidate, VBR, &fx.vbr_row("vtn1", "br1", "d"))
        .expect("child");
    assert_eq!(fx.count(&mut session, ConfigVersion::Candidate, VBR), 1);
}

#[test]
fn update_marks_table_and_changes_rows() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("vtn1", "old"), ("vtn2", "keep")]);
    let mut session = fx.session();
    assert!(!session.is_tbl_dirty(DirtyOp::Update, VTN, &global()).expect("clean"));

    let mut bind = fx.vtn_match("vtn1");
    bind.bind_input_value(DESC, "new").expect("input");
    let changed = session
        .update_records(ConfigVersion::Candidate, VTN, &bind)
        .expect("update");
    assert_eq!(changed, 1);
    assert!(session.is_tbl_dirty(DirtyOp::Update, VTN, &global()).expect("dirty"));

    let rows = fx.vtn_rows(&mut session, ConfigVersion::Candidate);
    assert_eq!(
        rows,
        vec![("vtn1".into(), "new".into()), ("vtn2".into(), "keep".into())]
    );
    let running = fx.vtn_rows(&mut session, ConfigVersion::Running);
    assert_eq!(running[0].1, "old");
}

#[test]
fn multiple_records_respect_limit_and_key_order() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("c", "3"), ("a", "1"), ("b", "2")]);
    let mut session = fx.session();
    let (bind, name, desc) = fx.vtn_outputs();
    let cursor = session
        .get_multiple_records(ConfigVersion::Running, VTN, 2, bind)
        .expect("cursor");
    let rows = drain_pairs(&mut session, cursor, &name, &desc);
    assert_eq!(rows, vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
}

#[test]
fn sibling_queries_page_after_a_key() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let mut session = fx.session();

    let name = ValueCell::new();
    let mut begin = fx.vtn_match("b");
    begin.bind_output_cell(NAME, &name).expect("output");
    let cursor = session
        .get_sibling_begin(ConfigVersion::Running, VTN, 0, begin)
        .expect("begin");
    assert_eq!(drain_names(&mut session, cursor, &name), vec!["b", "c"]);

    let mut after = fx.vtn_match("b");
    after.bind_output_cell(NAME, &name).expect("output");
    let cursor = session
        .get_sibling_records(ConfigVersion::Running, VTN, 0, after)
        .expect("records");
    assert_eq!(drain_names(&mut session, cursor, &name), vec!["c"]);

    let key = fx.vtn_match("b");
    assert_eq!(
        session
            .get_sibling_count_begin(ConfigVersion::Running, VTN, &key)
            .expect("count begin"),
        2
    );
    assert_eq!(
        session
            .get_sibling_count(ConfigVersion::Running, VTN, &key)
            .expect("count"),
        1
    );
}

#[test]
fn existence_and_counts() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("a", "1"), ("b", "2")]);
    let mut session = fx.session();
    assert!(
        session
            .record_exists(ConfigVersion::Running, VTN, Some(&fx.vtn_match("a")))
            .expect("exists")
    );
    assert!(
        !session
            .record_exists(ConfigVersion::Startup, VTN, Some(&fx.vtn_match("a")))
            .expect("startup empty")
    );
    assert_eq!(
        session
            .get_record_count(ConfigVersion::Running, VTN, Some(&fx.vtn_match("b")))
            .expect("count"),
        1
    );
    assert_eq!(fx.count(&mut session, ConfigVersion::Running, VTN), 2);
}

#[test]
fn deletes_and_truncates_outside_candidate() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let mut session = fx.session();
    let deleted = session
        .delete_records(ConfigVersion::Running, VTN, Some(&fx.vtn_match("a")), false)
        .expect("delete");
    assert_eq!(deleted, 1);
    assert_eq!(fx.count(&mut session, ConfigVersion::Running, VTN), 2);
    session
        .delete_records(ConfigVersion::Running, VTN, Some(&fx.vtn_match("b")), true)
        .expect("truncate");
    assert_eq!(fx.count(&mut session, ConfigVersion::Running, VTN), 0);
    assert!(!session.is_tbl_dirty(DirtyOp::Delete, VTN, &global()).expect("untracked"));
}

#[test]
fn app_query_uses_bind_for_params_and_outputs() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("a", "1"), ("b", "2")]);
    let mut session = fx.session();

    let mut bind = fx.bind(VTN);
    let name = ValueCell::new();
    let desc = ValueCell::new();
    bind.bind_output_cell(NAME, &name).expect("name");
    bind.bind_output_cell(DESC, &desc).expect("desc");
    bind.bind_match_value(NAME, "b").expect("match");
    let cursor = session
        .execute_app_query(
            "SELECT vtn_name, description FROM ru_vtn WHERE vtn_name = ?",
            bind,
        )
        .expect("query")
        .expect("rows");
    assert_eq!(
        drain_pairs(&mut session, cursor, &name, &desc),
        vec![("b".into(), "2".into())]
    );

    let mut update = fx.bind(VTN);
    update.bind_input_value(DESC, "changed").expect("input");
    update.bind_match_value(NAME, "a").expect("match");
    let none = session
        .execute_app_query("UPDATE su_vtn SET description = ? WHERE vtn_name = ?", update)
        .expect("update");
    assert!(none.is_none());
    assert_eq!(session.write_count(), 1);
}

#[test]
fn validation_rejects_bad_requests() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let err = session
        .get_record_count(ConfigVersion::Invalid, VTN, None)
        .expect_err("invalid version");
    assert_eq!(err.code(), DalResultCode::InvalidParameter);

    let err = session
        .get_record_count(ConfigVersion::Running, TableIndex::new(9), None)
        .expect_err("bad table");
    assert_eq!(err.code(), DalResultCode::InvalidParameter);

    let err = session
        .record_exists(ConfigVersion::Running, VBR, Some(&fx.vtn_match("a")))
        .expect_err("bind for another table");
    assert_eq!(err.code(), DalResultCode::InvalidParameter);

    let mut bind = fx.bind(VTN);
    assert!(bind.bind_input_value(ColumnIndex::new(7), "x").is_err());
    assert_eq!(session.write_count(), 0);
}

#[test]
fn disconnect_waits_for_pending_writes() {
    let fx = Fixture::new();
    let mut session = fx.session();
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    session
        .create_record(ConfigVersion::Running, VTN, &fx.vtn_row("a", "1"))
        .expect("create");
    let err = session.disconnect().expect_err("pending");
    assert_eq!(err.code(), DalResultCode::NotDisconnected);

    session.rollback_transaction().expect("rollback");
    session.disconnect().expect("disconnect");
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    let err = session
        .get_record_count(ConfigVersion::Running, VTN, None)
        .expect_err("closed");
    assert_eq!(err.code(), DalResultCode::ConnNotEstablished);

    session.connect().expect("reconnect");
    assert_eq!(fx.count(&mut session, ConfigVersion::Running, VTN), 0);
}

#[test]
fn running_updates_are_serialized_across_sessions() {
    let fx = Fixture::new();
    fx.seed_vtns(&[("a", "1")]);
    let mut first = fx.session();
    let mut second = fx.session();

    let mut bind = fx.vtn_match("a");
    bind.bind_input_value(DESC, "x").expect("input");
    first
        .update_records(ConfigVersion::Running, VTN, &bind)
        .expect("first update");

    let err = second
        .update_records(ConfigVersion::Running, VTN, &bind)
        .expect_err("locked");
    assert_eq!(err.code(), DalResultCode::ConnTimeOut);

    first.commit_transaction().expect("commit");
    second
        .update_records(ConfigVersion::Running, VTN, &bind)
        .expect("second update");
    second.commit_transaction().expect("commit");
}

#[test]
fn write_exclusion_can_be_disabled() {
    let fx = Fixture::with_config(|c| c.with_write_exclusion(false));
    fx.seed_vtns(&[("a", "1")]);
    let mut session = fx.session();
    let mut bind = fx.vtn_match("a");
    bind.bind_input_value(DESC, "x").expect("input");
    session
        .update_records(ConfigVersion::Running, VTN, &bind)
        .expect("update");
    assert!(format!("{session:?}").contains("holds_write_lock: false"));
}
