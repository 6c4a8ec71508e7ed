use cfgdal::catalog::schema::TableDef;
use cfgdal::query::ddl;
use cfgdal::{
    ConfigVersion, ConnectionType, DalConfig, DalContext, SessionManager, StaticCatalog, TableIndex,
};
use std::fs;
use std::sync::Arc;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "schema" => match args.get(2).map(String::as_str) {
            Some("ddl") => cmd_schema_ddl(&args[3..]),
            Some("install") => cmd_schema_install(&args[3..]),
            Some(other) => Err(format!("unknown schema command: {other}")),
            None => Err("missing schema subcommand".into()),
        },
        "dirty" => match args.get(2).map(String::as_str) {
            Some("show") => cmd_dirty_show(&args[3..]),
            Some(other) => Err(format!("unknown dirty command: {other}")),
            None => Err("missing dirty subcommand".into()),
        },
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_schema_ddl(args: &[String]) -> Result<(), String> {
    let catalog = load_catalog(args)?;
    let versions = parse_versions(args)?;
    let statements = ddl::schema_statements(&catalog, &versions).map_err(|e| e.to_string())?;
    for sql in statements {
        println!("{sql};");
    }
    Ok(())
}

fn cmd_schema_install(args: &[String]) -> Result<(), String> {
    let db = parse_flag_value(args, "--db").ok_or("--db is required")?;
    let versions = parse_versions(args)?;
    let mut session = open_session(args, &db)?;
    session.install_schema(&versions).map_err(|e| e.to_string())?;
    println!("installed\t{db}\t{}", versions.len());
    Ok(())
}

fn cmd_dirty_show(args: &[String]) -> Result<(), String> {
    let db = parse_flag_value(args, "--db").ok_or("--db is required")?;
    let mut session = open_session(args, &db)?;
    session.load_dirty_cache().map_err(|e| e.to_string())?;
    let ctx = Arc::clone(session.context());
    let name = |table: TableIndex| {
        ctx.catalog()
            .table_name(table)
            .map(str::to_owned)
            .unwrap_or_else(|| table.to_string())
    };
    for snapshot in ctx.dirty_snapshot() {
        for table in &snapshot.global {
            println!("{:?}\tglobal\t{}", snapshot.op, name(*table));
        }
        for (table, vtn) in &snapshot.vtn {
            println!("{:?}\tvtn\t{}\t{vtn}", snapshot.op, name(*table));
        }
        if snapshot.exceeded {
            println!("{:?}\texceeded", snapshot.op);
        }
    }
    Ok(())
}

fn load_catalog(args: &[String]) -> Result<StaticCatalog, String> {
    let path = parse_flag_value(args, "--catalog").ok_or("--catalog is required")?;
    let raw = fs::read_to_string(&path).map_err(|e| format!("read {path}: {e}"))?;
    let tables: Vec<TableDef> =
        serde_json::from_str(&raw).map_err(|e| format!("parse {path}: {e}"))?;
    StaticCatalog::new(tables).map_err(|e| e.to_string())
}

fn open_session(args: &[String], db: &str) -> Result<SessionManager, String> {
    let catalog = load_catalog(args)?;
    let ctx = DalContext::with_sqlite(Arc::new(catalog), DalConfig::with_dsn(db))
        .map_err(|e| e.to_string())?;
    SessionManager::open(ctx, ConnectionType::ReadWrite).map_err(|e| e.to_string())
}

fn parse_versions(args: &[String]) -> Result<Vec<ConfigVersion>, String> {
    match parse_flag_value(args, "--versions") {
        None => Ok(vec![
            ConfigVersion::Candidate,
            ConfigVersion::Running,
            ConfigVersion::Startup,
            ConfigVersion::CandidateDel,
        ]),
        Some(list) => list.split(',').map(str::parse).collect(),
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  cfgdal schema ddl --catalog <catalog.json> [--versions candidate,running,...]");
    eprintln!(
        "  cfgdal schema install --catalog <catalog.json> --db <path> [--versions candidate,running,...]"
    );
    eprintln!("  cfgdal dirty show --catalog <catalog.json> --db <path>");
}
