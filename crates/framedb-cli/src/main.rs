//! Thin CLI wrapper around [`framedb::Database`]: point it at a schema file
//! and a set of file-id-to-table mappings, feed it length-prefixed frames on
//! stdin (or a previously exported log via `--load`), then optionally run
//! one query, print stats, and/or export the resulting log.

mod schema_file;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use framedb::{Database, QueryResult, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "framedb", about = "Ingest, query, and inspect a framedb record log", version)]
struct Cli {
    /// Path to a schema file (see `framedb_cli::schema_file` for the format).
    #[arg(long)]
    schema: PathBuf,

    /// A `FILEID=TABLE` mapping; repeat for each file id the log carries.
    #[arg(long = "map", value_name = "FILEID=TABLE")]
    maps: Vec<String>,

    /// Run this SQL query after ingest and print its result.
    #[arg(long)]
    query: Option<String>,

    /// Write the post-ingest log out to this path.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Load a previously exported log instead of reading frames from stdin.
    #[arg(long)]
    load: Option<PathBuf>,

    /// Print per-table record and tombstone counts.
    #[arg(long)]
    stats: bool,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    if let Err(err) = run() {
        eprintln!("framedb: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let schema_text =
        fs::read_to_string(&cli.schema).with_context(|| format!("reading schema file {}", cli.schema.display()))?;
    let schema = schema_file::parse(&schema_text).context("parsing schema file")?;
    let mut db = Database::open(schema)?;

    for mapping in &cli.maps {
        let (file_id_str, table) =
            mapping.split_once('=').with_context(|| format!("--map `{mapping}` must be FILEID=TABLE"))?;
        let file_id = parse_file_id(file_id_str)?;
        db.register_file_id(file_id, table)?;
    }

    if let Some(load_path) = &cli.load {
        let bytes = fs::read(load_path).with_context(|| format!("reading {}", load_path.display()))?;
        db.load_and_rebuild(&bytes);
    } else {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes).context("reading stdin")?;
        if !bytes.is_empty() {
            let (consumed, processed) = db.ingest(&bytes);
            tracing::info!(consumed, processed, "ingested frames from stdin");
        }
    }

    if let Some(sql) = &cli.query {
        let result = db.query(sql, &[])?;
        print_result(&result);
    }

    if cli.stats {
        print_stats(&db)?;
    }

    if let Some(export_path) = &cli.export {
        let bytes = db.export_data();
        fs::write(export_path, &bytes).with_context(|| format!("writing {}", export_path.display()))?;
    }

    Ok(())
}

fn parse_file_id(s: &str) -> Result<[u8; 4]> {
    let bytes = s.as_bytes();
    if bytes.len() != 4 {
        bail!("file id `{s}` must be exactly 4 bytes, e.g. `USR1`");
    }
    let mut id = [0u8; 4];
    id.copy_from_slice(bytes);
    Ok(id)
}

fn print_result(result: &QueryResult) {
    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(Value::to_string).collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_stats(db: &Database) -> Result<()> {
    for table in db.table_names() {
        let records = db.record_count(&table)?;
        let tombstones = db.deleted_count(&table)?;
        println!("{table}\trecords={records}\ttombstones={tombstones}");
    }
    Ok(())
}
