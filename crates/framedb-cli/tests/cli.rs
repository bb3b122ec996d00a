//! End-to-end exercises of the `framedb` binary, the way the teacher's own
//! CLI crate drives its binary through `assert_cmd` rather than calling its
//! internals directly.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn write_schema(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("schema.txt");
    std::fs::write(
        &path,
        "table events\n\
         column id I64 primary_key\n\
         column kind String indexed\n",
    )
    .unwrap();
    path
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn event_body(file_id: &[u8; 4]) -> Vec<u8> {
    let mut body = vec![0u8; 8];
    body[4..8].copy_from_slice(file_id);
    body
}

#[test]
fn missing_schema_file_fails_with_useful_error() {
    let mut cmd = cargo_bin_cmd!("framedb");
    cmd.args(["--schema", "/nonexistent/schema.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading schema file"));
}

#[test]
fn ingest_then_query_and_stats_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let schema_path = write_schema(temp_dir.path());

    let mut stdin = Vec::new();
    stdin.extend(frame(&event_body(b"EVT1")));
    stdin.extend(frame(&event_body(b"EVT1")));

    let mut cmd = cargo_bin_cmd!("framedb");
    cmd.args(["--schema", schema_path.to_str().unwrap(), "--map", "EVT1=events", "--stats"])
        .write_stdin(stdin)
        .assert()
        .success()
        .stdout(predicate::str::contains("events").and(predicate::str::contains("records=2")));
}

#[test]
fn query_flag_prints_tab_separated_header_and_rows() {
    let temp_dir = tempfile::tempdir().unwrap();
    let schema_path = write_schema(temp_dir.path());

    let mut stdin = Vec::new();
    stdin.extend(frame(&event_body(b"EVT1")));

    let mut cmd = cargo_bin_cmd!("framedb");
    cmd.args([
        "--schema",
        schema_path.to_str().unwrap(),
        "--map",
        "EVT1=events",
        "--query",
        "SELECT * FROM events",
    ])
    .write_stdin(stdin)
    .assert()
    .success()
    .stdout(predicate::str::contains("_rowid"));
}

#[test]
fn export_then_load_round_trips_record_count() {
    let temp_dir = tempfile::tempdir().unwrap();
    let schema_path = write_schema(temp_dir.path());
    let export_path = temp_dir.path().join("log.bin");

    let mut stdin = Vec::new();
    stdin.extend(frame(&event_body(b"EVT1")));
    stdin.extend(frame(&event_body(b"EVT1")));
    stdin.extend(frame(&event_body(b"EVT1")));

    let mut cmd = cargo_bin_cmd!("framedb");
    cmd.args([
        "--schema",
        schema_path.to_str().unwrap(),
        "--map",
        "EVT1=events",
        "--export",
        export_path.to_str().unwrap(),
    ])
    .write_stdin(stdin)
    .assert()
    .success();

    let mut reload = cargo_bin_cmd!("framedb");
    reload
        .args([
            "--schema",
            schema_path.to_str().unwrap(),
            "--map",
            "EVT1=events",
            "--load",
            export_path.to_str().unwrap(),
            "--stats",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("records=3"));
}

#[test]
fn bad_map_flag_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let schema_path = write_schema(temp_dir.path());

    let mut cmd = cargo_bin_cmd!("framedb");
    cmd.args(["--schema", schema_path.to_str().unwrap(), "--map", "not-a-mapping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FILEID=TABLE"));
}
