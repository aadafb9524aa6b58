//! Command line parsing and end-to-end probe runs without a network.

use std::path::Path;

use clap::Parser;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use meshspider::{
    Backend, DumpReader, DumpWriter, FailureKind, NodeAddress, ProbeOutcome, ResultMap,
    SpiderError,
};
use meshspider_cli::commands::{self, is_usage_error};
use meshspider_cli::config::{resolve_dump_path, spider_config, DEFAULT_DUMP, DUMP_ENV};
use meshspider_cli::{Cli, Commands, ProbeArgs};

// ─────────────────────── helpers ───────────────────────

const OLSR_PAGE: &str = r#"<html><head><title>olsr.org httpinfo plugin</title></head><body>
<div id="maintable">Version: olsr.org - 0.6.6.2
<h2>Interfaces</h2>
<table>
<tr><th>wlan0</th></tr>
<tr><td>Status: UP</td><td>MTU: 1500</td><td>WLAN: Yes</td></tr>
<tr><td>IP: 78.41.115.9</td><td>MASK: 255.255.255.255</td><td>BCAST: 78.41.115.9</td></tr>
</table>
</div></body></html>"#;

/// Parse `probe` followed by `args`.
fn probe_args(args: &[&str]) -> ProbeArgs {
    let argv = ["meshspider", "probe"].iter().chain(args).copied();
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Probe(args) => args,
        other => panic!("expected probe, got {other:?}"),
    }
}

fn node(s: &str) -> NodeAddress {
    s.parse().unwrap()
}

fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}

/// Write a dump holding `entries` into `dir`.
fn dump_file(dir: &TempDir, name: &str, entries: &[(&str, ProbeOutcome)]) -> String {
    let results: ResultMap = entries
        .iter()
        .map(|(n, outcome)| (node(n), outcome.clone()))
        .collect();
    let path = dir.path().join(name);
    DumpWriter::write_to_file(&results, &path).unwrap();
    path_str(&path).to_string()
}

/// Saved root page of one node below `dir`.
fn save_page(dir: &Path, host: &str, body: &str) {
    let node_dir = dir.join(host);
    std::fs::create_dir_all(&node_dir).unwrap();
    std::fs::write(node_dir.join("index.html"), body).unwrap();
}

// ─────────────────────── parsing ───────────────────────

#[test]
fn test_probe_flags() {
    let args = probe_args(&[
        "193.238.158.1",
        "10.0.0.1:8080",
        "-i",
        "10.0.0.2:81",
        "-r",
        "a.json.gz",
        "-r",
        "b.json",
        "-n",
        "5",
        "-p",
        "4",
        "-t",
        "30",
        "-V",
        "-",
        "-vv",
    ]);
    assert_eq!(args.nodes, vec!["193.238.158.1", "10.0.0.1:8080"]);
    assert_eq!(args.ip_port, vec!["10.0.0.2:81"]);
    assert_eq!(args.read_dump, vec!["a.json.gz", "b.json"]);
    assert_eq!(args.limit, Some(5));
    assert_eq!(args.pool_size, 4);
    assert_eq!(args.timeout, 30);
    assert_eq!(args.version_statistics.as_deref(), Some("-"));
    assert_eq!(args.verbose, 2);
}

#[test]
fn test_probe_defaults() {
    let args = probe_args(&[]);
    assert_eq!(args.pool_size, 20);
    assert_eq!(args.timeout, 180);
    assert_eq!(args.retries, 2);
    assert!(args.output.is_none());
    assert_eq!(args.verbose, 0);
}

#[test]
fn test_debug_flag_overrides_log_level() {
    let cli = Cli::try_parse_from(["meshspider", "probe", "-D", "--log-level", "warn"]).unwrap();
    assert_eq!(cli.log_filter(), "debug");
    let cli = Cli::try_parse_from(["meshspider", "--log-level", "warn", "validate", "x"]).unwrap();
    assert_eq!(cli.log_filter(), "warn");
}

#[test]
fn test_completions_subcommand() {
    let cli = Cli::try_parse_from(["meshspider", "completions", "bash"]).unwrap();
    assert!(matches!(cli.command, Commands::Completions { .. }));
    assert!(Cli::try_parse_from(["meshspider", "completions", "cmd.exe"]).is_err());
}

#[test]
fn test_config_from_flags() {
    let config = spider_config(&probe_args(&["-p", "0", "-t", "5", "-i", "[2a02:60::1]:81"]))
        .unwrap();
    assert_eq!(config.pool_size, 1);
    assert_eq!(config.node_timeout.as_secs(), 5);
    assert_eq!(config.port_for(&node("2a02:60::1")), Some(81));

    let err = spider_config(&probe_args(&["-i", "10.0.0.1"])).unwrap_err();
    assert!(matches!(err, SpiderError::Usage(_)));
}

#[test]
fn test_dump_path_resolution() {
    assert_eq!(resolve_dump_path(Some("x.json")), "x.json");

    std::env::set_var(DUMP_ENV, "/tmp/from-env.json.gz");
    assert_eq!(resolve_dump_path(Some("x.json")), "x.json");
    assert_eq!(resolve_dump_path(None), "/tmp/from-env.json.gz");
    std::env::remove_var(DUMP_ENV);

    assert_eq!(resolve_dump_path(None), DEFAULT_DUMP);
}

// ─────────────────────── runs ───────────────────────

#[tokio::test]
async fn test_nothing_to_do_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.json");
    let args = probe_args(&["-o", path_str(&out)]);

    let err = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(is_usage_error(&err), "{err:#}");
    assert!(!out.exists());
}

#[tokio::test]
async fn test_bad_node_is_usage_error() {
    let args = probe_args(&["not-an-address"]);
    let err = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(is_usage_error(&err), "{err:#}");
}

#[tokio::test]
async fn test_merge_only_run() {
    let dir = TempDir::new().unwrap();
    let first = dump_file(
        &dir,
        "first.json",
        &[
            ("10.0.0.1", ProbeOutcome::failure(FailureKind::Timeout, "t1")),
            ("10.0.0.2", ProbeOutcome::failure(FailureKind::TransportError, "a")),
        ],
    );
    let second = dump_file(
        &dir,
        "second.json.gz",
        &[("10.0.0.1", ProbeOutcome::failure(FailureKind::TransportError, "t2"))],
    );
    let missing = path_str(&dir.path().join("missing.json")).to_string();
    let out = dir.path().join("merged.json.gz");

    let args = probe_args(&[
        "-r",
        &first,
        "-r",
        &missing,
        "-r",
        &second,
        "-o",
        path_str(&out),
    ]);
    let report = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.summary.is_none());
    assert_eq!(report.failed_sources, vec![missing]);
    assert_eq!(
        report.results[&node("10.0.0.1")],
        ProbeOutcome::failure(FailureKind::TransportError, "t2")
    );

    let written = DumpReader::read_from_path(path_str(&out)).unwrap();
    assert_eq!(written.results, report.results);

    let stats = commands::validate(path_str(&out)).unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_failure["TransportError"], 2);
}

#[tokio::test]
async fn test_local_probe_with_reports() {
    let dir = TempDir::new().unwrap();
    let pages = dir.path().join("pages");
    save_page(&pages, "193.238.158.1", OLSR_PAGE);
    save_page(&pages, "193.238.158.2", "<html><body>router</body></html>");
    let out = dir.path().join("out.json");
    let versions = dir.path().join("versions.csv");
    let interfaces = dir.path().join("interfaces.csv");

    let args = probe_args(&[
        "193.238.158.1",
        "193.238.158.2",
        "193.238.158.3",
        "--local",
        path_str(&pages),
        "-o",
        path_str(&out),
        "-V",
        path_str(&versions),
        "-I",
        path_str(&interfaces),
    ]);
    let report = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap();

    let summary = report.summary.unwrap();
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(report.dump_path, path_str(&out));

    let ok = report.results[&node("193.238.158.1")].snapshot().unwrap();
    assert_eq!(ok.backend, Backend::Olsr);
    assert_eq!(ok.version, "0.6.6.2");
    assert_eq!(
        report.results[&node("193.238.158.2")].failure_kind(),
        Some(FailureKind::InvalidResponse)
    );
    // no saved pages at all reads like a 404
    assert_eq!(
        report.results[&node("193.238.158.3")].failure_kind(),
        Some(FailureKind::InvalidResponse)
    );

    let csv = std::fs::read_to_string(&versions).unwrap();
    let rows: Vec<&str> = csv.split("\r\n").filter(|r| !r.is_empty()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], "timestamp;address;type;version");
    assert!(rows[1].ends_with(";193.238.158.1;OLSR;0.6.6.2"), "{}", rows[1]);

    let csv = std::fs::read_to_string(&interfaces).unwrap();
    assert!(csv.contains(";193.238.158.1;wlan0;;False;"), "{csv}");
}

#[tokio::test]
async fn test_resume_skips_recorded_nodes() {
    let dir = TempDir::new().unwrap();
    let pages = dir.path().join("pages");
    save_page(&pages, "193.238.158.2", OLSR_PAGE);
    let previous = dump_file(
        &dir,
        "previous.json",
        &[("193.238.158.1", ProbeOutcome::failure(FailureKind::Timeout, "slow"))],
    );
    let out = dir.path().join("out.json");

    let args = probe_args(&[
        "193.238.158.1",
        "193.238.158.2",
        "--resume",
        &previous,
        "--local",
        path_str(&pages),
        "-o",
        path_str(&out),
    ]);
    let report = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap();

    let summary = report.summary.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(
        report.results[&node("193.238.158.1")],
        ProbeOutcome::failure(FailureKind::Timeout, "slow")
    );
    assert!(report.results[&node("193.238.158.2")].is_success());
}

#[tokio::test]
async fn test_fresh_result_replaces_merged_dump() {
    let dir = TempDir::new().unwrap();
    let old_pages = dir.path().join("old");
    save_page(&old_pages, "193.238.158.1", &OLSR_PAGE.replace("0.6.6.2", "0.5.6"));
    save_page(&old_pages, "193.238.158.2", OLSR_PAGE);
    let stale = dir.path().join("stale.json");
    let args = probe_args(&[
        "193.238.158.1",
        "193.238.158.2",
        "--local",
        path_str(&old_pages),
        "-o",
        path_str(&stale),
    ]);
    let report = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap();
    let old = report.results[&node("193.238.158.1")].snapshot().unwrap();
    assert_eq!(old.version, "0.5.6");

    let pages = dir.path().join("pages");
    save_page(&pages, "193.238.158.1", OLSR_PAGE);
    let out = dir.path().join("out.json");
    let args = probe_args(&[
        "193.238.158.1",
        "-r",
        path_str(&stale),
        "--local",
        path_str(&pages),
        "-o",
        path_str(&out),
    ]);
    let report = commands::probe(&args, CancellationToken::new())
        .await
        .unwrap();

    let fresh = report.results[&node("193.238.158.1")].snapshot().unwrap();
    assert_eq!(fresh.version, "0.6.6.2");
    // nodes left out of this run keep their merged outcome
    assert!(report.results[&node("193.238.158.2")].is_success());

    let written = DumpReader::read_from_path(path_str(&out)).unwrap();
    assert_eq!(written.results, report.results);
}

#[test]
fn test_validate_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.json");
    std::fs::write(&path, b"not a dump").unwrap();
    assert!(commands::validate(path_str(&path)).is_err());
}
