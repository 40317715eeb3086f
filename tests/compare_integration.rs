//! Integration tests for the staged-copy → parse → render pipeline
//!
//! These exercise the same path the CLI takes after fetching: staged files
//! on disk, one parse per machine, and a rendered comparison block.

use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use confdiff::diff;
use confdiff::parse;
use confdiff::staging::{staged_file_name, StagingArea};

/// Write a staged copy the way the fetch pool names them.
fn stage(dir: &Path, config_file: &str, host: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(staged_file_name(Path::new(config_file), host));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_two_machine_port_comparison_end_to_end() {
    let dir = TempDir::new().unwrap();
    let h1 = stage(dir.path(), "/etc/x.conf", "h1", "port 80\n");
    let h2 = stage(dir.path(), "/etc/x.conf", "h2", "port 8080\n");

    let configs = vec![
        parse::parse_file(&h1, "h1", " ").unwrap(),
        parse::parse_file(&h2, "h2", " ").unwrap(),
    ];

    let out = diff::render(Path::new("/etc/x.conf"), &configs, false, 2);
    assert_eq!(out, "\n=== /etc/x.conf\n\nport\n  h1  80\n  h2  8080\n\n");

    // Both values occur exactly once across the comparison, so both carry
    // the uniqueness tag.
    let view = diff::build_view(&configs, 2);
    assert!(view.tagged.contains("80"));
    assert!(view.tagged.contains("8080"));
}

#[test]
fn test_delimiter_mismatch_holds_back_whole_file() {
    let dir = TempDir::new().unwrap();
    let h1 = stage(dir.path(), "/etc/x.conf", "h1", "key=value\n");
    let h2 = stage(dir.path(), "/etc/x.conf", "h2", "PermitRootLogin no\n");

    // '=' never splits h2's line, so that file is flagged and the renderer
    // must withhold all detail for the comparison.
    let configs = vec![
        parse::parse_file(&h1, "h1", "=").unwrap(),
        parse::parse_file(&h2, "h2", "=").unwrap(),
    ];

    let out = diff::render(Path::new("/etc/x.conf"), &configs, false, 2);
    assert!(out.contains(diff::HELD_BACK_WARNING));
    assert!(!out.contains("value"));
    assert!(!out.contains("PermitRootLogin no"));
}

#[test]
fn test_absence_annotation_across_three_machines() {
    let dir = TempDir::new().unwrap();
    let mut configs = Vec::new();
    for (host, text) in [
        ("h1", "port 80\ntimeout 30\n"),
        ("h2", "port 80\n"),
        ("h3", "port 80\ntimeout 45\n"),
    ] {
        let path = stage(dir.path(), "/etc/x.conf", host, text);
        configs.push(parse::parse_file(&path, host, " ").unwrap());
    }

    let out = diff::render(Path::new("/etc/x.conf"), &configs, false, 3);
    assert!(out.contains("timeout (1)\n"));
    assert!(out.contains("port\n"));
    // Shared value, never tagged; distinct timeouts each occur once.
    let view = diff::build_view(&configs, 3);
    assert!(!view.tagged.contains("80"));
    assert!(view.tagged.contains("30"));
    assert!(view.tagged.contains("45"));
}

#[test]
fn test_column_width_and_tags_are_file_scoped() {
    let dir = TempDir::new().unwrap();

    let a1 = stage(dir.path(), "/etc/a.conf", "longhostname", "port 80\n");
    let a2 = stage(dir.path(), "/etc/a.conf", "h2", "port 80\n");
    let b1 = stage(dir.path(), "/etc/b.conf", "h1", "user root\n");
    let b2 = stage(dir.path(), "/etc/b.conf", "h2", "user admin\n");

    let file_a = vec![
        parse::parse_file(&a1, "longhostname", " ").unwrap(),
        parse::parse_file(&a2, "h2", " ").unwrap(),
    ];
    let file_b = vec![
        parse::parse_file(&b1, "h1", " ").unwrap(),
        parse::parse_file(&b2, "h2", " ").unwrap(),
    ];

    let view_a = diff::build_view(&file_a, 2);
    let view_b = diff::build_view(&file_b, 2);

    assert_eq!(view_a.host_column, "longhostname".len() + 2);
    assert_eq!(view_b.host_column, "h2".len() + 2);

    // "80" repeats inside file a but never appears in file b; tags must not
    // leak across files.
    assert!(!view_a.tagged.contains("80"));
    assert!(view_b.tagged.contains("root"));
    assert!(view_b.tagged.contains("admin"));
}

#[test]
fn test_staging_area_round_trip() {
    let staging = StagingArea::new().unwrap();
    let path = staging.staged_path(Path::new("/etc/ssh/sshd_config"), "web1");
    std::fs::write(&path, "Port 22\n").unwrap();

    let config = parse::parse_file(&path, "web1", " ").unwrap();
    assert_eq!(config.host, "web1");
    assert_eq!(
        config.entries,
        vec![("Port".to_string(), "22".to_string())]
    );

    let dir = staging.path().to_path_buf();
    staging.close();
    assert!(!dir.exists());
}
