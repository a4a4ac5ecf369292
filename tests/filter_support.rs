//! Integration tests for extraction filters and the command policy.
//!
//! Fake extractor scripts stand in for real converters like `pdftotext`,
//! driving the whole path through the binary: policy authorization, argv
//! rendering, the sandboxed executor, and output decoding.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docfort_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docfort");
    path
}

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_str().unwrap().to_string()
}

/// Seeds a knowledge root with a dummy binary document. The bytes don't
/// matter since the fake extractor never reads its input.
fn seed_root(tmp: &TempDir) -> PathBuf {
    let kb = tmp.path().join("kb");
    fs::create_dir_all(&kb).unwrap();
    fs::write(kb.join("book.pdf"), b"%PDF-1.4 placeholder").unwrap();
    fs::write(kb.join("readme.txt"), "Plain text document.\n").unwrap();
    kb
}

/// Writes a config with the given `[filters]` section appended verbatim.
fn write_config(tmp: &TempDir, filters: &str) -> PathBuf {
    let kb = tmp.path().join("kb");
    let config_content = format!(
        r#"[knowledge]
root = "{}"

{}
"#,
        kb.display(),
        filters
    );
    let config_path = tmp.path().join("docfort.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn run_docfort(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_docfort_with_env(config_path, args, &[])
}

fn run_docfort_with_env(
    config_path: &Path,
    args: &[&str],
    extra_env: &[(&str, &str)],
) -> (String, String, bool) {
    let binary = docfort_binary();
    let mut command = Command::new(&binary);
    command
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "error");
    for (key, value) in extra_env {
        command.env(key, value);
    }
    let output = command
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docfort binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_filter_extracts_content() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let script = write_script(tmp.path(), "fake-pdftotext.sh", "echo 'Extracted dragon lore.'");
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
"#,
            script
        ),
    );

    let (stdout, stderr, success) = run_docfort(&config_path, &["read", "book.pdf"]);
    assert!(success, "read failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Extracted dragon lore."));
}

#[test]
fn test_page_args_are_spliced_before_the_path() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    // Echo the argv so the rendered shape is visible in the output.
    let script = write_script(tmp.path(), "fake-pdftotext.sh", r#"printf 'argv: %s\n' "$*""#);
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
page_args = ["-f", "{{first}}", "-l", "{{last}}"]
"#,
            script
        ),
    );

    let (stdout, stderr, success) = run_docfort(
        &config_path,
        &["read", "book.pdf", "--first-page", "2", "--last-page", "5"],
    );
    assert!(success, "read failed: stderr={}", stderr);
    assert!(
        stdout.contains("argv: -f 2 -l 5 book.pdf"),
        "page args should be spliced before the path, got: {}",
        stdout
    );
    assert!(
        stderr.contains("(pages 2-5 of book.pdf)"),
        "page note missing from stderr: {}",
        stderr
    );
}

#[test]
fn test_whitelist_denies_unlisted_filter() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let script = write_script(tmp.path(), "fake-pdftotext.sh", "echo 'should never run'");
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["pdftotext"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
"#,
            script
        ),
    );

    let (stdout, stderr, success) = run_docfort(&config_path, &["read", "book.pdf"]);
    assert!(!success, "unlisted filter must be refused");
    assert!(
        stderr.contains("denied by policy"),
        "expected policy refusal, got: {}",
        stderr
    );
    assert!(!stdout.contains("should never run"));
}

#[test]
fn test_blacklist_denies_by_substring() {
    let tmp = TempDir::new().unwrap();
    let kb = seed_root(&tmp);
    fs::write(kb.join("notes.rtf"), b"{\\rtf1 placeholder}").unwrap();
    let denied = write_script(tmp.path(), "fake-curl-fetch.sh", "echo 'fetched'");
    let allowed = write_script(tmp.path(), "fake-rtf2text.sh", "echo 'rtf text'");
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "blacklist"
deny = ["curl"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]

[[filters.spec]]
extensions = ["rtf"]
command = ["{}", "{{path}}"]
"#,
            denied, allowed
        ),
    );

    // "fake-curl-fetch.sh" contains "curl", so it's refused.
    let (_, stderr, success) = run_docfort(&config_path, &["read", "book.pdf"]);
    assert!(!success);
    assert!(stderr.contains("denied by policy"), "got: {}", stderr);

    // The other filter doesn't match any deny entry and runs.
    let (stdout, stderr, success) = run_docfort(&config_path, &["read", "notes.rtf"]);
    assert!(success, "allowed filter failed: {}", stderr);
    assert!(stdout.contains("rtf text"));
}

#[test]
fn test_filter_timeout_is_enforced() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let script = write_script(tmp.path(), "fake-pdftotext.sh", "sleep 5\necho 'too late'");
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
timeout_secs = 1
"#,
            script
        ),
    );

    let (stdout, stderr, success) = run_docfort(&config_path, &["read", "book.pdf"]);
    assert!(!success, "runaway filter must not succeed");
    assert!(
        stderr.contains("timed out"),
        "expected timeout error, got: {}",
        stderr
    );
    assert!(!stdout.contains("too late"));
}

#[test]
fn test_filter_failure_surfaces_exit_status() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let script = write_script(
        tmp.path(),
        "fake-pdftotext.sh",
        "echo 'corrupt xref table' >&2\nexit 3",
    );
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
"#,
            script
        ),
    );

    let (_, stderr, success) = run_docfort(&config_path, &["read", "book.pdf"]);
    assert!(!success);
    assert!(
        stderr.contains("exited with status 3"),
        "expected exit status in error, got: {}",
        stderr
    );
    assert!(
        stderr.contains("corrupt xref table"),
        "filter stderr should be carried into the error: {}",
        stderr
    );
}

#[test]
fn test_info_command_reports_page_count() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let extract = write_script(tmp.path(), "fake-pdftotext.sh", "echo 'text'");
    let info = write_script(
        tmp.path(),
        "fake-pdfinfo.sh",
        "echo 'Title: Manual'\necho 'Pages:          42'",
    );
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh", "fake-pdfinfo.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
info_command = ["{}", "{{path}}"]
"#,
            extract, info
        ),
    );

    let (stdout, stderr, success) = run_docfort(&config_path, &["info", "book.pdf"]);
    assert!(success, "info failed: {}", stderr);
    assert!(stdout.contains("format:    pdf"));
    assert!(
        stdout.contains("pages:     42"),
        "page count missing, got: {}",
        stdout
    );
}

#[test]
fn test_unauthorized_info_command_is_skipped() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let extract = write_script(tmp.path(), "fake-pdftotext.sh", "echo 'text'");
    let info = write_script(tmp.path(), "fake-pdfinfo.sh", "echo 'Pages: 42'");
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
info_command = ["{}", "{{path}}"]
"#,
            extract, info
        ),
    );

    // Metadata still comes back; only the page count is dropped.
    let (stdout, stderr, success) = run_docfort(&config_path, &["info", "book.pdf"]);
    assert!(success, "info should succeed without the page count: {}", stderr);
    assert!(stdout.contains("format:    pdf"));
    assert!(
        !stdout.contains("pages:"),
        "unauthorized info command must not produce a page count: {}",
        stdout
    );
}

#[test]
fn test_direct_formats_bypass_the_policy() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    // Nothing whitelisted at all: plain text never spawns a process.
    let config_path = write_config(
        &tmp,
        r#"[filters.policy]
mode = "whitelist"
allow = []

[[filters.spec]]
extensions = ["txt"]
"#,
    );

    let (stdout, stderr, success) = run_docfort(&config_path, &["read", "readme.txt"]);
    assert!(success, "direct read failed: {}", stderr);
    assert!(stdout.contains("Plain text document."));
}

#[test]
fn test_filter_environment_is_sanitized() {
    let tmp = TempDir::new().unwrap();
    seed_root(&tmp);
    let script = write_script(
        tmp.path(),
        "fake-pdftotext.sh",
        r#"printf 'HOME=[%s] LEAK=[%s] PATH_SET=[%s]\n' "$HOME" "$DOCFORT_LEAK" "${PATH:+yes}""#,
    );
    let config_path = write_config(
        &tmp,
        &format!(
            r#"[filters.policy]
mode = "whitelist"
allow = ["fake-pdftotext.sh"]

[[filters.spec]]
extensions = ["pdf"]
command = ["{}", "{{path}}"]
"#,
            script
        ),
    );

    let (stdout, stderr, success) = run_docfort_with_env(
        &config_path,
        &["read", "book.pdf"],
        &[("DOCFORT_LEAK", "secret")],
    );
    assert!(success, "read failed: {}", stderr);
    assert!(
        stdout.contains("HOME=[] LEAK=[] PATH_SET=[yes]"),
        "filter environment should be cleared except PATH, got: {}",
        stdout
    );
}
