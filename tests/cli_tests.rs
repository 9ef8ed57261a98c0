//! CLI integration tests for arcprobe

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::{fs, io::Write, path::Path};
use tempfile::TempDir;

type Result<T> = anyhow::Result<T>;

fn arcprobe_cmd() -> Command {
    cargo_bin_cmd!("arcprobe")
}

fn write_tgz(path: &Path) -> Result<()> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [("pkg/lib.rs", &b"pub fn f() {}\n"[..]), ("pkg/data.bin", &[0u8; 3000][..])] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        builder.append_data(&mut header, name, data)?;
    }
    let tar = builder.into_inner()?;

    let mut encoder =
        flate2::write::GzEncoder::new(fs::File::create(path)?, flate2::Compression::default());
    encoder.write_all(&tar)?;
    encoder.finish()?;
    Ok(())
}

#[test]
fn test_cli_help() {
    arcprobe_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_cli_version() {
    arcprobe_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arcprobe"));
}

#[test]
fn test_list_help_shows_probe_flags() {
    arcprobe_cmd()
        .args(["list", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--password"))
        .stdout(predicate::str::contains("--ask-password"))
        .stdout(predicate::str::contains("--no-resolve"))
        .stdout(predicate::str::contains("--max-substream-mb"))
        .stdout(predicate::str::contains("--timeout"))
        .stdout(predicate::str::contains("--progress"));
}

#[test]
fn test_detect_tgz_prints_chain() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = temp_dir.path().join("bundle.tgz");
    write_tgz(&archive)?;

    arcprobe_cmd()
        .arg("detect")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Gzip > Tar (2 items)"));
    Ok(())
}

#[test]
fn test_detect_no_resolve_stops_at_wrapper() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = temp_dir.path().join("bundle.tgz");
    write_tgz(&archive)?;

    arcprobe_cmd()
        .args(["d", "--no-resolve"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Gzip (1 items)"));
    Ok(())
}

#[test]
fn test_list_inner_tar() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = temp_dir.path().join("bundle.tgz");
    write_tgz(&archive)?;

    arcprobe_cmd()
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("pkg/lib.rs"))
        .stdout(predicate::str::contains("pkg/data.bin"));
    Ok(())
}

#[test]
fn test_list_verbose_shows_modes_and_total() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let archive = temp_dir.path().join("bundle.tgz");
    write_tgz(&archive)?;

    arcprobe_cmd()
        .args(["-v", "l"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("-rw-r--r--"))
        .stdout(predicate::str::contains("2023-11-14 22:13:20"))
        .stdout(predicate::str::contains("2 items"));
    Ok(())
}

#[test]
fn test_unrecognized_file_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, "definitely not an archive\n")?;

    arcprobe_cmd()
        .arg("detect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized archive format"));
    Ok(())
}

#[test]
fn test_missing_file_fails() {
    arcprobe_cmd()
        .args(["list", "/nonexistent/archive.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
