// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use narwire_utils_test::{CanonicalTempDir, example_tree, vcs_tree};
use rstest::rstest;

const EXAMPLE_SHA256: &str = "c196b965e5024e8b6132f5e36bd9e12c7da4ac736db4635b75ee64b4014f2094";
const EXAMPLE_SHA1: &str = "8da0666665a29960b70c3b7eec953c56a6d553c9";

fn narwire(cwd: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_narwire"));
    cmd.args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env_remove("NARWIRE_CONFIG");
    cmd
}

fn run_ok(cmd: &mut Command) -> Output {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[rstest]
#[case::hex(&[], EXAMPLE_SHA256)]
#[case::base32(&["-f", "base32"], "15109w0v8r7ffmdn7d3dffna8z9cw7cnpqzm69hqnkh2wmjvk5n1")]
#[case::base64(&["--format-output", "base64"], "wZa5ZeUCTothMvXja9nhLH2krHNttGNbde5ktAFPIJQ=")]
#[case::sha1(&["-H", "sha1"], EXAMPLE_SHA1)]
fn test_hash(#[case] flags: &[&str], #[case] expected: &str) {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    let mut args = vec!["nar", "hash"];
    args.extend_from_slice(flags);
    let root = root.to_str().unwrap();
    args.push(root);
    let output = run_ok(&mut narwire(dir.path(), &args));
    assert_eq!(stdout(&output), format!("{expected}\n"));
}

#[test]
fn test_hash_several_algorithms() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    let output = run_ok(&mut narwire(
        dir.path(),
        &["nar", "hash", "-H", "sha256", "-H", "sha1", root.to_str().unwrap()],
    ));
    assert_eq!(
        stdout(&output),
        format!("sha1:{EXAMPLE_SHA1}\nsha256:{EXAMPLE_SHA256}\n")
    );
}

#[test]
fn test_hash_exclude_vcs() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = vcs_tree(dir.path()).unwrap();
    let root = root.to_str().unwrap();
    let excluded = run_ok(&mut narwire(
        dir.path(),
        &["nar", "hash", "-x", "-H", "sha1", root],
    ));
    assert_eq!(stdout(&excluded), "f1b641c46888a1002e340c9425ef8ec890605858\n");
    let included = run_ok(&mut narwire(dir.path(), &["nar", "hash", "-H", "sha1", root]));
    assert_eq!(stdout(&included), "cc199e849878c3f13332fa6d8a24d44ab2e5a4fa\n");
}

#[test]
fn test_config_file_defaults() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    fs::write(
        dir.path().join("narwire.toml"),
        "hash_algorithms = [\"sha1\"]\nlog_level = \"warn\"\n",
    )
    .unwrap();
    let output = run_ok(&mut narwire(dir.path(), &["nar", "hash", root.to_str().unwrap()]));
    assert_eq!(stdout(&output), format!("{EXAMPLE_SHA1}\n"));

    // Flags win over the file
    let output = run_ok(&mut narwire(
        dir.path(),
        &["nar", "hash", "-H", "sha256", root.to_str().unwrap()],
    ));
    assert_eq!(stdout(&output), format!("{EXAMPLE_SHA256}\n"));
}

#[test]
fn test_config_from_env() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "output_format = \"base32\"\n").unwrap();
    let output = run_ok(
        narwire(dir.path(), &["nar", "hash", root.to_str().unwrap()]).env("NARWIRE_CONFIG", &config),
    );
    assert_eq!(
        stdout(&output),
        "15109w0v8r7ffmdn7d3dffna8z9cw7cnpqzm69hqnkh2wmjvk5n1\n"
    );
}

#[test]
fn test_invalid_config_fails() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    fs::write(dir.path().join("narwire.toml"), "workers = 4\n").unwrap();
    let output = narwire(dir.path(), &["nar", "hash", root.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}

#[test]
fn test_missing_path_fails() {
    let dir = CanonicalTempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let output = narwire(dir.path(), &["nar", "hash", missing.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_serialize_then_unpack() {
    let dir = CanonicalTempDir::new().unwrap();
    let root = example_tree(dir.path()).unwrap();
    let nar = dir.path().join("foo.nar");
    run_ok(&mut narwire(
        dir.path(),
        &["nar", "serialize", root.to_str().unwrap(), "-o", nar.to_str().unwrap()],
    ));
    let bytes = fs::read(&nar).unwrap();
    assert_eq!(&bytes[8..21], b"nix-archive-1");

    let stdout_nar = run_ok(&mut narwire(
        dir.path(),
        &["nar", "serialize", root.to_str().unwrap()],
    ));
    assert_eq!(stdout_nar.stdout, bytes);

    let dest = dir.path().join("restored");
    run_ok(&mut narwire(
        dir.path(),
        &["nar", "unpack", nar.to_str().unwrap(), dest.to_str().unwrap()],
    ));
    assert_eq!(fs::read(dest.join("baz")).unwrap(), b"data");
    let output = run_ok(&mut narwire(dir.path(), &["nar", "hash", dest.to_str().unwrap()]));
    assert_eq!(stdout(&output), format!("{EXAMPLE_SHA256}\n"));
}

#[test]
fn test_transcode_round_trip() {
    let dir = CanonicalTempDir::new().unwrap();
    let json = dir.path().join("in.json");
    fs::write(&json, br#"{"swhtype":"bytes","d":"VE"}"#).unwrap();
    let msgpack = dir.path().join("out.msgpack");
    run_ok(&mut narwire(
        dir.path(),
        &[
            "codec",
            "transcode",
            "--from",
            "json",
            "--to",
            "msgpack",
            json.to_str().unwrap(),
            "-o",
            msgpack.to_str().unwrap(),
        ],
    ));
    assert_eq!(fs::read(&msgpack).unwrap(), [0xc4, 0x01, b'a']);

    let output = run_ok(&mut narwire(
        dir.path(),
        &[
            "codec",
            "transcode",
            "--from",
            "msgpack",
            "--to",
            "json",
            msgpack.to_str().unwrap(),
        ],
    ));
    assert_eq!(stdout(&output), r#"{"d":"VE","swhtype":"bytes"}"#);
}

#[test]
fn test_transcode_stdin() {
    let dir = CanonicalTempDir::new().unwrap();
    let mut child = narwire(
        dir.path(),
        &["codec", "transcode", "--from", "json", "--to", "json"],
    )
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .spawn()
    .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"b": 1, "a": {"swhtype": "uuid", "d": "cdd8f804-9db6-40c3-93ab-5955d3836234"}}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        r#"{"a":{"d":"cdd8f804-9db6-40c3-93ab-5955d3836234","swhtype":"uuid"},"b":1}"#
    );
}

#[test]
fn test_transcode_bad_input_fails() {
    let dir = CanonicalTempDir::new().unwrap();
    let input = dir.path().join("bad.json");
    fs::write(&input, b"{").unwrap();
    let output = narwire(
        dir.path(),
        &["codec", "transcode", "--from", "json", "--to", "msgpack", input.to_str().unwrap()],
    )
    .output()
    .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
