//! End-to-end tests of the `xtr` binary.

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const SCENARIO: &str = "\
# R1 := 5; R2 := 7; R1 := R1 + R2
movq   $5, %rax
movq   $7,%rcx
addq %rcx, %rax    # sum
retq
";

fn listing(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write listing");
    file
}

fn xtr(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xtr"))
        .args(args)
        .env("RUST_LOG", "xtr=warn")
        .output()
        .expect("run xtr")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_fmt_canonicalises() {
    let file = listing(SCENARIO);
    let out = xtr(&["fmt", file.path().to_str().unwrap()]);
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        "movq $5, %rax\nmovq $7, %rcx\naddq %rcx, %rax\nretq\n"
    );
}

#[test]
fn test_asm_hex_dump() {
    let file = listing(SCENARIO);
    let out = xtr(&["asm", file.path().to_str().unwrap()]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("00000000: 48 c7 c0 05 00 00 00"));
}

#[test]
fn test_instrument_prints_listing() {
    let file = listing(SCENARIO);
    let out = xtr(&[
        "instrument",
        file.path().to_str().unwrap(),
        "--track",
        "rax,rcx",
        "--before",
        "0,2",
        "--after",
        "2",
    ]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("pushfq"));
    assert!(text.contains("addq %rcx, %rax"));
    assert!(text.starts_with("leaq -128(%rsp), %rsp\n"));
}

#[test]
fn test_run_in_interpreter() {
    let file = listing(SCENARIO);
    let out = xtr(&[
        "run",
        file.path().to_str().unwrap(),
        "--track",
        "rax,rcx",
        "--before",
        "0,2",
        "--after",
        "2",
        "--reg",
        "rax=1",
    ]);
    assert!(out.status.success());
    let text = stdout(&out);
    let rows: Vec<&str> = text.lines().skip(2).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("0x1"));
    assert!(rows[1].contains("0xc"));
}

#[test]
fn test_errors_exit_with_failure() {
    let file = listing("movq $5, %xax\n");
    let out = xtr(&["fmt", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));

    let file = listing(SCENARIO);
    let out = xtr(&["instrument", file.path().to_str().unwrap(), "--before", "9"]);
    assert_eq!(out.status.code(), Some(1));

    let out = xtr(&["fmt", "/nonexistent/listing.s"]);
    assert_eq!(out.status.code(), Some(1));
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
#[test]
fn test_run_natively() {
    let file = listing(SCENARIO);
    let out = xtr(&[
        "run",
        file.path().to_str().unwrap(),
        "--native",
        "--track",
        "rax,rcx",
        "--before",
        "2",
        "--after",
        "2",
    ]);
    assert!(out.status.success());
    let text = stdout(&out);
    let row = text.lines().nth(2).unwrap();
    let cells: Vec<&str> = row.split('|').map(str::trim).filter(|c| !c.is_empty()).collect();
    assert_eq!(cells[1], "2");
    assert_eq!(&cells[3..], ["0x5", "0x7", "0xc", "0x7"]);
}
