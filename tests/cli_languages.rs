use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn codestat_bin() -> &'static str {
    env!("CARGO_BIN_EXE_codestat")
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write");
}

/// Parses the per-language report blocks into
/// title -> (files, code lines, comment lines).
fn parse_blocks(stdout: &str) -> HashMap<String, (u64, u64, u64)> {
    let lines: Vec<&str> = stdout.lines().collect();
    let mut out = HashMap::new();
    let mut i = 0;
    while i + 4 < lines.len() {
        let title = lines[i].trim_end();
        let underline = lines[i + 1].trim_end();
        let is_block = !title.is_empty()
            && underline.len() == title.len()
            && underline.chars().all(|c| c == '-');
        if !is_block {
            i += 1;
            continue;
        }
        let field = |line: &str| {
            line.rsplit_once(':')
                .and_then(|(_, value)| value.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };
        out.insert(
            title.to_string(),
            (field(lines[i + 2]), field(lines[i + 3]), field(lines[i + 4])),
        );
        i += 5;
    }
    out
}

const C_SAMPLE: &str = "\
/*****************************************************
 * Banner line, held back as part of the file header *
 * Banner line				                          *
 * Banner line				                          *
 *****************************************************/

#include <stdio.h>

// comment 1
int add(int a, int b) {
	return a + b;
}

/* comment 2
 * comment 3 */
int main(void) {
	// comment 4
	printf(\"%d\\n\", add(1, 2));
	return 0;
}
// comment 5
";

#[test]
fn cli_c_reference_counts() {
    let td = TempDir::new().unwrap();
    write_file(&td.path().join("sample.c"), C_SAMPLE);

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("C/C++").copied(), Some((1, 8, 5)));
}

#[test]
fn cli_fortran_directives_count_as_code() {
    let td = TempDir::new().unwrap();
    write_file(
        &td.path().join("m.f90"),
        "program t\n!DIR$ SOME_DIRECTIVE\nx = 1\n! note\nend program t\n",
    );

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("Fortran 90").copied(), Some((1, 4, 1)));
}

#[test]
fn cli_pascal_directives_count_as_code() {
    let td = TempDir::new().unwrap();
    write_file(
        &td.path().join("demo.pas"),
        "program Demo;\n(*$DEFINE X*)\n{ note }\nbegin\nend.\n",
    );

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("Pascal").copied(), Some((1, 4, 1)));
}

#[test]
fn cli_php_opening_tag_is_code() {
    let td = TempDir::new().unwrap();
    write_file(
        &td.path().join("index.php"),
        "<?php\n// banner, dropped with the header\n\necho 'hi';\n// kept\n",
    );

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("PHP").copied(), Some((1, 2, 1)));
}

#[test]
fn cli_script_and_sql_and_css() {
    let td = TempDir::new().unwrap();
    write_file(
        &td.path().join("tool.py"),
        "#!/usr/bin/env python3\n# banner\nprint('x')\n# done\n",
    );
    write_file(&td.path().join("q.sql"), "-- header\nSELECT 1;\n-- note\n");
    write_file(
        &td.path().join("site.css"),
        "/* palette */\nbody { margin: 0; }\n",
    );

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("Python").copied(), Some((1, 1, 3)));
    assert_eq!(blocks.get("SQL").copied(), Some((1, 1, 2)));
    assert_eq!(blocks.get("CSS").copied(), Some((1, 1, 1)));
}

#[test]
fn cli_groups_extensions_by_language() {
    let td = TempDir::new().unwrap();
    write_file(&td.path().join("a.c"), "int a;\n");
    write_file(&td.path().join("b.cpp"), "int b;\n// c\n");
    write_file(&td.path().join("h.hpp"), "int h;\n");
    write_file(&td.path().join("app.kt"), "fun main() {}\n// k\n");
    write_file(&td.path().join("t.ts"), "const x: number = 1;\n// t\n");

    let out = Command::new(codestat_bin())
        .arg(td.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let blocks = parse_blocks(&String::from_utf8_lossy(&out.stdout));
    assert_eq!(blocks.get("C/C++").copied(), Some((3, 3, 1)));
    assert_eq!(blocks.get("Kotlin").copied(), Some((1, 1, 1)));
    assert_eq!(blocks.get("TypeScript").copied(), Some((1, 1, 1)));
}
