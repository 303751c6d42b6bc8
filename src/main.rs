//! Line-of-code and comment metrics for source trees.
//!
//! Walks a set of files and directories, classifies every line of each
//! recognised source file as code or comment, and prints per-language
//! totals together with a comment/code ratio.
//!
//! Supported languages: C/C++, C#, CSS, CUDA, Fortran 90, Java,
//! JavaScript, Kotlin, Pascal, PHP, Python, Shell, SQL, TypeScript.

use clap::Parser;
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use colored::*;
use glob::Pattern;
use regex::Regex;

/// Fortran 90 comment token: a `!` that does not introduce a compiler
/// directive (`!DIR$ ...`, `!$OMP ...`). The token itself is capture
/// group 1; the alternation rejects a bang followed by `\w+$` or `$\w+`.
const FORTRAN_LINE_COMMENT: &str = r"(!)(?:\w+[^\w$]|\w+$|[^\w$]|\$[^\w]|\$$|$)";

/// Pascal block-comment openers `(*` and `{`, except when immediately
/// followed by `$` (compiler directives such as `(*$DEFINE X*)`).
const PASCAL_BLOCK_BEGIN: &str = r"(\(\*|\{)(?:[^$]|$)";

/// Pascal block-comment closers `*)` and `}`.
const PASCAL_BLOCK_END: &str = r"(\*\)|\})";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Line-of-code and comment metrics for multi-language source trees",
    long_about = "Counts code lines and comment lines per language across a set of files \
and directories. Supported languages: C/C++, C#, CSS, CUDA, Fortran 90, Java, JavaScript, \
Kotlin, Pascal, PHP, Python, Shell, SQL, TypeScript."
)]
struct Args {
    /// Files and/or directories to analyse.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Print per-file counts while scanning.
    #[arg(short, long)]
    verbose: bool,

    /// Do not descend into subdirectories.
    #[arg(short = 'n', long)]
    non_recursive: bool,

    /// Maximum directory recursion depth.
    #[arg(short = 'd', long, default_value = "100")]
    max_depth: usize,

    /// Only count files whose name matches this glob pattern.
    #[arg(short = 'f', long)]
    filespec: Option<String>,
}

/// Span of a comment token on a line, as byte offsets into the trimmed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TokenMatch {
    start: usize,
    end: usize,
}

/// Locates the first occurrence of a comment token on a line.
///
/// Matchers are pure and total: any string input yields either a span or
/// nothing. Regex matchers carry the token itself in capture group 1 so
/// that scanning can resume right after the token.
#[derive(Debug, Clone)]
enum TokenMatcher {
    None,
    Literal(&'static str),
    Regex(Regex),
}

impl TokenMatcher {
    fn find(&self, line: &str) -> Option<TokenMatch> {
        match self {
            TokenMatcher::None => None,
            TokenMatcher::Literal(token) => line.find(token).map(|start| TokenMatch {
                start,
                end: start + token.len(),
            }),
            TokenMatcher::Regex(re) => re
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| TokenMatch {
                    start: m.start(),
                    end: m.end(),
                }),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, TokenMatcher::None)
    }
}

/// Immutable description of one language's comment dialect.
#[derive(Debug, Clone)]
struct LanguageProfile {
    title: &'static str,
    begin_block: TokenMatcher,
    end_block: TokenMatcher,
    line_comment: TokenMatcher,
    /// Prefix of a mandatory first instruction (e.g. `<?php`) which, on
    /// line 1, counts as code without ending the file header.
    first_instruction: Option<&'static str>,
}

impl LanguageProfile {
    fn keeps_header_open(&self, line: &str) -> bool {
        self.first_instruction
            .map_or(false, |prefix| line.starts_with(prefix))
    }
}

fn c_family(title: &'static str) -> LanguageProfile {
    LanguageProfile {
        title,
        begin_block: TokenMatcher::Literal("/*"),
        end_block: TokenMatcher::Literal("*/"),
        line_comment: TokenMatcher::Literal("//"),
        first_instruction: None,
    }
}

fn line_comment_only(title: &'static str, token: &'static str) -> LanguageProfile {
    LanguageProfile {
        title,
        begin_block: TokenMatcher::None,
        end_block: TokenMatcher::None,
        line_comment: TokenMatcher::Literal(token),
        first_instruction: None,
    }
}

fn regex_token(pattern: &str) -> io::Result<TokenMatcher> {
    let re = Regex::new(pattern).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid token pattern '{}': {}", pattern, err),
        )
    })?;
    Ok(TokenMatcher::Regex(re))
}

/// Extension-keyed table of language profiles, built once at startup.
#[derive(Debug)]
struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
    by_extension: HashMap<&'static str, usize>,
}

impl LanguageRegistry {
    fn build() -> io::Result<Self> {
        let fortran = LanguageProfile {
            title: "Fortran 90",
            begin_block: TokenMatcher::None,
            end_block: TokenMatcher::None,
            line_comment: regex_token(FORTRAN_LINE_COMMENT)?,
            first_instruction: None,
        };
        let pascal = LanguageProfile {
            title: "Pascal",
            begin_block: regex_token(PASCAL_BLOCK_BEGIN)?,
            end_block: regex_token(PASCAL_BLOCK_END)?,
            line_comment: TokenMatcher::Literal("//"),
            first_instruction: None,
        };
        let php = LanguageProfile {
            first_instruction: Some("<?php"),
            ..c_family("PHP")
        };
        let css = LanguageProfile {
            line_comment: TokenMatcher::None,
            ..c_family("CSS")
        };

        let entries: Vec<(LanguageProfile, &'static [&'static str])> = vec![
            (c_family("C/C++"), &["c", "h", "cpp", "hpp"]),
            (c_family("C#"), &["cs"]),
            (css, &["css"]),
            (c_family("CUDA"), &["cu", "cuh"]),
            (fortran, &["f90"]),
            (c_family("Java"), &["java"]),
            (c_family("JavaScript"), &["js", "jsx"]),
            (c_family("Kotlin"), &["kt", "kts"]),
            (pascal, &["pas", "pp"]),
            (php, &["php"]),
            (line_comment_only("Python", "#"), &["py"]),
            (line_comment_only("Shell", "#"), &["sh", "bash", "zsh", "ksh"]),
            (line_comment_only("SQL", "--"), &["sql"]),
            (c_family("TypeScript"), &["ts", "tsx"]),
        ];
        Self::build_from(entries)
    }

    /// Registers the given profiles. Duplicate extensions and one-sided
    /// block-token pairs are configuration errors, fatal at startup.
    fn build_from(entries: Vec<(LanguageProfile, &'static [&'static str])>) -> io::Result<Self> {
        let mut profiles = Vec::with_capacity(entries.len());
        let mut by_extension = HashMap::new();
        for (profile, extensions) in entries {
            if profile.begin_block.is_none() != profile.end_block.is_none() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Language '{}' declares only one of the block-comment tokens",
                        profile.title
                    ),
                ));
            }
            let slot = profiles.len();
            for ext in extensions {
                if by_extension.insert(*ext, slot).is_some() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Extension '{}' is registered twice", ext),
                    ));
                }
            }
            profiles.push(profile);
        }
        Ok(LanguageRegistry {
            profiles,
            by_extension,
        })
    }

    fn len(&self) -> usize {
        self.profiles.len()
    }

    fn profiles(&self) -> &[LanguageProfile] {
        &self.profiles
    }

    /// Case-insensitive extension lookup. Files without a registered
    /// extension are not counted at all.
    fn lookup(&self, path: &Path) -> Option<usize> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.by_extension.get(extension.as_str()).copied()
    }
}

/// Code/comment counts for a single fully-read file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FileTally {
    code_lines: u64,
    comment_lines: u64,
}

/// Aggregated per-language counts, owned by the run loop. A file is
/// committed exactly once, after it has been read to the end.
#[derive(Debug, Default, Clone, Copy)]
struct LocCounter {
    file_count: u64,
    code_lines: u64,
    comment_lines: u64,
}

impl LocCounter {
    fn record(&mut self, tally: FileTally) {
        self.file_count += 1;
        self.code_lines += tally.code_lines;
        self.comment_lines += tally.comment_lines;
    }

    fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// Per-file line classification state machine.
///
/// The machine tracks whether it is inside a block comment and whether it
/// is still in the file header: the leading run of comment lines that is
/// held back until either a code line appears (the run then counts as
/// comments) or a blank line ends it (the run is discarded).
struct LineClassifier<'a> {
    profile: &'a LanguageProfile,
    in_block_comment: bool,
    in_header: bool,
    header_lines: u64,
    line_number: u64,
    tally: FileTally,
}

impl<'a> LineClassifier<'a> {
    fn new(profile: &'a LanguageProfile) -> Self {
        LineClassifier {
            profile,
            in_block_comment: false,
            in_header: true,
            header_lines: 0,
            line_number: 0,
            tally: FileTally::default(),
        }
    }

    fn consume(&mut self, raw_line: &str) {
        self.line_number += 1;
        let line = raw_line.trim();

        // Blank lines count as neither; outside a block comment they also
        // end the header and drop any pending header lines.
        if line.is_empty() {
            if !self.in_block_comment {
                self.in_header = false;
                self.header_lines = 0;
            }
            return;
        }

        // A line starting inside a block comment is a comment line even
        // if code follows the closing token on the same line.
        if self.in_block_comment {
            if self.in_header {
                self.header_lines += 1;
            } else {
                self.tally.comment_lines += 1;
            }
            self.in_block_comment = self.scan_comment_spans(line, 0);
            return;
        }

        let begin = self.profile.begin_block.find(line);
        let single = self.profile.line_comment.find(line);

        let starts_with_comment = matches!(begin, Some(m) if m.start == 0)
            || matches!(single, Some(m) if m.start == 0);
        if starts_with_comment {
            if self.in_header {
                self.header_lines += 1;
            } else {
                self.tally.comment_lines += 1;
            }
        } else {
            self.tally.code_lines += 1;
            if self.in_header && !(self.line_number == 1 && self.profile.keeps_header_open(line)) {
                // Code ends the header; the pending run retroactively
                // counts as comments.
                self.in_header = false;
                self.tally.comment_lines += self.header_lines;
                self.header_lines = 0;
            }
        }

        // A begin token opens a block comment unless a line-comment token
        // sits at or before it, in which case the rest of the line is a
        // line comment instead.
        if let Some(open) = begin {
            let unsuppressed = single.map_or(true, |m| open.start < m.start);
            if unsuppressed {
                self.in_block_comment = self.scan_comment_spans(line, open.end);
            }
        }
    }

    /// Scans the rest of a line while a block comment is open. Every end
    /// token closes the nearest open comment and a later begin token
    /// reopens one, arbitrarily many times per line. Returns whether a
    /// block comment is still open at the end of the line.
    fn scan_comment_spans(&self, line: &str, from: usize) -> bool {
        let mut pos = from;
        loop {
            let Some(close) = self.profile.end_block.find(&line[pos..]) else {
                return true;
            };
            pos += close.end;
            let Some(reopen) = self.profile.begin_block.find(&line[pos..]) else {
                return false;
            };
            pos += reopen.end;
        }
    }

    fn into_tally(self) -> FileTally {
        // An unterminated block comment at EOF is dropped silently, as is
        // a header run never followed by code.
        self.tally
    }
}

/// Classifies a sequence of lines for one language. Stops at the first
/// read error so that a failed file contributes nothing.
fn classify_lines<I>(lines: I, profile: &LanguageProfile) -> io::Result<FileTally>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut classifier = LineClassifier::new(profile);
    for line in lines {
        classifier.consume(&line?);
    }
    Ok(classifier.into_tally())
}

fn classify_file(path: &Path, profile: &LanguageProfile) -> io::Result<FileTally> {
    classify_lines(read_file_lines_lossy(path)?, profile)
}

/// Reads a file's content as lines, converting invalid UTF-8 sequences
/// using replacement characters.
struct LossyLineReader<R: Read> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: Read> LossyLineReader<R> {
    fn new(inner: R) -> Self {
        LossyLineReader {
            reader: BufReader::new(inner),
            buffer: Vec::with_capacity(8 * 1024),
        }
    }
}

impl<R: Read> Iterator for LossyLineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                let text = String::from_utf8_lossy(&self.buffer);
                let line = text.trim_end_matches(['\n', '\r']).to_string();
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

fn read_file_lines_lossy(path: &Path) -> io::Result<LossyLineReader<fs::File>> {
    Ok(LossyLineReader::new(fs::File::open(path)?))
}

fn is_ignored_dir(path: &Path) -> bool {
    let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ignored = [".git", "target", "node_modules", "__pycache__", "venv"];
    ignored.contains(&dir_name)
}

/// Classifies one file and commits it to the matching language counter.
/// Read failures are reported on stderr and leave the counters untouched.
fn process_file(
    path: &Path,
    args: &Args,
    registry: &LanguageRegistry,
    counters: &mut [LocCounter],
    error_count: &mut usize,
) {
    let Some(slot) = registry.lookup(path) else {
        return;
    };
    match classify_file(path, &registry.profiles()[slot]) {
        Ok(tally) => {
            counters[slot].record(tally);
            if args.verbose {
                println!(
                    "{}: {} code, {} comment",
                    path.display(),
                    tally.code_lines,
                    tally.comment_lines
                );
            }
        }
        Err(err) => {
            eprintln!("Error with {}: {}", path.display(), err);
            *error_count += 1;
        }
    }
}

fn scan_directory(
    dir: &Path,
    depth: usize,
    args: &Args,
    registry: &LanguageRegistry,
    counters: &mut [LocCounter],
    filespec: Option<&Pattern>,
    error_count: &mut usize,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("Error with {}: {}", dir.display(), err);
            *error_count += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("Error with {}: {}", dir.display(), err);
                *error_count += 1;
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                eprintln!("Error with {}: {}", path.display(), err);
                *error_count += 1;
                continue;
            }
        };

        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            if args.non_recursive || depth + 1 > args.max_depth || is_ignored_dir(&path) {
                continue;
            }
            scan_directory(
                &path,
                depth + 1,
                args,
                registry,
                counters,
                filespec,
                error_count,
            );
        } else if file_type.is_file() {
            if let Some(spec) = filespec {
                let name = entry.file_name();
                if !spec.matches(&name.to_string_lossy()) {
                    continue;
                }
            }
            process_file(&path, args, registry, counters, error_count);
        }
    }
}

fn build_report(registry: &LanguageRegistry, counters: &[LocCounter]) -> String {
    let mut output = String::new();
    for (profile, counter) in registry.profiles().iter().zip(counters) {
        if counter.is_empty() {
            continue;
        }
        let _ = writeln!(output, "{}", profile.title);
        let _ = writeln!(output, "{}", "-".repeat(profile.title.len()));
        let _ = writeln!(output, "Source files:       {:6}", counter.file_count);
        let _ = writeln!(output, "Code lines:         {:6}", counter.code_lines);
        let _ = writeln!(output, "Comment lines:      {:6}", counter.comment_lines);
        if counter.code_lines == 0 {
            let _ = writeln!(output, "Comment/code ratio: {:>6} %", "-");
        } else {
            let ratio = counter.comment_lines as f64 * 100.0 / counter.code_lines as f64;
            let _ = writeln!(output, "Comment/code ratio: {:6.0} %", ratio);
        }
        let _ = writeln!(output);
    }
    output
}

fn print_overall_summary(counters: &[LocCounter]) {
    let files: u64 = counters.iter().map(|c| c.file_count).sum();
    if files == 0 {
        return;
    }
    let code: u64 = counters.iter().map(|c| c.code_lines).sum();
    let comments: u64 = counters.iter().map(|c| c.comment_lines).sum();
    println!("{}", "Overall Summary:".blue().bold());
    println!("Total source files:  {}", files.to_string().bright_yellow());
    println!("Total code lines:    {}", code.to_string().bright_yellow());
    println!(
        "Total comment lines: {}",
        comments.to_string().bright_yellow()
    );
}

fn main() -> io::Result<()> {
    run_with_args(env::args_os())
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    let registry = LanguageRegistry::build()?;

    let filespec = match args.filespec.as_deref() {
        Some(spec) => Some(Pattern::new(spec).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid filespec pattern '{}': {}", spec, err),
            )
        })?),
        None => None,
    };

    let mut counters = vec![LocCounter::default(); registry.len()];
    let mut error_count = 0usize;

    for root in &args.paths {
        let metadata = fs::metadata(root).map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Cannot access {}: {}", root.display(), err),
            )
        })?;
        if metadata.is_dir() {
            scan_directory(
                root,
                0,
                &args,
                &registry,
                &mut counters,
                filespec.as_ref(),
                &mut error_count,
            );
        } else if metadata.is_file() {
            process_file(root, &args, &registry, &mut counters, &mut error_count);
        }
    }

    print!("{}", build_report(&registry, &counters));
    print_overall_summary(&counters);

    if error_count > 0 {
        eprintln!("{} error(s) encountered", error_count);
    }
    Ok(())
}
