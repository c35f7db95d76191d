use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

static EXPECTED_STDOUT_FILE: &str = "expected-stdout";
static EXPECTED_CSV_FILE: &str = "expected-report.csv";

/// Where every run stores its CSV report, relative to the workspace root
static CSV_REPORT_PATH: &str = "flow-report.csv";

struct TestCase {
    dir: PathBuf,
    name: String,
    args: String,
    expected_stdout: Option<String>,
    expected_csv: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // Missing expectations are only written when explicitly asked for, otherwise the case fails
    let record = std::env::args().skip(1).any(|arg| arg == "--record");

    let mut test_cases = Vec::new();
    let test_dirs =
        std::fs::read_dir("golden-tests/tests").context("golden tests root directory not found")?;
    for entry in test_dirs {
        let path = entry?.path();
        if !path.is_dir() {
            println!(
                "skipping path `{}` because it's not a directory",
                path.display()
            );
            continue;
        }

        let args_path = path.join("args");
        let args = std::fs::read_to_string(&args_path)
            .with_context(|| format!("no `args` file found at `{}`", args_path.display()))?;

        test_cases.push(TestCase {
            name: path.display().to_string(),
            expected_stdout: read_expectation(&path, EXPECTED_STDOUT_FILE)?,
            expected_csv: read_expectation(&path, EXPECTED_CSV_FILE)?,
            dir: path,
            args,
        })
    }

    // Directory iteration order is platform-dependent
    test_cases.sort_by(|a, b| a.name.cmp(&b.name));

    let mut errored = false;
    for test_case in test_cases {
        let name = test_case.name.clone();
        if let Err(e) = run_flowmon_workbench(test_case, record) {
            println!("Error running golden test `{name}`");
            match e {
                TestError::Internal(e) => println!("{e:?}"),
                TestError::Compare(diffs) => {
                    for (file, diff) in diffs {
                        println!("Expected {file} differs from actual output:\n{diff}\n");
                    }
                }
                TestError::MissingExpectations(files) => {
                    println!(
                        "No {} recorded, rerun with `--record` to store the current output",
                        files.join(" or ")
                    );
                }
            }
            errored = true;
        } else {
            println!("{name}: ✅");
        }
    }

    if errored {
        bail!("one or more golden tests failed");
    }

    Ok(())
}

/// Reads an expectation file, if it was already recorded
fn read_expectation(dir: &Path, file: &str) -> anyhow::Result<Option<String>> {
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(None);
    }

    std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read `{}`", path.display()))
        .map(Some)
}

enum TestError {
    Internal(anyhow::Error),
    /// Pairs of expectation file name and diff against the actual output
    Compare(Vec<(&'static str, String)>),
    MissingExpectations(Vec<&'static str>),
}

fn run_flowmon_workbench(test_case: TestCase, record: bool) -> Result<(), TestError> {
    _ = std::fs::remove_file(CSV_REPORT_PATH);

    let output = Command::new("cargo")
        .arg("run")
        .arg("--release")
        .arg("--bin")
        .arg("flowmon-workbench")
        .arg("--")
        .arg("--csv")
        .arg(CSV_REPORT_PATH)
        .args(test_case.args.split_whitespace())
        .output()
        .context("flowmon-workbench process crashed")
        .map_err(TestError::Internal)?;

    if !output.status.success() {
        return Err(TestError::Internal(anyhow::anyhow!(
            "flowmon-workbench exited with {}:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let csv = std::fs::read_to_string(CSV_REPORT_PATH)
        .with_context(|| format!("failed to read {CSV_REPORT_PATH}"))
        .map_err(TestError::Internal)?;

    let mut diffs = Vec::new();
    let mut missing = Vec::new();
    for (file, expected, actual) in [
        (EXPECTED_STDOUT_FILE, test_case.expected_stdout, stdout.as_ref()),
        (EXPECTED_CSV_FILE, test_case.expected_csv, csv.as_str()),
    ] {
        match expected {
            Some(expected) => {
                if expected != actual {
                    diffs.push((file, diff::diff_to_string(&expected, actual)));
                }
            }
            None if !record => missing.push(file),
            None => {
                std::fs::write(test_case.dir.join(file), actual.as_bytes())
                    .with_context(|| format!("failed to persist {file}"))
                    .map_err(TestError::Internal)?;
            }
        }
    }

    if !diffs.is_empty() {
        Err(TestError::Compare(diffs))
    } else if !missing.is_empty() {
        Err(TestError::MissingExpectations(missing))
    } else {
        Ok(())
    }
}

mod diff {
    use console::{Style, style};
    use similar::{ChangeTag, TextDiff};
    use std::fmt::{self, Write};

    struct Line(Option<usize>);

    impl fmt::Display for Line {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self.0 {
                None => write!(f, "    "),
                Some(idx) => write!(f, "{:<4}", idx + 1),
            }
        }
    }

    pub fn diff_to_string(old: &str, new: &str) -> String {
        let mut output = String::new();
        let diff = TextDiff::from_lines(old, new);

        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                _ = writeln!(output, "{:-^1$}", "-", 80);
            }
            for op in group {
                for change in diff.iter_inline_changes(op) {
                    let (sign, s) = match change.tag() {
                        ChangeTag::Delete => ("-", Style::new().red()),
                        ChangeTag::Insert => ("+", Style::new().green()),
                        ChangeTag::Equal => (" ", Style::new().dim()),
                    };
                    _ = write!(
                        output,
                        "{}{} |{}",
                        style(Line(change.old_index())).dim(),
                        style(Line(change.new_index())).dim(),
                        s.apply_to(sign).bold(),
                    );
                    for (emphasized, value) in change.iter_strings_lossy() {
                        if emphasized {
                            _ = write!(output, "{}", s.apply_to(value).underlined().on_black());
                        } else {
                            _ = write!(output, "{}", s.apply_to(value));
                        }
                    }
                    if change.missing_newline() {
                        _ = writeln!(output);
                    }
                }
            }
        }

        output
    }
}
