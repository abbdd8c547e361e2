// CLI commands for grading submissions and managing the language table
use anyhow::{Context, Result};
use codelab_common::types::{
    ExecutionOutcome, Language, RuntimeId, SubmissionRecord, TestCase, VerdictStatus,
};
use codelab_grader::{LanguageTable, Pipeline};
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

/// Test files are either a bare array or `{"test_cases": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum TestFile {
    List(Vec<TestCase>),
    Wrapped { test_cases: Vec<TestCase> },
}

pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases from {}", path.display()))?;
    let parsed: TestFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test cases in {}", path.display()))?;

    Ok(match parsed {
        TestFile::List(cases) => cases,
        TestFile::Wrapped { test_cases } => test_cases,
    })
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read source file {}", path.display()))
}

/// Language table on disk, or the built-in one when no file exists yet
fn load_table(path: &Path) -> Result<LanguageTable> {
    if path.exists() {
        LanguageTable::load(path)
    } else {
        debug!(path = %path.display(), "No language config yet, starting from built-in table");
        Ok(LanguageTable::builtin())
    }
}

fn display_or_empty(text: &str) -> &str {
    if text.trim().is_empty() {
        "(empty)"
    } else {
        text.trim()
    }
}

pub fn format_verdict(record: &SubmissionRecord) -> String {
    let verdict = &record.verdict;
    let mut out = String::new();

    let _ = writeln!(out, "Submission {}", record.id);
    if let Some(lesson_id) = &record.lesson_id {
        let _ = writeln!(out, "Lesson:     {}", lesson_id);
    }
    let _ = writeln!(out, "Language:   {}", record.language);
    let _ = writeln!(out);

    for result in &verdict.test_results {
        let mark = if result.passed { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "  {} Test {} [{}] {} ms",
            mark, result.index, result.status, result.wall_time_ms
        );
        if !result.passed {
            let _ = writeln!(out, "    Expected: \"{}\"", result.expected_output.trim());
            let _ = writeln!(out, "    Got:      \"{}\"", result.actual_output);
            if let Some(error) = &result.error {
                let _ = writeln!(out, "    Error:    {}", error.trim());
            }
        }
    }

    if let Some(outcome) = &verdict.run_outcome {
        let _ = writeln!(out, "  Run finished with {}", outcome.status);
        if let Some(message) = &outcome.message {
            let _ = writeln!(out, "    {}", message.trim());
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Score: {:.1} ({} / {} passed) in {} ms",
        verdict.score, verdict.tests_passed, verdict.tests_total, verdict.aggregate_wall_time_ms
    );
    let _ = write!(out, "Verdict: {}", verdict.status);
    out
}

pub fn format_outcome(outcome: &ExecutionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {} ({} ms)", outcome.status, outcome.wall_time_ms);
    if outcome.status.is_resource_limit() {
        let _ = writeln!(out, "Program exceeded the executor's resource limits");
    }
    if let Some(time) = outcome.cpu_time_secs {
        let _ = writeln!(out, "CPU time: {:.3} s", time);
    }
    if let Some(memory) = outcome.memory_kb {
        let _ = writeln!(out, "Memory: {} KB", memory);
    }
    if let Some(message) = &outcome.message {
        let _ = writeln!(out, "Message: {}", message.trim());
    }
    let _ = writeln!(out, "--- stdout ---");
    let _ = writeln!(out, "{}", display_or_empty(&outcome.stdout));
    if !outcome.stderr.trim().is_empty() {
        let _ = writeln!(out, "--- stderr ---");
        let _ = writeln!(out, "{}", outcome.stderr.trim());
    }
    if !outcome.compile_output.trim().is_empty() {
        let _ = writeln!(out, "--- compile output ---");
        let _ = writeln!(out, "{}", outcome.compile_output.trim());
    }
    out
}

/// Grade a source file; returns whether the verdict is `Passed`
pub async fn grade(
    pipeline: &Pipeline,
    language: &str,
    source_path: &Path,
    tests_path: Option<&Path>,
    lesson_id: Option<&str>,
    json: bool,
) -> Result<bool> {
    let source_code = read_source(source_path)?;
    let test_cases = match tests_path {
        Some(path) => load_test_cases(path)?,
        None => Vec::new(),
    };

    if !json {
        println!("→ Grading {} against {} test case(s)", source_path.display(), test_cases.len());
    }

    let record = pipeline
        .grade_submission(&source_code, language, lesson_id, &test_cases)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", format_verdict(&record));
    }

    Ok(record.verdict.status == VerdictStatus::Passed)
}

/// Run a source file once; returns whether the executor accepted it
pub async fn run(
    pipeline: &Pipeline,
    language: &str,
    source_path: &Path,
    stdin_path: Option<&Path>,
    json: bool,
) -> Result<bool> {
    let source_code = read_source(source_path)?;
    let stdin = match stdin_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read stdin file {}", path.display()))?,
        ),
        None => None,
    };

    let outcome = pipeline
        .run_adhoc(&source_code, language, stdin.as_deref())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", format_outcome(&outcome));
    }

    Ok(outcome.is_accepted())
}

pub fn add_language(
    config_path: &Path,
    id: &str,
    display_name: Option<&str>,
    runtime_id: RuntimeId,
    ext: &str,
    inactive: bool,
) -> Result<Language> {
    let mut table = load_table(config_path)?;

    table.add(Language {
        id: id.to_string(),
        display_name: display_name.unwrap_or(id).to_string(),
        runtime_id,
        file_extension: ext.to_string(),
        is_active: !inactive,
    })?;
    table.save(config_path)?;

    let added = table
        .languages
        .last()
        .cloned()
        .context("Language table is empty after insert")?;

    println!(
        "✅ Language '{}' added (runtime {}) to {}",
        added.id,
        added.runtime_id,
        config_path.display()
    );
    Ok(added)
}

/// Remove a language. `confirm` is asked before anything is written; returns
/// `None` when the removal was declined.
pub fn remove_language_with(
    config_path: &Path,
    name: &str,
    confirm: impl FnOnce(&Language) -> Result<bool>,
) -> Result<Option<Language>> {
    let mut table = load_table(config_path)?;
    let removed = table.remove(name)?;

    if !confirm(&removed)? {
        println!("❌ Aborted");
        return Ok(None);
    }

    table.save(config_path)?;
    println!("✅ Language '{}' removed from {}", removed.id, config_path.display());
    Ok(Some(removed))
}

pub fn remove_language(config_path: &Path, name: &str, yes: bool) -> Result<Option<Language>> {
    remove_language_with(config_path, name, |language| {
        if yes {
            return Ok(true);
        }

        print!(
            "⚠️  This will remove '{}' (runtime {}) from {}\nContinue? (y/N): ",
            language.id,
            language.runtime_id,
            config_path.display()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    })
}

pub fn format_language_table(languages: &[Language]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<34} {:<8} {:<6} {:<6}",
        "Id", "Name", "Runtime", "Ext", "Active"
    );
    let _ = writeln!(out, "{}", "─".repeat(70));
    for lang in languages {
        let _ = writeln!(
            out,
            "{:<12} {:<34} {:<8} {:<6} {:<6}",
            lang.id,
            lang.display_name,
            lang.runtime_id,
            lang.file_extension,
            if lang.is_active { "yes" } else { "no" }
        );
    }
    out
}

pub fn list_languages(config_path: &Path, all: bool) -> Result<()> {
    let table = load_table(config_path)?;
    let mut languages: Vec<Language> = table
        .languages
        .into_iter()
        .filter(|l| all || l.is_active)
        .collect();
    languages.sort_by(|a, b| a.id.cmp(&b.id));

    if languages.is_empty() {
        println!("No languages configured.");
        println!("\n💡 Add a language with: codelab-cli add-lang --name <id> --runtime-id <id> --ext <ext>");
        return Ok(());
    }

    println!("📋 Configured Languages ({}):\n", config_path.display());
    print!("{}", format_language_table(&languages));
    println!("\n✅ Total: {} language(s)", languages.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelab_common::types::{SubmissionVerdict, TerminalStatus, TestCaseResult};

    #[test]
    fn test_load_test_cases_both_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let list = dir.path().join("list.json");
        fs::write(&list, r#"[{"input": "5\n3", "expected_output": "8"}]"#).unwrap();
        let cases = load_test_cases(&list).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].input, "5\n3");

        let wrapped = dir.path().join("wrapped.json");
        fs::write(
            &wrapped,
            r#"{"test_cases": [{"input": "", "expected_output": "a"}, {"input": "", "expected_output": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(load_test_cases(&wrapped).unwrap().len(), 2);

        assert!(load_test_cases(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_add_starts_from_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("languages.json");

        let added = add_language(&path, "Lua", Some("Lua (5.3.5)"), 64, "lua", false).unwrap();
        assert_eq!(added.id, "lua");
        assert_eq!(added.file_extension, ".lua");

        let table = LanguageTable::load(&path).unwrap();
        assert!(table.languages.iter().any(|l| l.id == "python"));
        assert!(table.languages.iter().any(|l| l.id == "lua"));

        assert!(add_language(&path, "lua", None, 64, ".lua", false).is_err());
    }

    #[test]
    fn test_remove_declined_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.json");
        LanguageTable::builtin().save(&path).unwrap();

        let declined = remove_language_with(&path, "go", |_| Ok(false)).unwrap();
        assert!(declined.is_none());
        assert!(LanguageTable::load(&path).unwrap().languages.iter().any(|l| l.id == "go"));

        let removed = remove_language(&path, "golang", true).unwrap().unwrap();
        assert_eq!(removed.runtime_id, 60);
        assert!(!LanguageTable::load(&path).unwrap().languages.iter().any(|l| l.id == "go"));

        assert!(remove_language(&path, "go", true).is_err());
    }

    #[test]
    fn test_language_table_format() {
        let table = LanguageTable::builtin();
        let text = format_language_table(&table.languages);
        assert!(text.starts_with("Id"));
        assert!(text.contains("Python (3.8.1)"));
        assert_eq!(text.lines().count(), table.languages.len() + 2);
    }

    #[test]
    fn test_verdict_report() {
        let verdict = SubmissionVerdict {
            status: VerdictStatus::Failed,
            test_results: vec![
                TestCaseResult {
                    index: 0,
                    input: "5\n3".to_string(),
                    expected_output: "8".to_string(),
                    actual_output: "8".to_string(),
                    passed: true,
                    status: TerminalStatus::Accepted,
                    wall_time_ms: 1200,
                    error: None,
                },
                TestCaseResult {
                    index: 1,
                    input: "1\n1".to_string(),
                    expected_output: "2\n".to_string(),
                    actual_output: String::new(),
                    passed: false,
                    status: TerminalStatus::RuntimeError,
                    wall_time_ms: 900,
                    error: Some("ValueError".to_string()),
                },
            ],
            tests_passed: 1,
            tests_total: 2,
            score: 50.0,
            aggregate_wall_time_ms: 2100,
            run_outcome: None,
        };
        let record = SubmissionRecord::new(Some("sums".to_string()), "python", verdict);

        let report = format_verdict(&record);
        assert!(report.contains("Lesson:     sums"));
        assert!(report.contains("✓ Test 0 [accepted] 1200 ms"));
        assert!(report.contains("✗ Test 1 [runtime_error] 900 ms"));
        assert!(report.contains("Expected: \"2\""));
        assert!(report.contains("Error:    ValueError"));
        assert!(report.contains("Score: 50.0 (1 / 2 passed) in 2100 ms"));
        assert!(report.ends_with("Verdict: failed"));
    }

    #[test]
    fn test_outcome_report() {
        let mut outcome = ExecutionOutcome::internal_error("execution timeout: no result after 20 polls", 20000);
        let report = format_outcome(&outcome);
        assert!(report.starts_with("Status: internal_error (20000 ms)"));
        assert!(report.contains("Message: execution timeout"));
        assert!(report.contains("(empty)"));

        outcome.status = TerminalStatus::Accepted;
        outcome.message = None;
        outcome.stdout = "42\n".to_string();
        outcome.cpu_time_secs = Some(0.0123);
        let report = format_outcome(&outcome);
        assert!(report.contains("CPU time: 0.012 s"));
        assert!(report.contains("42"));
        assert!(!report.contains("stderr"));
        assert!(!report.contains("resource limits"));

        outcome.status = TerminalStatus::MemoryLimitExceeded;
        let report = format_outcome(&outcome);
        assert!(report.contains("Program exceeded the executor's resource limits"));
    }
}
