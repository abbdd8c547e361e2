/// Grading Aggregator - Test Case Driving and Scoring
///
/// **Core Responsibility:**
/// Run a submission against an ordered list of test cases and reduce the
/// outcomes to a `SubmissionVerdict`.
///
/// **Scoring Rules:**
/// - A case passes only when the executor reports `Accepted` and the
///   normalized outputs are equal
/// - score = tests_passed / tests_total * 100 (0 for an empty suite)
/// - status: `Passed` when score >= pass threshold (default 80), else `Failed`
/// - `InternalError` cases count as failed; grading never aborts early
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace (covers \n vs \r\n at the ends)
/// - Case sensitive, internal whitespace preserved
///
/// **Empty Suite:**
/// One bare execution with no mocked input; its terminal status maps straight
/// to the verdict (`Accepted` → Passed, `InternalError` → Error, else Failed).
///
/// Cases run sequentially: the executor is a single rate-limited resource and
/// `aggregate_wall_time_ms` is the sum of per-case wall times.

use crate::client::ExecutionClient;
use crate::harness::HarnessInjector;
use crate::languages::LanguageRegistry;
use codelab_common::config::GradingConfig;
use codelab_common::types::{
    ExecutionOutcome, ExecutionRequest, SubmissionVerdict, TerminalStatus, TestCase,
    TestCaseResult, VerdictStatus,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Normalize output string for comparison
pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Percentage of passing cases, 0 for an empty suite
pub fn score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 * 100.0) / total as f64
}

/// Evaluate one test case from its execution outcome
pub fn evaluate_case(index: usize, test_case: &TestCase, outcome: &ExecutionOutcome) -> TestCaseResult {
    let actual = normalize_output(&outcome.stdout);
    let expected = normalize_output(&test_case.expected_output);

    let passed = outcome.is_accepted() && actual == expected;

    let error = if outcome.is_accepted() {
        None
    } else {
        Some(
            outcome
                .message
                .clone()
                .unwrap_or_else(|| outcome.status.to_string()),
        )
    };

    TestCaseResult {
        index,
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output: actual.to_string(),
        passed,
        status: outcome.status,
        wall_time_ms: outcome.wall_time_ms,
        error,
    }
}

/// Reduce ordered per-case results to a verdict
pub fn aggregate(test_results: Vec<TestCaseResult>, pass_threshold: f64) -> SubmissionVerdict {
    let tests_total = test_results.len();
    let tests_passed = test_results.iter().filter(|r| r.passed).count();
    let aggregate_wall_time_ms = test_results.iter().map(|r| r.wall_time_ms).sum();
    let score = score(tests_passed, tests_total);

    let status = if tests_total > 0 && score >= pass_threshold {
        VerdictStatus::Passed
    } else {
        VerdictStatus::Failed
    };

    SubmissionVerdict {
        status,
        test_results,
        tests_passed,
        tests_total,
        score,
        aggregate_wall_time_ms,
        run_outcome: None,
    }
}

/// Verdict for a lesson without test cases
pub fn verdict_from_bare_run(outcome: ExecutionOutcome) -> SubmissionVerdict {
    let status = match outcome.status {
        TerminalStatus::Accepted => VerdictStatus::Passed,
        TerminalStatus::InternalError => VerdictStatus::Error,
        _ => VerdictStatus::Failed,
    };

    SubmissionVerdict {
        status,
        test_results: Vec::new(),
        tests_passed: 0,
        tests_total: 0,
        score: 0.0,
        aggregate_wall_time_ms: outcome.wall_time_ms,
        run_outcome: Some(outcome),
    }
}

pub struct GradingAggregator {
    client: Arc<ExecutionClient>,
    registry: Arc<LanguageRegistry>,
    harness: Arc<HarnessInjector>,
    config: GradingConfig,
}

impl GradingAggregator {
    pub fn new(
        client: Arc<ExecutionClient>,
        registry: Arc<LanguageRegistry>,
        harness: Arc<HarnessInjector>,
        config: GradingConfig,
    ) -> Self {
        Self {
            client,
            registry,
            harness,
            config,
        }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    #[instrument(
        skip(self, source_code, test_cases),
        fields(language = %language, tests = test_cases.len())
    )]
    pub async fn grade(
        &self,
        source_code: &str,
        language: &str,
        test_cases: &[TestCase],
    ) -> SubmissionVerdict {
        let runtime_id = self.registry.resolve_runtime_id(language);

        if test_cases.is_empty() {
            let request = ExecutionRequest {
                runtime_id,
                source_code: source_code.to_string(),
                stdin: None,
            };
            let outcome = self.client.run(&request).await;
            let verdict = verdict_from_bare_run(outcome);
            info!(status = %verdict.status, "Graded submission without test cases");
            return verdict;
        }

        let mut results = Vec::with_capacity(test_cases.len());

        for (index, test_case) in test_cases.iter().enumerate() {
            let request = ExecutionRequest {
                runtime_id,
                source_code: self.harness.inject(language, source_code, &test_case.input),
                stdin: self
                    .config
                    .forward_stdin
                    .then(|| test_case.input.clone()),
            };

            let outcome = self.client.run(&request).await;
            let result = evaluate_case(index, test_case, &outcome);

            if result.passed {
                debug!(index = index, wall_time_ms = result.wall_time_ms, "Test case passed");
            } else {
                debug!(
                    index = index,
                    status = %result.status,
                    expected = %normalize_output(&test_case.expected_output),
                    actual = %result.actual_output,
                    "Test case failed"
                );
            }

            results.push(result);
        }

        let verdict = aggregate(results, self.config.pass_threshold);
        info!(
            status = %verdict.status,
            passed = verdict.tests_passed,
            total = verdict.tests_total,
            score = verdict.score,
            wall_time_ms = verdict.aggregate_wall_time_ms,
            "Graded submission"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockExecutorBackend, PollBudget, SubmissionSnapshot};
    use crate::decoder::{OutputEncoding, RawField};
    use std::sync::Mutex;

    fn make_case(input: &str, expected_output: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected_output.to_string(),
        }
    }

    fn make_outcome(status: TerminalStatus, stdout: &str, wall_time_ms: u64) -> ExecutionOutcome {
        ExecutionOutcome {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
            compile_output: String::new(),
            message: None,
            wall_time_ms,
            cpu_time_secs: None,
            memory_kb: None,
        }
    }

    fn make_result(index: usize, passed: bool) -> TestCaseResult {
        evaluate_case(
            index,
            &make_case("", "ok"),
            &make_outcome(
                TerminalStatus::Accepted,
                if passed { "ok" } else { "nope" },
                10,
            ),
        )
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("hello\r\n"), "hello");
        assert_eq!(normalize_output("\nhello world\n"), "hello world");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_evaluate_case_with_whitespace() {
        let result = evaluate_case(
            0,
            &make_case("5\n3", "8"),
            &make_outcome(TerminalStatus::Accepted, "  8 \n", 12),
        );
        assert!(result.passed);
        assert_eq!(result.actual_output, "8");
        assert_eq!(result.wall_time_ms, 12);
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_evaluate_case_is_case_sensitive() {
        let result = evaluate_case(
            0,
            &make_case("", "Hello"),
            &make_outcome(TerminalStatus::Accepted, "hello", 1),
        );
        assert!(!result.passed);
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_matching_output_with_runtime_error_fails() {
        let mut outcome = make_outcome(TerminalStatus::RuntimeError, "8", 3);
        outcome.message = Some("Traceback".to_string());

        let result = evaluate_case(1, &make_case("", "8"), &outcome);
        assert!(!result.passed);
        assert_eq!(result.status, TerminalStatus::RuntimeError);
        assert_eq!(result.error.as_deref(), Some("Traceback"));
    }

    #[test]
    fn test_error_falls_back_to_status_name() {
        let result = evaluate_case(
            0,
            &make_case("", ""),
            &make_outcome(TerminalStatus::MemoryLimitExceeded, "", 3),
        );
        assert_eq!(result.error.as_deref(), Some("memory_limit_exceeded"));
    }

    #[test]
    fn test_score_guards_empty_suite() {
        assert_eq!(score(0, 0), 0.0);
        assert_eq!(score(2, 2), 100.0);
        assert_eq!(score(1, 2), 50.0);
        assert_eq!(score(4, 5), 80.0);
    }

    #[test]
    fn test_aggregate_counts_and_threshold() {
        for total in 1..=10usize {
            for passed in 0..=total {
                let results: Vec<TestCaseResult> =
                    (0..total).map(|i| make_result(i, i < passed)).collect();
                let verdict = aggregate(results, 80.0);

                let expected_score = passed as f64 / total as f64 * 100.0;
                assert!((verdict.score - expected_score).abs() < 1e-9);
                assert_eq!(verdict.tests_passed, passed);
                assert_eq!(verdict.tests_total, total);
                assert_eq!(
                    verdict.status == VerdictStatus::Passed,
                    passed * 100 >= total * 80,
                    "{passed}/{total}"
                );
            }
        }
    }

    #[test]
    fn test_aggregate_sums_wall_time() {
        let verdict = aggregate(vec![make_result(0, true), make_result(1, false)], 80.0);
        assert_eq!(verdict.aggregate_wall_time_ms, 20);
        assert_eq!(verdict.status, VerdictStatus::Failed);
        assert!(verdict.run_outcome.is_none());
    }

    #[test]
    fn test_custom_threshold() {
        let verdict = aggregate(vec![make_result(0, true), make_result(1, false)], 50.0);
        assert_eq!(verdict.status, VerdictStatus::Passed);
    }

    #[test]
    fn test_bare_run_mapping() {
        let accepted = verdict_from_bare_run(make_outcome(TerminalStatus::Accepted, "hi", 40));
        assert_eq!(accepted.status, VerdictStatus::Passed);
        assert_eq!(accepted.score, 0.0);
        assert_eq!(accepted.tests_total, 0);
        assert_eq!(accepted.aggregate_wall_time_ms, 40);
        assert_eq!(accepted.run_outcome.unwrap().stdout, "hi");

        let compile = verdict_from_bare_run(make_outcome(TerminalStatus::CompileError, "", 1));
        assert_eq!(compile.status, VerdictStatus::Failed);

        let tle = verdict_from_bare_run(make_outcome(TerminalStatus::TimeLimitExceeded, "", 1));
        assert_eq!(tle.status, VerdictStatus::Failed);

        let internal = verdict_from_bare_run(ExecutionOutcome::internal_error("boom", 1));
        assert_eq!(internal.status, VerdictStatus::Error);
    }

    /// Backend that "runs" every job by echoing the sum of its stdin
    fn summing_backend(seen: Arc<Mutex<Vec<ExecutionRequest>>>) -> MockExecutorBackend {
        let mut backend = MockExecutorBackend::new();
        let submitted = seen.clone();
        backend.expect_submit().returning(move |request| {
            let mut submitted = submitted.lock().unwrap();
            submitted.push(request.clone());
            Ok((submitted.len() - 1).to_string())
        });
        backend.expect_poll().returning(move |token| {
            let index: usize = token.parse().unwrap();
            let stdin = seen.lock().unwrap()[index].stdin.clone().unwrap_or_default();
            let sum: i64 = stdin.split_whitespace().filter_map(|t| t.parse::<i64>().ok()).sum();
            let mut snapshot = SubmissionSnapshot::with_status(3, "Accepted");
            snapshot.stdout = Some(RawField::Text(format!("{}\n", sum)));
            Ok(snapshot)
        });
        backend
    }

    fn aggregator(backend: MockExecutorBackend) -> GradingAggregator {
        let client = ExecutionClient::new(Arc::new(backend), PollBudget::default(), OutputEncoding::Plain);
        GradingAggregator::new(
            Arc::new(client),
            Arc::new(LanguageRegistry::builtin(71)),
            Arc::new(HarnessInjector::new()),
            GradingConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_grade_runs_cases_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let grader = aggregator(summing_backend(seen.clone()));

        let cases = vec![
            make_case("5\n3", "8"),
            make_case("1\n1", "3"),
            make_case("10\n-2", "8"),
        ];
        let verdict = grader.grade("print(int(input()) + int(input()))", "Python", &cases).await;

        assert_eq!(verdict.tests_total, 3);
        assert_eq!(verdict.tests_passed, 2);
        for (i, result) in verdict.test_results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert!(!verdict.test_results[1].passed);
        assert_eq!(verdict.test_results[1].actual_output, "2");
        assert_eq!(verdict.status, VerdictStatus::Failed);
        assert_eq!(verdict.aggregate_wall_time_ms, 3000);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|r| r.runtime_id == 71));
        assert_eq!(seen[2].stdin.as_deref(), Some("10\n-2"));
        assert!(seen[0].source_code.contains("_harness_lines"));
        assert!(seen[0].source_code.ends_with("print(int(input()) + int(input()))"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grade_without_forwarded_stdin() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = ExecutionClient::new(
            Arc::new(summing_backend(seen.clone())),
            PollBudget::default(),
            OutputEncoding::Plain,
        );
        let grader = GradingAggregator::new(
            Arc::new(client),
            Arc::new(LanguageRegistry::builtin(71)),
            Arc::new(HarnessInjector::new()),
            GradingConfig {
                forward_stdin: false,
                ..GradingConfig::default()
            },
        );

        grader.grade("x", "java", &[make_case("1", "1")]).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].stdin, None);
        assert_eq!(seen[0].runtime_id, 62);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grade_continues_after_internal_error() {
        let mut backend = MockExecutorBackend::new();
        let mut calls = 0;
        backend.expect_submit().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(crate::client::TransportError::MissingToken)
            } else {
                Ok("t".to_string())
            }
        });
        backend.expect_poll().returning(|_| {
            let mut snapshot = SubmissionSnapshot::with_status(3, "Accepted");
            snapshot.stdout = Some(RawField::Text("ok".to_string()));
            Ok(snapshot)
        });

        let cases = vec![make_case("", "ok"), make_case("", "ok")];
        let verdict = aggregator(backend).grade("puts 'ok'", "ruby", &cases).await;

        assert_eq!(verdict.tests_total, 2);
        assert_eq!(verdict.tests_passed, 1);
        assert_eq!(verdict.test_results[0].status, TerminalStatus::InternalError);
        assert!(verdict.test_results[0].error.is_some());
        assert!(verdict.test_results[1].passed);
        assert_eq!(verdict.score, 50.0);
        assert_eq!(verdict.status, VerdictStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grade_empty_suite_runs_bare_source() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let grader = aggregator(summing_backend(seen.clone()));

        let verdict = grader.grade("print(0)", "python", &[]).await;

        assert_eq!(verdict.status, VerdictStatus::Passed);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.tests_total, 0);
        assert!(verdict.test_results.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source_code, "print(0)");
        assert_eq!(seen[0].stdin, None);
    }
}
