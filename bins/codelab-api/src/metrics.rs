// Prometheus metrics for grading and ad-hoc runs
use codelab_common::types::{ExecutionOutcome, SubmissionVerdict};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    static ref GRADING_RUNS: IntCounterVec = register_int_counter_vec!(
        "codelab_grading_runs_total",
        "Grading runs by verdict",
        &["verdict"]
    )
    .expect("grading runs counter registers once");
    static ref TEST_CASES: IntCounterVec = register_int_counter_vec!(
        "codelab_test_cases_total",
        "Graded test cases by result",
        &["result"]
    )
    .expect("test cases counter registers once");
    static ref EXECUTOR_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "codelab_executor_outcomes_total",
        "Executor jobs by terminal status",
        &["status"]
    )
    .expect("executor outcomes counter registers once");
    static ref GRADING_DURATION: Histogram = register_histogram!(
        "codelab_grading_duration_seconds",
        "Wall time of a full grading run",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]
    )
    .expect("grading duration histogram registers once");
}

pub fn record_outcome(outcome: &ExecutionOutcome) {
    EXECUTOR_OUTCOMES
        .with_label_values(&[outcome.status.as_str()])
        .inc();
}

pub fn record_verdict(verdict: &SubmissionVerdict, elapsed: Duration) {
    GRADING_RUNS
        .with_label_values(&[verdict.status.as_str()])
        .inc();
    GRADING_DURATION.observe(elapsed.as_secs_f64());

    for result in &verdict.test_results {
        let label = if result.passed { "passed" } else { "failed" };
        TEST_CASES.with_label_values(&[label]).inc();
        EXECUTOR_OUTCOMES
            .with_label_values(&[result.status.as_str()])
            .inc();
    }
    if let Some(outcome) = &verdict.run_outcome {
        record_outcome(outcome);
    }
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    lazy_static::initialize(&GRADING_RUNS);
    lazy_static::initialize(&TEST_CASES);
    lazy_static::initialize(&EXECUTOR_OUTCOMES);
    lazy_static::initialize(&GRADING_DURATION);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
