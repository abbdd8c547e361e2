// Entry points used by the API and the CLI
use crate::client::ExecutionClient;
use crate::evaluator::GradingAggregator;
use crate::harness::HarnessInjector;
use crate::languages::LanguageRegistry;
use anyhow::{Context, Result};
use codelab_common::config::{languages_config_path, ExecutorConfig, GradingConfig};
use codelab_common::types::{ExecutionOutcome, ExecutionRequest, SubmissionRecord, TestCase};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// The assembled grading pipeline. Holds no per-run state, so one instance
/// serves any number of concurrent submissions.
pub struct Pipeline {
    registry: Arc<LanguageRegistry>,
    harness: Arc<HarnessInjector>,
    client: Arc<ExecutionClient>,
    aggregator: GradingAggregator,
}

impl Pipeline {
    pub fn new(
        client: ExecutionClient,
        registry: LanguageRegistry,
        harness: HarnessInjector,
        config: GradingConfig,
    ) -> Self {
        let client = Arc::new(client);
        let registry = Arc::new(registry);
        let harness = Arc::new(harness);
        let aggregator =
            GradingAggregator::new(client.clone(), registry.clone(), harness.clone(), config);

        Self {
            registry,
            harness,
            client,
            aggregator,
        }
    }

    pub fn from_configs(
        executor: &ExecutorConfig,
        grading: GradingConfig,
        languages_path: &Path,
    ) -> Result<Self> {
        let registry = LanguageRegistry::load_or_builtin(languages_path, grading.default_runtime_id)?;
        let client =
            ExecutionClient::from_config(executor).context("Failed to build executor client")?;

        info!(
            executor = %executor.base_url,
            poll_interval_ms = executor.poll_interval.as_millis() as u64,
            max_poll_attempts = executor.max_poll_attempts,
            polling_deadline_ms = executor.polling_deadline().as_millis() as u64,
            pass_threshold = grading.pass_threshold,
            "Grading pipeline ready"
        );

        Ok(Self::new(client, registry, HarnessInjector::new(), grading))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_configs(
            &ExecutorConfig::from_env(),
            GradingConfig::from_env(),
            Path::new(&languages_config_path()),
        )
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn grading_config(&self) -> &GradingConfig {
        self.aggregator.config()
    }

    /// Grade a submission against the lesson's test cases
    #[instrument(skip(self, source_code, test_cases), fields(language = %language, lesson_id = ?lesson_id))]
    pub async fn grade_submission(
        &self,
        source_code: &str,
        language: &str,
        lesson_id: Option<&str>,
        test_cases: &[TestCase],
    ) -> SubmissionRecord {
        let verdict = self.aggregator.grade(source_code, language, test_cases).await;
        let record = SubmissionRecord::new(lesson_id.map(str::to_string), language, verdict);
        info!(
            submission_id = %record.id,
            status = %record.verdict.status,
            score = record.verdict.score,
            "Submission graded"
        );
        record
    }

    /// Run once without grading. Stdin, when given, is mocked through the harness.
    #[instrument(skip(self, source_code, stdin), fields(language = %language, has_stdin = stdin.is_some()))]
    pub async fn run_adhoc(
        &self,
        source_code: &str,
        language: &str,
        stdin: Option<&str>,
    ) -> ExecutionOutcome {
        let runtime_id = self.registry.resolve_runtime_id(language);

        let request = match stdin {
            Some(raw) => ExecutionRequest {
                runtime_id,
                source_code: self.harness.inject(language, source_code, raw),
                stdin: self
                    .aggregator
                    .config()
                    .forward_stdin
                    .then(|| raw.to_string()),
            },
            None => ExecutionRequest {
                runtime_id,
                source_code: source_code.to_string(),
                stdin: None,
            },
        };

        self.client.run(&request).await
    }
}
