//! Remote code-execution and grading pipeline.
//!
//! caller → evaluator → (per test case) harness → client → decoder → comparison → verdict

pub mod client;
pub mod decoder;
pub mod evaluator;
pub mod harness;
pub mod judge0;
pub mod languages;
pub mod pipeline;

#[cfg(test)]
mod test_support;

pub use client::{ExecutionClient, ExecutorBackend, PollBudget, TransportError};
pub use evaluator::GradingAggregator;
pub use harness::{HarnessInjector, HarnessStrategy};
pub use languages::{LanguageRegistry, LanguageTable};
pub use pipeline::Pipeline;
