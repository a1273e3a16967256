//! Content generation seam.
//!
//! The orchestrator only sees `Generator`; how text is produced is up to the implementation.
//! Calls are bounded by the caller's per-attempt timeout, so implementations need not
//! enforce one themselves.

use crate::retry::Outcome;
use crate::workflow::{PromptVariables, WorkflowStep};
use async_trait::async_trait;

pub mod provider;

pub use provider::ProviderGenerator;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce content for `step` from `vars`.
    async fn generate(&self, step: WorkflowStep, vars: &PromptVariables) -> Outcome<String>;

    /// Produce a replacement after `previous` was rejected with `feedback`.
    async fn regenerate(
        &self,
        step: WorkflowStep,
        vars: &PromptVariables,
        previous: &str,
        feedback: &str,
    ) -> Outcome<String> {
        let vars = vars.with_regeneration(previous, feedback);
        self.generate(step, &vars).await
    }
}
