//! Model-assisted review through the `content_validation` workflow step.

use crate::provider::{parse_json_reply, ChatClient, ChatMessage, CompletionOptions};
use crate::retry::Outcome;
use crate::validator::{ValidationReport, Validator, Verdict};
use crate::workflow::{PromptVariables, Workflow, WorkflowStep};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ReviewAnswer {
    is_valid: bool,
    #[serde(default)]
    feedback: String,
}

pub struct ReviewValidator {
    client: Arc<dyn ChatClient>,
    workflow: Arc<Workflow>,
}

impl ReviewValidator {
    pub fn new(client: Arc<dyn ChatClient>, workflow: Arc<Workflow>) -> Self {
        Self { client, workflow }
    }
}

#[async_trait]
impl Validator for ReviewValidator {
    async fn validate(&self, content: &str) -> Outcome<Verdict> {
        let vars = PromptVariables::for_validation(content);
        let prompt = match self.workflow.render(WorkflowStep::ContentValidation, &vars) {
            Ok(prompt) => prompt,
            Err(err) => return Outcome::Permanent(err.to_string()),
        };

        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(500),
        };
        let reply = match self
            .client
            .complete(vec![ChatMessage::user(prompt)], options)
            .await
        {
            Ok(completion) => completion.content,
            Err(err) => return Outcome::from(Err(err)),
        };

        // Unparseable answers are retried.
        let Some(answer) = parse_json_reply::<ReviewAnswer>(&reply) else {
            return Outcome::Transient("review answer was not the expected JSON object".to_string());
        };

        if answer.is_valid {
            Outcome::Success(Verdict::Pass)
        } else {
            let feedback = if answer.feedback.trim().is_empty() {
                "Reviewer rejected the content without feedback".to_string()
            } else {
                answer.feedback
            };
            Outcome::Success(Verdict::Fail(ValidationReport {
                errors: vec![feedback],
                warnings: vec![],
            }))
        }
    }
}
