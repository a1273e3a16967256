//! Generator backed by a chat completion endpoint.

use crate::generator::Generator;
use crate::provider::{ChatClient, ChatMessage, CompletionOptions};
use crate::retry::Outcome;
use crate::workflow::{PromptVariables, Workflow, WorkflowStep};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct ProviderGenerator {
    client: Arc<dyn ChatClient>,
    workflow: Arc<Workflow>,
    options: CompletionOptions,
    system_prompt: Option<String>,
}

impl ProviderGenerator {
    pub fn new(client: Arc<dyn ChatClient>, workflow: Arc<Workflow>) -> Self {
        Self {
            client,
            workflow,
            options: CompletionOptions::default(),
            system_prompt: None,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    fn messages(&self, prompt: String) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }
}

#[async_trait]
impl Generator for ProviderGenerator {
    async fn generate(&self, step: WorkflowStep, vars: &PromptVariables) -> Outcome<String> {
        let prompt = match self.workflow.render(step, vars) {
            Ok(prompt) => prompt,
            Err(err) => return Outcome::Permanent(err.to_string()),
        };
        debug!(
            step = %step,
            model = self.client.model_name(),
            prompt_chars = prompt.len(),
            "Requesting completion"
        );
        let result = self
            .client
            .complete(self.messages(prompt), self.options.clone())
            .await;
        Outcome::from(result.map(|completion| completion.content))
    }
}
