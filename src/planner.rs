//! Course planning
//!
//! Expands a `PublishRequest` into a complete `CourseSpec`. The course title and module
//! outlines come from the `course_planning` step unless the caller supplied both; each
//! module without concepts gets them from the `concept_planning` step. Replies are parsed as
//! JSON, and a reply that cannot be used counts as a transient failure of that attempt.

use crate::course::validation::MAX_LIST_ITEMS;
use crate::course::{ConceptSpec, CourseSpec, ModulePlan, ModuleSpec, PublishRequest};
use crate::error::PublishError;
use crate::generator::Generator;
use crate::provider::parse_json_reply;
use crate::retry::{Outcome, RetryPolicy};
use crate::workflow::{PromptVariables, WorkflowStep};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct CoursePlanReply {
    #[serde(default, alias = "title")]
    course_title: String,
    #[serde(default, alias = "description")]
    course_description: Option<String>,
    #[serde(default, alias = "modules")]
    module_plans: Vec<ModulePlanReply>,
}

#[derive(Debug, Deserialize)]
struct ModulePlanReply {
    #[serde(default, alias = "title")]
    module_title: String,
    #[serde(default, alias = "description")]
    module_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptPlanReply {
    #[serde(default)]
    concepts: Vec<PlannedConcept>,
}

#[derive(Debug, Deserialize)]
struct PlannedConcept {
    #[serde(default, alias = "title")]
    concept_title: String,
    #[serde(default, alias = "description")]
    concept_description: Option<String>,
    #[serde(default)]
    learning_objectives: Vec<String>,
    #[serde(default)]
    prerequisites: Vec<String>,
}

/// A course outline as proposed by the generator, already cleaned up.
struct CourseOutline {
    title: String,
    description: Option<String>,
    modules: Vec<ModulePlan>,
}

#[derive(Clone)]
pub struct Planner {
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
}

impl Planner {
    pub fn new(generator: Arc<dyn Generator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Fill in everything `request` leaves out. Caller-supplied values are kept as given.
    pub async fn plan(&self, request: &PublishRequest) -> Result<CourseSpec, PublishError> {
        let (title, description, module_plans) = match (&request.course_title, &request.modules) {
            (Some(title), Some(modules)) => (
                title.clone(),
                request.course_description.clone(),
                modules.clone(),
            ),
            (title, modules) => {
                let wanted = modules
                    .as_ref()
                    .map(Vec::len)
                    .unwrap_or(request.num_modules as usize);
                let outline = self.plan_course(request, wanted, modules.is_none()).await?;
                (
                    title.clone().unwrap_or(outline.title),
                    request.course_description.clone().or(outline.description),
                    modules.clone().unwrap_or(outline.modules),
                )
            }
        };

        let mut spec = CourseSpec {
            title,
            description,
            topic: request.topic,
            level: request.level,
            modules: Vec::with_capacity(module_plans.len()),
        };
        for mut module in module_plans {
            if module.concepts.is_empty() {
                module.concepts = self.plan_concepts(request, &spec.title, &module).await?;
            }
            spec.modules.push(ModuleSpec::from(module));
        }

        info!(
            course = %spec.title,
            modules = spec.modules.len(),
            concepts = spec.concept_count(),
            "Course planned"
        );
        Ok(spec)
    }

    async fn plan_course(
        &self,
        request: &PublishRequest,
        num_modules: usize,
        need_modules: bool,
    ) -> Result<CourseOutline, PublishError> {
        let vars = PromptVariables::for_course_plan(request.topic, request.level, num_modules);
        self.ask(WorkflowStep::CoursePlanning, &vars, |reply: CoursePlanReply| {
            let title = reply.course_title.trim().to_string();
            if title.is_empty() {
                return Err("course plan has no title".to_string());
            }
            let modules: Vec<ModulePlan> = reply
                .module_plans
                .into_iter()
                .filter(|m| !m.module_title.trim().is_empty())
                .take(num_modules)
                .map(|m| ModulePlan {
                    title: m.module_title.trim().to_string(),
                    description: non_blank(m.module_description),
                    concepts: Vec::new(),
                })
                .collect();
            if need_modules && modules.is_empty() {
                return Err("course plan lists no modules".to_string());
            }
            Ok(CourseOutline {
                title,
                description: non_blank(reply.course_description),
                modules,
            })
        })
        .await
    }

    async fn plan_concepts(
        &self,
        request: &PublishRequest,
        course_title: &str,
        module: &ModulePlan,
    ) -> Result<Vec<ConceptSpec>, PublishError> {
        let wanted = request.concepts_per_module as usize;
        let vars = PromptVariables::for_concept_plan(
            request.topic,
            request.level,
            course_title,
            &module.title,
            module.description.as_deref(),
            request.concepts_per_module,
        );
        let concepts = self
            .ask(WorkflowStep::ConceptPlanning, &vars, |reply: ConceptPlanReply| {
                let concepts: Vec<ConceptSpec> = reply
                    .concepts
                    .into_iter()
                    .filter(|c| !c.concept_title.trim().is_empty())
                    .take(wanted)
                    .map(|c| ConceptSpec {
                        title: c.concept_title.trim().to_string(),
                        description: non_blank(c.concept_description),
                        learning_objectives: clean_list(c.learning_objectives),
                        prerequisites: clean_list(c.prerequisites),
                        order_index: None,
                    })
                    .collect();
                if concepts.is_empty() {
                    Err("concept plan lists no concepts".to_string())
                } else {
                    Ok(concepts)
                }
            })
            .await?;
        debug!(module = %module.title, concepts = concepts.len(), "Module concepts planned");
        Ok(concepts)
    }

    /// Run one planning step under the retry policy and shape its JSON reply with `accept`.
    async fn ask<R, T, F>(
        &self,
        step: WorkflowStep,
        vars: &PromptVariables,
        accept: F,
    ) -> Result<T, PublishError>
    where
        R: DeserializeOwned,
        T: Send,
        F: Fn(R) -> Result<T, String> + Sync,
    {
        let generator = &self.generator;
        let accept = &accept;
        self.retry
            .run(step.as_str(), move |_| async move {
                match generator.generate(step, vars).await {
                    Outcome::Success(reply) => match parse_json_reply::<R>(&reply) {
                        Some(parsed) => match accept(parsed) {
                            Ok(value) => Outcome::Success(value),
                            Err(message) => Outcome::Transient(message),
                        },
                        None => Outcome::Transient(format!(
                            "{} reply was not the expected JSON object",
                            step
                        )),
                    },
                    Outcome::Transient(message) => Outcome::Transient(message),
                    Outcome::Permanent(message) => Outcome::Permanent(message),
                }
            })
            .await
            .map_err(|failure| PublishError::Planning(format!("{}: {}", step, failure)))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(MAX_LIST_ITEMS)
        .collect()
}
