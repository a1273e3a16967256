//! Publish requests that may leave parts of the outline to the planner.
//!
//! A request names the topic and level and optionally the course title, the modules and
//! each module's concepts. Whatever is left out is planned before the job runs.

use super::{ConceptSpec, CourseLevel, CourseSpec, CourseTopic, ModuleSpec};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUM_MODULES: u32 = 3;
pub const DEFAULT_CONCEPTS_PER_MODULE: u32 = 5;

fn default_num_modules() -> u32 {
    DEFAULT_NUM_MODULES
}

fn default_concepts_per_module() -> u32 {
    DEFAULT_CONCEPTS_PER_MODULE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishRequest {
    pub topic: CourseTopic,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub course_description: Option<String>,
    /// Caller-chosen modules; when absent the planner proposes `num_modules` of them.
    #[serde(default)]
    pub modules: Option<Vec<ModulePlan>>,
    #[serde(default = "default_num_modules")]
    pub num_modules: u32,
    #[serde(default = "default_concepts_per_module")]
    pub concepts_per_module: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulePlan {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Empty means the planner fills this module in.
    #[serde(default)]
    pub concepts: Vec<ConceptSpec>,
}

impl PublishRequest {
    pub fn new(topic: CourseTopic, level: CourseLevel) -> Self {
        Self {
            topic,
            level,
            course_title: None,
            course_description: None,
            modules: None,
            num_modules: DEFAULT_NUM_MODULES,
            concepts_per_module: DEFAULT_CONCEPTS_PER_MODULE,
        }
    }

    /// The spec this request describes when nothing is left to plan.
    pub fn complete_spec(&self) -> Option<CourseSpec> {
        let title = self.course_title.clone()?;
        let modules = self.modules.as_ref()?;
        if modules.iter().any(|m| m.concepts.is_empty()) {
            return None;
        }
        Some(CourseSpec {
            title,
            description: self.course_description.clone(),
            topic: self.topic,
            level: self.level,
            modules: modules.iter().cloned().map(ModuleSpec::from).collect(),
        })
    }
}

impl From<ModulePlan> for ModuleSpec {
    fn from(plan: ModulePlan) -> Self {
        ModuleSpec {
            title: plan.title,
            description: plan.description,
            order_index: None,
            concepts: plan.concepts,
        }
    }
}
