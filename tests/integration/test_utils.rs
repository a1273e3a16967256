//! Shared test utilities for integration tests
//!
//! Scripted collaborators for the orchestrator (generator, validator, store) plus helpers
//! to build specs and wait for jobs to settle.

use async_trait::async_trait;
use learncrafter::course::{ConceptSpec, CourseLevel, CourseSpec, CourseTopic, ModuleSpec};
use learncrafter::error::StoreError;
use learncrafter::generator::Generator;
use learncrafter::job::{JobRecord, JobStore};
use learncrafter::orchestrator::{Orchestrator, OrchestratorSettings};
use learncrafter::retry::{Outcome, RetryPolicy};
use learncrafter::store::{
    ConceptDraft, CourseDraft, CourseOutline, CourseStore, MemoryStore, ModuleDraft,
};
use learncrafter::types::{ConceptId, CourseId, JobId, ModuleId};
use learncrafter::validator::{Validator, Verdict};
use learncrafter::workflow::{PromptVariables, WorkflowStep};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Global mutex serializing tests that touch process environment variables.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Build a spec from module -> concept titles.
pub fn spec(modules: &[(&str, &[&str])]) -> CourseSpec {
    CourseSpec {
        title: "Foundations of Physics".to_string(),
        description: Some("Mechanics from first principles".to_string()),
        topic: CourseTopic::Physics,
        level: CourseLevel::Beginner,
        modules: modules
            .iter()
            .map(|(title, concepts)| ModuleSpec {
                title: title.to_string(),
                description: None,
                order_index: None,
                concepts: concepts
                    .iter()
                    .map(|c| ConceptSpec {
                        title: c.to_string(),
                        description: None,
                        learning_objectives: vec![format!("Explain {}", c)],
                        prerequisites: vec![],
                        order_index: None,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Orchestrator settings with millisecond backoff so retry tests stay fast.
pub fn fast_settings(worker_pool_size: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        worker_pool_size,
        store_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        },
        max_regenerations: 2,
    }
}

pub fn orchestrator(
    store: Arc<dyn CourseStore>,
    generator: Arc<dyn learncrafter::generator::Generator>,
    validator: Option<Arc<dyn Validator>>,
    settings: OrchestratorSettings,
) -> (Arc<JobStore>, Orchestrator) {
    let jobs = Arc::new(JobStore::new());
    let orchestrator = Orchestrator::new(jobs.clone(), store, generator, validator, settings);
    (jobs, orchestrator)
}

/// Create a job and run it to a terminal status on the current task.
pub async fn run_job(orchestrator: &Orchestrator, spec: CourseSpec) -> JobRecord {
    let jobs = orchestrator.jobs().clone();
    let job_id = jobs.create(&spec).unwrap();
    orchestrator.run(job_id, Arc::new(spec)).await.unwrap();
    jobs.get(job_id).unwrap()
}

/// Poll until the job reaches a terminal status.
pub async fn wait_for_terminal(jobs: &JobStore, job_id: JobId) -> JobRecord {
    for _ in 0..2000 {
        let record = jobs.get(job_id).unwrap();
        if record.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("job {} did not settle", job_id);
}

fn title_of(vars: &PromptVariables) -> String {
    vars.get("title").unwrap_or_default().to_string()
}

/// Generator driven by a per-title script of outcomes. Titles without a script (or whose
/// script is used up) succeed with `<p>{title}</p>`.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<String, VecDeque<Outcome<String>>>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(WorkflowStep, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, title: &str, outcomes: Vec<Outcome<String>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(title.to_string(), outcomes.into());
        self
    }

    pub fn delay(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.to_string(), delay);
        self
    }

    pub fn calls_for(&self, title: &str) -> Vec<WorkflowStep> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t == title)
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl learncrafter::generator::Generator for ScriptedGenerator {
    async fn generate(&self, step: WorkflowStep, vars: &PromptVariables) -> Outcome<String> {
        let title = title_of(vars);
        self.calls.lock().unwrap().push((step, title.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&title) {
            tokio::time::sleep(*delay).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&title)
            .and_then(VecDeque::pop_front);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Outcome::Success(format!("<p>{}</p>", title)))
    }
}

/// Generator whose calls block until the test releases them one permit at a time.
pub struct GatedGenerator {
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, count: usize) {
        for _ in 0..2000 {
            if self.started() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("only {} generator calls started", self.started());
    }
}

#[async_trait]
impl learncrafter::generator::Generator for GatedGenerator {
    async fn generate(&self, _step: WorkflowStep, vars: &PromptVariables) -> Outcome<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Outcome::Permanent("gate closed".to_string()),
        }
        Outcome::Success(format!("<p>{}</p>", title_of(vars)))
    }
}

/// Validator answering from a queue of verdicts, then passing.
#[derive(Default)]
pub struct StubValidator {
    verdicts: Mutex<VecDeque<Outcome<Verdict>>>,
    seen: Mutex<Vec<String>>,
}

impl StubValidator {
    pub fn new(verdicts: Vec<Outcome<Verdict>>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Validator for StubValidator {
    async fn validate(&self, content: &str) -> Outcome<Verdict> {
        self.seen.lock().unwrap().push(content.to_string());
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Success(Verdict::Pass))
    }
}

/// MemoryStore wrapper that can fail chosen writes and counts every call.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_course: bool,
    fail_modules: HashSet<u32>,
    fail_concepts: HashSet<String>,
    pub course_calls: AtomicUsize,
    pub module_calls: AtomicUsize,
    pub concept_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_course(mut self) -> Self {
        self.fail_course = true;
        self
    }

    pub fn failing_module(mut self, order_index: u32) -> Self {
        self.fail_modules.insert(order_index);
        self
    }

    pub fn failing_concept(mut self, title: &str) -> Self {
        self.fail_concepts.insert(title.to_string());
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl CourseStore for FlakyStore {
    async fn create_course(&self, draft: CourseDraft) -> Result<CourseId, StoreError> {
        self.course_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_course {
            return Err(StoreError::Backend("database unavailable".to_string()));
        }
        self.inner.create_course(draft).await
    }

    async fn create_module(
        &self,
        course_id: CourseId,
        order_index: u32,
        draft: ModuleDraft,
    ) -> Result<ModuleId, StoreError> {
        self.module_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_modules.contains(&order_index) {
            return Err(StoreError::Constraint {
                parent: format!("course {}", course_id),
                order_index,
            });
        }
        self.inner.create_module(course_id, order_index, draft).await
    }

    async fn create_concept(
        &self,
        module_id: ModuleId,
        order_index: u32,
        draft: ConceptDraft,
    ) -> Result<ConceptId, StoreError> {
        self.concept_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_concepts.contains(&draft.title) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.inner.create_concept(module_id, order_index, draft).await
    }

    async fn delete_course(&self, course_id: CourseId) -> Result<(), StoreError> {
        self.inner.delete_course(course_id).await
    }

    async fn course_outline(&self, course_id: CourseId) -> Result<CourseOutline, StoreError> {
        self.inner.course_outline(course_id).await
    }
}

/// Generator that answers the planning steps with JSON outlines and delegates every other
/// step to a `ScriptedGenerator`.
///
/// Course plans come from a queue and fall back to `Module 1..n` for the requested count.
/// Concept plans are keyed by module title and fall back to `<module> concept 1..n`.
#[derive(Default)]
pub struct PlanningGenerator {
    course_plans: Mutex<VecDeque<Outcome<String>>>,
    concept_plans: Mutex<HashMap<String, VecDeque<Outcome<String>>>>,
    planning_calls: Mutex<Vec<(WorkflowStep, PromptVariables)>>,
    plan_delay: Option<Duration>,
    content: ScriptedGenerator,
}

impl PlanningGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course_plan(self, outcomes: Vec<Outcome<String>>) -> Self {
        self.course_plans.lock().unwrap().extend(outcomes);
        self
    }

    pub fn concept_plan(self, module_title: &str, outcomes: Vec<Outcome<String>>) -> Self {
        self.concept_plans
            .lock()
            .unwrap()
            .insert(module_title.to_string(), outcomes.into());
        self
    }

    /// Hold every course plan reply back by `delay`.
    pub fn plan_delay(mut self, delay: Duration) -> Self {
        self.plan_delay = Some(delay);
        self
    }

    pub fn planning_calls(&self, step: WorkflowStep) -> Vec<PromptVariables> {
        self.planning_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == step)
            .map(|(_, vars)| vars.clone())
            .collect()
    }

    pub fn content(&self) -> &ScriptedGenerator {
        &self.content
    }

    fn count(vars: &PromptVariables, name: &str) -> usize {
        vars.get(name).and_then(|v| v.parse().ok()).unwrap_or(1)
    }
}

#[async_trait]
impl learncrafter::generator::Generator for PlanningGenerator {
    async fn generate(&self, step: WorkflowStep, vars: &PromptVariables) -> Outcome<String> {
        match step {
            WorkflowStep::CoursePlanning => {
                self.planning_calls.lock().unwrap().push((step, vars.clone()));
                if let Some(delay) = self.plan_delay {
                    tokio::time::sleep(delay).await;
                }
                let queued = self.course_plans.lock().unwrap().pop_front();
                queued.unwrap_or_else(|| {
                    let modules: Vec<serde_json::Value> = (1..=Self::count(vars, "num_modules"))
                        .map(|i| {
                            serde_json::json!({
                                "module_title": format!("Module {}", i),
                                "module_description": format!("Part {} of the course", i),
                            })
                        })
                        .collect();
                    Outcome::Success(
                        serde_json::json!({
                            "course_title": "Planned Course",
                            "course_description": "An outline proposed by the planner",
                            "module_plans": modules,
                        })
                        .to_string(),
                    )
                })
            }
            WorkflowStep::ConceptPlanning => {
                self.planning_calls.lock().unwrap().push((step, vars.clone()));
                let module = vars.get("module_title").unwrap_or_default().to_string();
                let queued = self
                    .concept_plans
                    .lock()
                    .unwrap()
                    .get_mut(&module)
                    .and_then(VecDeque::pop_front);
                queued.unwrap_or_else(|| {
                    let concepts: Vec<serde_json::Value> = (1..=Self::count(vars, "num_concepts"))
                        .map(|j| {
                            serde_json::json!({
                                "concept_title": format!("{} concept {}", module, j),
                                "learning_objectives": [format!("Explain idea {}", j)],
                            })
                        })
                        .collect();
                    Outcome::Success(serde_json::json!({ "concepts": concepts }).to_string())
                })
            }
            _ => self.content.generate(step, vars).await,
        }
    }
}
