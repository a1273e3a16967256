//! Planning requests: outlines proposed by the generator, then published like any spec

use crate::integration::test_utils::{
    fast_settings, orchestrator, wait_for_terminal, FlakyStore, PlanningGenerator,
};
use learncrafter::course::{ConceptSpec, CourseLevel, CourseTopic, ModulePlan, PublishRequest};
use learncrafter::error::PublishError;
use learncrafter::job::{EntityRef, ErrorKind, JobStatus, RetentionPolicy};
use learncrafter::publisher::CoursePublisher;
use learncrafter::retry::Outcome;
use learncrafter::store::CourseStore;
use learncrafter::workflow::WorkflowStep;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn publisher(store: Arc<FlakyStore>, generator: Arc<PlanningGenerator>) -> CoursePublisher {
    let (_, orch) = orchestrator(store, generator, None, fast_settings(2));
    CoursePublisher::new(orch, RetentionPolicy::default())
}

fn module(title: &str, concepts: &[&str]) -> ModulePlan {
    ModulePlan {
        title: title.to_string(),
        description: None,
        concepts: concepts
            .iter()
            .map(|c| ConceptSpec {
                title: c.to_string(),
                description: None,
                learning_objectives: vec![],
                prerequisites: vec![],
                order_index: None,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_topic_only_request_is_planned_and_published() {
    let store = Arc::new(FlakyStore::new());
    let generator = Arc::new(PlanningGenerator::new());
    let publisher = publisher(store.clone(), generator.clone());

    let mut request = PublishRequest::new(CourseTopic::Metallurgy, CourseLevel::Intermediate);
    request.num_modules = 2;
    request.concepts_per_module = 3;
    let record = publisher.run_request_to_completion(request).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.errors.is_empty());
    assert_eq!(record.progress.modules_total, 2);
    assert_eq!(record.progress.concepts_total, 6);
    assert_eq!(record.progress.percent_complete(), 100.0);

    let outline = store.course_outline(record.course_id.unwrap()).await.unwrap();
    assert_eq!(outline.course.title, "Planned Course");
    assert_eq!(outline.course.topic, CourseTopic::Metallurgy);
    assert_eq!(outline.module_indices(), vec![1, 2]);
    assert_eq!(outline.modules[1].module.title, "Module 2");
    let concept = &outline.modules[0].concepts[2];
    assert_eq!(concept.title, "Module 1 concept 3");
    assert_eq!(concept.content, "<p>Module 1 concept 3</p>");

    let course_calls = generator.planning_calls(WorkflowStep::CoursePlanning);
    assert_eq!(course_calls.len(), 1);
    assert_eq!(course_calls[0].get("num_modules"), Some("2"));
    assert_eq!(course_calls[0].get("level"), Some("intermediate"));
    assert_eq!(generator.planning_calls(WorkflowStep::ConceptPlanning).len(), 2);
}

#[tokio::test]
async fn test_manual_module_without_concepts_gets_planned_concepts() {
    let store = Arc::new(FlakyStore::new());
    let generator = Arc::new(PlanningGenerator::new().concept_plan(
        "Forces",
        vec![Outcome::Success(
            r#"{"concepts": [{"concept_title": "Newton I"}, {"concept_title": "Newton II"}]}"#
                .to_string(),
        )],
    ));
    let publisher = publisher(store.clone(), generator.clone());

    let mut request = PublishRequest::new(CourseTopic::Physics, CourseLevel::Beginner);
    request.course_title = Some("Mechanics".to_string());
    request.modules = Some(vec![module("Kinematics", &["Velocity"]), module("Forces", &[])]);
    let record = publisher.run_request_to_completion(request).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    let outline = store.course_outline(record.course_id.unwrap()).await.unwrap();
    assert_eq!(outline.course.title, "Mechanics");
    let titles: Vec<Vec<&str>> = outline
        .modules
        .iter()
        .map(|m| m.concepts.iter().map(|c| c.title.as_str()).collect())
        .collect();
    assert_eq!(titles, vec![vec!["Velocity"], vec!["Newton I", "Newton II"]]);

    assert!(generator.planning_calls(WorkflowStep::CoursePlanning).is_empty());
    let concept_calls = generator.planning_calls(WorkflowStep::ConceptPlanning);
    assert_eq!(concept_calls.len(), 1);
    assert_eq!(concept_calls[0].get("course_title"), Some("Mechanics"));
}

#[tokio::test]
async fn test_unusable_plan_fails_job_without_writes() {
    let store = Arc::new(FlakyStore::new());
    let garbage = || Outcome::Success("I'd be happy to help with that course!".to_string());
    let generator =
        Arc::new(PlanningGenerator::new().course_plan(vec![garbage(), garbage(), garbage()]));
    let publisher = publisher(store.clone(), generator.clone());

    let request = PublishRequest::new(CourseTopic::Chemistry, CourseLevel::Beginner);
    let record = publisher.run_request_to_completion(request).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.current_step, "Failed");
    assert!(record.course_id.is_none());
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].entity, EntityRef::Job);
    assert_eq!(record.errors[0].kind, ErrorKind::Planning);
    assert!(record.errors[0].message.contains("course_planning"));
    assert_eq!(generator.planning_calls(WorkflowStep::CoursePlanning).len(), 3);
    assert_eq!(store.course_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_complete_request_skips_planning() {
    let store = Arc::new(FlakyStore::new());
    let generator = Arc::new(PlanningGenerator::new());
    let publisher = publisher(store.clone(), generator.clone());

    let mut request = PublishRequest::new(CourseTopic::Physics, CourseLevel::Beginner);
    request.course_title = Some("Mechanics".to_string());
    request.modules = Some(vec![module("Kinematics", &["Velocity", "Acceleration"])]);
    let record = publisher.run_request_to_completion(request).await.unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert!(generator.planning_calls(WorkflowStep::CoursePlanning).is_empty());
    assert!(generator.planning_calls(WorkflowStep::ConceptPlanning).is_empty());
    assert_eq!(generator.content().total_calls(), 2);
}

#[tokio::test]
async fn test_invalid_request_creates_no_job() {
    let store = Arc::new(FlakyStore::new());
    let publisher = publisher(store, Arc::new(PlanningGenerator::new()));

    let mut request = PublishRequest::new(CourseTopic::Physics, CourseLevel::Beginner);
    request.concepts_per_module = 0;
    let err = publisher.submit_request(request).unwrap_err();

    assert!(matches!(err, PublishError::SpecValidation(ref issues) if issues[0].path == "concepts_per_module"));
    assert!(publisher.jobs().is_empty());
}

#[tokio::test]
async fn test_cancel_during_planning_fails_before_any_write() {
    let store = Arc::new(FlakyStore::new());
    let generator = Arc::new(PlanningGenerator::new().plan_delay(Duration::from_millis(50)));
    let publisher = publisher(store.clone(), generator.clone());

    let request = PublishRequest::new(CourseTopic::Biology, CourseLevel::Advanced);
    let job_id = publisher.submit_request(request).unwrap();

    let pending = publisher.status(job_id).unwrap();
    assert_eq!(pending.record.status, JobStatus::Pending);
    assert_eq!(pending.record.current_step, "Planning course");
    publisher.cancel(job_id).unwrap();

    let record = wait_for_terminal(publisher.jobs(), job_id).await;
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.current_step, "Cancelled");
    assert_eq!(record.errors[0].kind, ErrorKind::Cancelled);
    assert!(record.course_id.is_none());
    assert_eq!(store.course_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.content().total_calls(), 0);
}
