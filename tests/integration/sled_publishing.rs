//! Publishing into the sled-backed store

use crate::integration::test_utils::{fast_settings, orchestrator, run_job, spec, ScriptedGenerator};
use learncrafter::job::JobStatus;
use learncrafter::retry::Outcome;
use learncrafter::store::{CourseStore, SledStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_outline_persists_in_spec_order() {
    let dir = TempDir::new().unwrap();
    let course_id = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let generator = Arc::new(
            ScriptedGenerator::new()
                .delay("Vectors", Duration::from_millis(40))
                .script("Units", vec![Outcome::Permanent("refused".to_string())]),
        );
        let (_, orch) = orchestrator(store.clone(), generator, None, fast_settings(3));

        let record = run_job(
            &orch,
            spec(&[
                ("Basics", &["Vectors", "Units", "Scalars"]),
                ("Motion", &["Displacement"]),
            ]),
        )
        .await;
        assert_eq!(record.status, JobStatus::PartialFailure);
        store.flush().unwrap();
        record.course_id.unwrap()
    };

    let store = SledStore::open(dir.path()).unwrap();
    let outline = store.course_outline(course_id).await.unwrap();
    assert_eq!(outline.module_indices(), vec![1, 2]);
    assert_eq!(outline.modules[0].concept_indices(), vec![1, 3]);
    assert_eq!(outline.modules[0].concepts[0].title, "Vectors");
    assert_eq!(outline.modules[1].concepts[0].content, "<p>Displacement</p>");

    store.delete_course(course_id).await.unwrap();
    assert!(store.course_outline(course_id).await.is_err());
}
