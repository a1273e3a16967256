//! Property-based tests for course spec validation

use learncrafter::course::validation::collect_issues;
use learncrafter::course::{ConceptSpec, CourseLevel, CourseSpec, CourseTopic, ModuleSpec};
use learncrafter::job::JobProgress;
use proptest::prelude::*;

fn title() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,40}"
}

fn concept() -> impl Strategy<Value = ConceptSpec> {
    (title(), prop::collection::vec("[a-z]{1,20}", 0..4)).prop_map(|(title, objectives)| {
        ConceptSpec {
            title,
            description: None,
            learning_objectives: objectives,
            prerequisites: vec![],
            order_index: None,
        }
    })
}

fn module() -> impl Strategy<Value = ModuleSpec> {
    (title(), prop::collection::vec(concept(), 0..6)).prop_map(|(title, concepts)| ModuleSpec {
        title,
        description: Some("Module overview".to_string()),
        order_index: None,
        concepts,
    })
}

fn course() -> impl Strategy<Value = CourseSpec> {
    (title(), prop::collection::vec(module(), 1..5)).prop_map(|(title, modules)| CourseSpec {
        title,
        description: None,
        topic: CourseTopic::Mathematics,
        level: CourseLevel::Intermediate,
        modules,
    })
}

/// Test that well-formed specs always validate and size the job correctly
#[test]
fn test_valid_specs_are_accepted() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&course(), |spec| {
            prop_assert!(collect_issues(&spec).is_empty());

            let progress = JobProgress::for_spec(&spec);
            prop_assert_eq!(progress.modules_total as usize, spec.modules.len());
            prop_assert_eq!(progress.concepts_total as usize, spec.concept_count());
            Ok(())
        })
        .unwrap();
}

/// Test that explicit order indices matching the position are accepted
#[test]
fn test_matching_order_indices_are_accepted() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&course(), |mut spec| {
            for (m, module) in spec.modules.iter_mut().enumerate() {
                module.order_index = Some(m as u32 + 1);
                for (c, concept) in module.concepts.iter_mut().enumerate() {
                    concept.order_index = Some(c as u32 + 1);
                }
            }
            prop_assert!(collect_issues(&spec).is_empty());
            Ok(())
        })
        .unwrap();
}

/// Test that a single blank concept title is reported at exactly its path
#[test]
fn test_blank_concept_title_is_pinpointed() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(course(), any::<prop::sample::Index>()), |(mut spec, pick)| {
            let slots: Vec<(usize, usize)> = spec
                .modules
                .iter()
                .enumerate()
                .flat_map(|(m, module)| (0..module.concepts.len()).map(move |c| (m, c)))
                .collect();
            prop_assume!(!slots.is_empty());

            let (m, c) = slots[pick.index(slots.len())];
            spec.modules[m].concepts[c].title = "   ".to_string();

            let issues = collect_issues(&spec);
            prop_assert_eq!(issues.len(), 1);
            prop_assert_eq!(
                issues[0].path.clone(),
                format!("modules[{}].concepts[{}].title", m, c)
            );
            Ok(())
        })
        .unwrap();
}

/// Test that a misplaced module order index is always rejected
#[test]
fn test_mismatched_module_order_index_is_rejected() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(course(), 0u32..20), |(mut spec, declared)| {
            let last = spec.modules.len();
            prop_assume!(declared as usize != last);
            spec.modules[last - 1].order_index = Some(declared);

            let issues = collect_issues(&spec);
            prop_assert_eq!(issues.len(), 1);
            prop_assert_eq!(
                issues[0].path.clone(),
                format!("modules[{}].order_index", last - 1)
            );
            Ok(())
        })
        .unwrap();
}
