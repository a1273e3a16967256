//! Property-based tests for progress accounting and retry backoff

use learncrafter::job::JobProgress;
use learncrafter::retry::RetryPolicy;
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Event {
    ModuleDone,
    ModuleFailed,
    ConceptDone,
    ConceptFailed,
    Skipped(u32),
    ModulesSkipped(u32),
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::ModuleDone),
        Just(Event::ModuleFailed),
        Just(Event::ConceptDone),
        Just(Event::ConceptFailed),
        (0u32..5).prop_map(Event::Skipped),
        (0u32..3).prop_map(Event::ModulesSkipped),
    ]
}

/// Test that counters only grow and never exceed their totals
#[test]
fn test_progress_is_monotone_and_bounded() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0u32..6, 0u32..20, prop::collection::vec(event(), 0..60)),
            |(modules_total, concepts_total, events)| {
                let mut progress = JobProgress {
                    modules_total,
                    concepts_total,
                    ..JobProgress::default()
                };

                for event in events {
                    let before = progress;
                    match event {
                        Event::ModuleDone => progress.module_done(),
                        Event::ModuleFailed => progress.module_failed(),
                        Event::ConceptDone => progress.concept_done(),
                        Event::ConceptFailed => progress.concept_failed(),
                        Event::Skipped(n) => progress.concepts_skipped_by(n),
                        Event::ModulesSkipped(n) => progress.modules_skipped_by(n),
                    }

                    prop_assert!(progress.modules_done >= before.modules_done);
                    prop_assert!(progress.concepts_done >= before.concepts_done);
                    prop_assert!(progress.concepts_failed >= before.concepts_failed);
                    prop_assert!(progress.concepts_skipped >= before.concepts_skipped);
                    prop_assert!(progress.modules_skipped >= before.modules_skipped);
                    prop_assert!(progress.modules_settled() <= progress.modules_total);
                    prop_assert!(progress.concepts_settled() <= progress.concepts_total);
                    prop_assert_eq!(
                        progress.concepts_remaining(),
                        progress.concepts_total - progress.concepts_settled()
                    );

                    let percent = progress.percent_complete();
                    prop_assert!((0.0..=100.0).contains(&percent));
                    prop_assert!(percent >= before.percent_complete());
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Test that jittered backoff stays under its ceiling and the ceiling under max_delay
#[test]
fn test_backoff_is_bounded() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1u64..2_000, 1u64..60_000, 1u32..40),
            |(base_ms, max_ms, attempt)| {
                let policy = RetryPolicy {
                    max_attempts: 5,
                    base_delay: Duration::from_millis(base_ms),
                    max_delay: Duration::from_millis(max_ms),
                    attempt_timeout: Duration::from_secs(1),
                };
                let ceiling = policy.backoff_ceiling(attempt);
                prop_assert!(ceiling <= policy.max_delay);
                prop_assert!(policy.backoff(attempt) <= ceiling);
                if attempt > 1 {
                    prop_assert!(ceiling >= policy.backoff_ceiling(attempt - 1));
                }
                Ok(())
            },
        )
        .unwrap();
}
