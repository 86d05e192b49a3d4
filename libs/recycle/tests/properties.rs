//! Property tests over randomized recycle runs.

use std::time::Duration;

use proptest::prelude::*;
use recycle_core::{RecycleReport, RestoreOutcome, RunStatus, TaskStatus};
use recycle_testing::{task_id, Call, FakeCluster};

fn run_blocking(cluster: &FakeCluster, maintain: bool, wait_time_secs: u64) -> RecycleReport {
    let config = cluster
        .config()
        .with_maintain_service_state(maintain)
        .with_wait_time_secs(wait_time_secs);
    let recycler = cluster.recycler(config);
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(recycler.run())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_only_originals_are_stopped_in_order(
        tasks in 1u32..7,
        failing in proptest::collection::hash_set(1u32..7, 0..4),
        maintain in any::<bool>(),
    ) {
        let cluster = FakeCluster::new("prod", "web", tasks);
        for n in &failing {
            cluster.fail_stop(&format!("task-{}", n));
        }
        let originals = cluster.live_tasks();

        let report = run_blocking(&cluster, maintain, 0);

        prop_assert_eq!(cluster.stop_requests(), originals.clone());
        prop_assert_eq!(report.tasks.len(), originals.len());
        prop_assert!(report.not_attempted.is_empty());

        for outcome in &report.tasks {
            let n: u32 = outcome.task_id.as_str()["task-".len()..].parse().unwrap();
            let expected = if failing.contains(&n) { TaskStatus::Failed } else { TaskStatus::Stable };
            prop_assert_eq!(outcome.status, expected);
        }

        let expected_status = if failing.iter().any(|n| *n <= tasks) {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        prop_assert_eq!(report.overall_status, expected_status);
    }

    #[test]
    fn prop_capacity_written_at_most_twice_and_restored(
        tasks in 1u32..6,
        stall_at in proptest::option::of(1usize..6),
    ) {
        let cluster = FakeCluster::new("prod", "web", tasks);
        if let Some(n) = stall_at {
            cluster.stall_rollout_after_stops(n);
        }

        let report = run_blocking(&cluster, true, 0);

        prop_assert_eq!(cluster.desired_updates(), vec![tasks + 1, tasks]);
        prop_assert_eq!(report.capacity, RestoreOutcome::Restored);
        prop_assert_eq!(cluster.desired_count(), tasks);
        prop_assert!(!report.requires_manual_intervention);
        prop_assert_eq!(
            report.counts.stable + report.counts.failed + report.counts.not_attempted,
            tasks as usize
        );
    }

    #[test]
    fn prop_next_stop_waits_for_stable(tasks in 2u32..6, wait in 0u64..3) {
        let cluster = FakeCluster::new("prod", "web", tasks);
        run_blocking(&cluster, true, wait);

        // Between two consecutive stops the service must have been seen steady.
        let journal = cluster.journal();
        let stops: Vec<usize> = journal
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::StopTask(_)))
            .map(|(i, _)| i)
            .collect();
        let stable = Call::DescribeService { stable: true };
        for pair in stops.windows(2) {
            let between = &journal[pair[0]..pair[1]];
            prop_assert!(between.contains(&stable));
            if wait > 0 {
                prop_assert!(between.contains(&Call::Sleep(Duration::from_secs(wait))));
            }
        }
    }

    #[test]
    fn prop_polls_bounded_by_max_attempts(tasks in 1u32..4, freeze_at in 1usize..4) {
        let cluster = FakeCluster::new("prod", "web", tasks);
        cluster.freeze_after_stops(freeze_at);

        run_blocking(&cluster, false, 0);

        // Poll sleeps between two mutations never exceed max_attempts - 1.
        let mut consecutive = 0;
        for call in cluster.journal() {
            match call {
                Call::Sleep(_) => {
                    consecutive += 1;
                    prop_assert!(consecutive < 5);
                }
                Call::StopTask(_) | Call::UpdateDesiredCount(_) => consecutive = 0,
                Call::DescribeService { stable: true } => consecutive = 0,
                _ => {}
            }
        }
        prop_assert!(cluster.stop_requests().len() <= tasks as usize);
        prop_assert!(cluster.stop_requests().first() == Some(&task_id("task-1")));
    }
}
