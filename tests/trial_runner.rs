mod trial_runner_tests {
    use std::time::Duration;

    use dinerdb::{
        run_trial, Error, IsolationLevel, MenuStore, Scenario, StoreOptions, TrialOutcome,
        TrialSpec,
    };

    fn seeded_store() -> MenuStore {
        let store = MenuStore::new();
        store.insert_item(1, "Cheeseburger", 8.5);
        store
    }

    #[tokio::test]
    async fn dirty_read_observed_at_read_uncommitted() {
        let store = seeded_store();
        let report = run_trial(&store, TrialSpec::new(Scenario::DirtyRead, 1))
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.message, "Dirty Read Test Completed");
        match report.results.expect("results") {
            TrialOutcome::DirtyRead {
                isolation,
                t1_read1,
                t1_read2,
                final_price_after_rollback,
                dirty_read_occurred,
                ..
            } => {
                assert_eq!(isolation, IsolationLevel::ReadUncommitted);
                assert_eq!(t1_read1, 8.5);
                assert_eq!(t1_read2, 18.5);
                assert_eq!(final_price_after_rollback, 8.5);
                assert!(dirty_read_occurred);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
    }

    #[tokio::test]
    async fn dirty_read_prevented_at_stricter_levels() {
        for isolation in [
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            let store = seeded_store();
            let spec = TrialSpec::new(Scenario::DirtyRead, 1).with_isolation(isolation);
            let report = run_trial(&store, spec).await.unwrap();

            assert!(report.success, "trial failed at {isolation}");
            match report.results.expect("results") {
                TrialOutcome::DirtyRead {
                    t1_read2,
                    dirty_read_occurred,
                    ..
                } => {
                    assert_eq!(t1_read2, 8.5, "leak at {isolation}");
                    assert!(!dirty_read_occurred, "dirty read at {isolation}");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
            assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
        }
    }

    #[tokio::test]
    async fn non_repeatable_read_depends_on_isolation() {
        let cases = [
            (IsolationLevel::ReadUncommitted, true),
            (IsolationLevel::ReadCommitted, true),
            (IsolationLevel::RepeatableRead, false),
            (IsolationLevel::Serializable, false),
        ];
        for (isolation, expect_anomaly) in cases {
            let store = seeded_store();
            let spec = TrialSpec::new(Scenario::NonRepeatableRead, 1).with_isolation(isolation);
            let report = run_trial(&store, spec).await.unwrap();

            assert!(report.success, "trial failed at {isolation}");
            match report.results.expect("results") {
                TrialOutcome::NonRepeatableRead {
                    initial_price,
                    t1_read1,
                    t1_read2,
                    non_repeatable_read_occurred,
                    ..
                } => {
                    assert_eq!(initial_price, 8.5);
                    assert_eq!(t1_read1, 8.5);
                    let expected_second = if expect_anomaly { 23.5 } else { 8.5 };
                    assert_eq!(t1_read2, expected_second, "second read at {isolation}");
                    assert_eq!(
                        non_repeatable_read_occurred, expect_anomaly,
                        "anomaly flag at {isolation}"
                    );
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
            assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
        }
    }

    #[tokio::test]
    async fn lost_update_occurs_below_serializable() {
        for isolation in [
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
        ] {
            let store = seeded_store();
            let spec = TrialSpec::new(Scenario::LostUpdate, 1).with_isolation(isolation);
            let report = run_trial(&store, spec).await.unwrap();

            assert!(report.success, "trial failed at {isolation}");
            match report.results.expect("results") {
                TrialOutcome::LostUpdate {
                    initial_price,
                    t1_read_price,
                    t2_read_price,
                    final_price,
                    expected_price_without_concurrency,
                    lost_update_occurred,
                    ..
                } => {
                    assert_eq!(initial_price, 8.5);
                    assert_eq!(t1_read_price, 8.5);
                    assert_eq!(t2_read_price, 8.5);
                    assert_eq!(final_price, 18.5, "final price at {isolation}");
                    assert_eq!(expected_price_without_concurrency, 23.5);
                    assert!(lost_update_occurred, "no lost update at {isolation}");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
            assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
        }
    }

    #[tokio::test]
    async fn lost_update_is_blocked_at_serializable() {
        let store = seeded_store();
        let spec =
            TrialSpec::new(Scenario::LostUpdate, 1).with_isolation(IsolationLevel::Serializable);
        let report = run_trial(&store, spec).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.message, "Lost Update Test Failed");
        assert!(report.results.is_none());
        let error = report.error.expect("error text");
        assert!(
            error.contains("serialization failure"),
            "unexpected error: {error}"
        );
        assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
    }

    #[tokio::test]
    async fn each_outcome_carries_exactly_one_anomaly_flag() {
        for scenario in Scenario::ALL {
            let store = seeded_store();
            let report = run_trial(&store, TrialSpec::new(scenario, 1)).await.unwrap();
            assert!(report.success);

            let value = serde_json::to_value(&report).unwrap();
            let results = value["results"].as_object().expect("results object");
            assert_eq!(results["scenario"], scenario.label());
            let flags: Vec<&String> = results
                .keys()
                .filter(|key| key.ends_with("Occurred"))
                .collect();
            assert_eq!(flags.len(), 1, "flags for {scenario:?}: {flags:?}");
        }
    }

    #[tokio::test]
    async fn trial_fails_cleanly_when_row_is_already_locked() {
        let store = MenuStore::with_options(
            StoreOptions::new().lock_wait_timeout(Duration::from_millis(50)),
        );
        store.insert_item(1, "Cheeseburger", 8.5);

        let mut external = store.connection().await.unwrap();
        external.begin().await.unwrap();
        external.write_price(1, 50.0).await.unwrap();

        let spec =
            TrialSpec::new(Scenario::LostUpdate, 1).with_isolation(IsolationLevel::ReadCommitted);
        let report = run_trial(&store, spec).await.unwrap();

        assert!(!report.success);
        let error = report.error.expect("error text");
        assert!(
            error.contains("lock wait timeout"),
            "unexpected error: {error}"
        );

        external.rollback().await.unwrap();
        assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
    }

    #[tokio::test]
    async fn trials_complete_on_a_single_connection_pool() {
        let store = MenuStore::with_options(StoreOptions::new().max_connections(1));
        store.insert_item(1, "Cheeseburger", 8.5);

        let trial = run_trial(&store, TrialSpec::new(Scenario::DirtyRead, 1));
        let report = tokio::time::timeout(Duration::from_secs(2), trial)
            .await
            .expect("trial must not hang waiting for a connection pair")
            .unwrap();

        assert!(report.success);
        assert_eq!(store.read_committed_price(1).await.unwrap(), 8.5);
    }

    #[tokio::test]
    async fn unknown_row_fails_before_any_transaction() {
        let store = seeded_store();
        let err = run_trial(&store, TrialSpec::new(Scenario::DirtyRead, 42))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RowNotFound(42)));
    }
}
