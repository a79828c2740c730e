//! The six end-to-end transport scenarios, one test each

use std::sync::Once;

use isolate_e2e_tests::{
    BigintTest, CyclicListTest, PortOrderingTest, SharedEntriesTest, SmallIntegerTest, TestConfig,
    TestFramework, TestScenario, TypedDataViewsTest,
};

static TRACING: Once = Once::new();

fn framework() -> TestFramework {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
    TestFramework::new(TestConfig::default())
}

fn run(scenario: &dyn TestScenario) {
    let result = framework().run_scenario(scenario);
    assert!(
        result.success,
        "{} failed: {}",
        result.scenario_name,
        result.error_message.unwrap_or_default()
    );
    assert!(result.metrics.messages_received >= 1);
}

#[test]
fn test_small_int_smoke() {
    run(&SmallIntegerTest);
}

#[test]
fn test_cyclic_list() {
    run(&CyclicListTest { length: 10 });
}

#[test]
fn test_long_cyclic_list() {
    run(&CyclicListTest { length: 1_000 });
}

#[test]
fn test_mixed_list_with_shared_entries() {
    run(&SharedEntriesTest);
}

#[test]
fn test_typed_data_view_aliasing() {
    run(&TypedDataViewsTest);
}

#[test]
fn test_bigint_round_trip() {
    run(&BigintTest);
}

#[test]
fn test_port_posting_order() {
    run(&PortOrderingTest);
}

#[test]
fn test_all_scenarios_report_metrics() {
    let framework = framework();
    for scenario in isolate_e2e_tests::scenarios::all_scenarios() {
        let result = framework.run_scenario(scenario.as_ref());
        assert!(result.success, "{}", result.scenario_name);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(&result.scenario_name));
    }
}
