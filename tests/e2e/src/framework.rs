//! Core E2E testing framework

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Time to wait for a posted message to arrive
    pub receive_timeout_ms: u64,

    /// Log each scenario's metrics
    pub verbose: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 5_000,
            verbose: false,
        }
    }
}

impl TestConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Test scenario trait
pub trait TestScenario {
    fn setup(&self, _framework: &TestFramework) -> Result<()> {
        Ok(())
    }

    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics>;

    fn cleanup(&self, _framework: &TestFramework) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
    fn description(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub messages_posted: u64,
    pub messages_received: u64,
    pub payload_bytes: u64,
    pub objects_decoded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
}

/// Main test framework coordinator
#[derive(Debug, Default)]
pub struct TestFramework {
    config: TestConfig,
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run setup, execute and cleanup, capturing the outcome
    pub fn run_scenario(&self, scenario: &dyn TestScenario) -> TestResult {
        info!("Starting test scenario: {}", scenario.name());
        info!("Description: {}", scenario.description());
        let started = Instant::now();

        let outcome = scenario
            .setup(self)
            .and_then(|()| scenario.execute(self));
        if let Err(e) = scenario.cleanup(self) {
            error!("Cleanup failed: {:#}", e);
        }

        let duration = started.elapsed();
        match outcome {
            Ok(metrics) => {
                if self.config.verbose {
                    info!(?metrics, "Scenario metrics");
                }
                info!(
                    "Scenario {} passed in {} µs",
                    scenario.name(),
                    duration.as_micros()
                );
                TestResult {
                    scenario_name: scenario.name().to_string(),
                    success: true,
                    duration,
                    error_message: None,
                    metrics,
                }
            }
            Err(e) => {
                error!("Test execution failed: {:#}", e);
                TestResult {
                    scenario_name: scenario.name().to_string(),
                    success: false,
                    duration,
                    error_message: Some(format!("{e:#}")),
                    metrics: TestMetrics::default(),
                }
            }
        }
    }
}
