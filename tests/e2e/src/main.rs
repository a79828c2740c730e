//! End-to-End Test Runner for the isolate message transport

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use isolate_e2e_tests::{scenarios::all_scenarios, TestConfig, TestFramework, TestResult};
use tracing::{error, info};
use transport_config::{init_logging, LogFormat, LoggingConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Test scenario to run
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Receive timeout in milliseconds
    #[arg(short, long, default_value_t = 5_000)]
    timeout: u64,

    /// Output results to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&LoggingConfig {
        level: if args.verbose { "debug" } else { "info" }.to_string(),
        format: if args.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    })?;

    info!("Starting isolate transport E2E suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let framework = TestFramework::new(TestConfig {
        receive_timeout_ms: args.timeout,
        verbose: args.verbose,
    });

    let selected: Vec<_> = all_scenarios()
        .into_iter()
        .filter(|scenario| args.scenario == "all" || scenario.name() == args.scenario)
        .collect();
    if selected.is_empty() {
        error!("Unknown test scenario: {}", args.scenario);
        std::process::exit(2);
    }

    let results: Vec<TestResult> = selected
        .iter()
        .map(|scenario| framework.run_scenario(scenario.as_ref()))
        .collect();

    print_results_summary(&results);

    if let Some(output_path) = args.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&output_path, json)
            .with_context(|| format!("writing results to {}", output_path.display()))?;
        info!("Results saved to: {}", output_path.display());
    }

    if !results.iter().all(|r| r.success) {
        error!("Some tests failed");
        std::process::exit(1);
    }

    info!("All tests passed successfully!");
    Ok(())
}

fn print_results_summary(results: &[TestResult]) {
    println!("\n═══════════════════════════════════════");
    println!("        TEST RESULTS SUMMARY");
    println!("═══════════════════════════════════════");

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.success).count();

    println!("Total Tests: {}", total_tests);
    println!("Passed:      {} ✓", passed_tests);
    println!("Failed:      {} ✗", total_tests - passed_tests);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!(
            "{} {} ({} µs, {} bytes)",
            status,
            result.scenario_name,
            result.duration.as_micros(),
            result.metrics.payload_bytes
        );
        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }
    }
}
