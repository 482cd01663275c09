//! End-to-End Test Runner for the OCPP overlay

use anyhow::Result;
use clap::Parser;
use ocpp_e2e::{run_scenario, scenarios, TestResult};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run, or "all"
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Output results to file as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ocpp_e2e={}", log_level).parse()?)
                .add_directive(format!("ocpp_node={}", log_level).parse()?)
                .add_directive(format!("relay_core={}", log_level).parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OCPP overlay E2E suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let selected: Vec<_> = scenarios::all()
        .into_iter()
        .filter(|s| args.scenario == "all" || s.name() == args.scenario)
        .collect();
    if selected.is_empty() {
        error!("Unknown test scenario: {}", args.scenario);
        return Ok(());
    }

    let mut results = Vec::with_capacity(selected.len());
    for scenario in &selected {
        results.push(run_scenario(scenario.as_ref()).await);
    }

    print_results_summary(&results);

    if let Some(output_path) = args.output {
        let json = serde_json::to_string_pretty(&results)?;
        tokio::fs::write(&output_path, json).await?;
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

    let passed = results.iter().filter(|r| r.success).count();
    println!("Total Tests: {}", results.len());
    println!("Passed:      {} ✓", passed);
    println!("Failed:      {} ✗", results.len() - passed);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!("{} {} ({} ms)", status, result.scenario_name, result.duration.as_millis());
        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }
        for check in result.checks.iter().filter(|c| !c.passed) {
            println!("      {}: {}", check.name, check.message);
        }
    }
}
