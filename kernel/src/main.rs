//! taskkernel - CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use taskkernel::cli::{Cli, Command, OutputFormat};
use taskkernel::config::Config;
use taskkernel::executor::SimulatedExecutor;
use taskkernel::governor::Mode;
use taskkernel::harness::{all_seed_tests, run_test, seed_test, TestResult};
use taskkernel::kernel::{Bundle, Kernel, RunConfig};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("taskkernel").join("logs");

    fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    match cli.command {
        Command::RunTest { test_id, format } => run_test_command(test_id, format).await,
        Command::ExportBundle { run_id } => export_bundle_command(run_id, &config).await,
        Command::Replay { bundle_path } => replay_command(bundle_path),
        Command::ListTests => list_tests_command(),
    }
}

async fn run_test_command(test_id: Option<String>, format: OutputFormat) -> Result<()> {
    let specs = match test_id {
        Some(id) => {
            let spec = seed_test(&id).ok_or_else(|| eyre::eyre!("unknown test id: {id}"))?;
            vec![spec]
        }
        None => all_seed_tests(),
    };

    let mut results: Vec<TestResult> = Vec::with_capacity(specs.len());
    for spec in &specs {
        results.push(run_test(spec).await);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report_json(&results))?),
        OutputFormat::Text => print_text_report(&results),
    }

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_text_report(results: &[TestResult]) {
    for result in results {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "[{status}] {} score={:.2} events={} duration_ms={}",
            result.test_id, result.score, result.event_count, result.duration_ms
        );
        if let Some(err) = &result.error {
            println!("  error: {err}");
        }
        for (category, weighted) in &result.breakdown {
            println!("  {category}: {weighted:.2}");
        }
    }
}

fn report_json(results: &[TestResult]) -> serde_json::Value {
    serde_json::json!(results
        .iter()
        .map(|r| serde_json::json!({
            "test_id": r.test_id,
            "passed": r.passed,
            "score": r.score,
            "duration_ms": r.duration_ms,
            "event_count": r.event_count,
            "error": r.error,
            "breakdown": r.breakdown,
        }))
        .collect::<Vec<_>>())
}

fn list_tests_command() -> Result<()> {
    for spec in all_seed_tests() {
        println!("{} [{}] difficulty={} - {}", spec.id, spec.category, spec.difficulty, spec.description);
    }
    Ok(())
}

async fn export_bundle_command(run_id: String, config: &Config) -> Result<()> {
    let mut run_config = RunConfig::new("cli", run_id);
    run_config.mode = Mode::Autonomous;
    run_config.budgets = config.run.budgets;
    run_config.checkpoint_interval = config.run.checkpoint_interval;
    run_config.risk_policy = config.run.risk_policy.clone();

    let mut kernel = Kernel::with_default_executor(run_config);
    kernel.start().await;
    let bundle = kernel.export_bundle();

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

/// Reconstructs a kernel from a bundle and re-exports it, comparing the freshly-derived final
/// snapshot checksum against the one recorded in the bundle. Exits non-zero on mismatch.
fn replay_command(bundle_path: PathBuf) -> Result<()> {
    let content = fs::read_to_string(&bundle_path).context("failed to read bundle file")?;
    let bundle: Bundle = serde_json::from_str(&content).context("failed to parse bundle JSON")?;
    let expected_checksum = bundle.final_snapshot.checksum.clone();

    let mut kernel = Kernel::from_bundle(bundle, Box::new(SimulatedExecutor));
    let replayed = kernel.export_bundle();
    let actual_checksum = replayed.final_snapshot.checksum.clone();

    println!("expected: {expected_checksum}");
    println!("actual:   {actual_checksum}");

    if expected_checksum == actual_checksum {
        println!("replay OK");
        Ok(())
    } else {
        println!("replay MISMATCH");
        std::process::exit(1);
    }
}
