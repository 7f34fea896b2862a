use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use sbiv_host::TestOutcome;
use sbiv_runner::{builtin_layout_manifest, run_scenario, write_report, RunnerConfig, Scenario};

#[derive(Parser)]
#[command(name = "sbiv-runner")]
#[command(about = "Runs SBI protocol scenarios on a multi-hart test VM.", long_about = None)]
struct Cli {
    #[arg(long, value_enum)]
    scenario: Option<Scenario>,

    #[arg(long, default_value_t = 2)]
    harts: u64,

    /// Watchdog deadline for the whole run.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Write the JSON run report here instead of stdout.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Emit the layout manifest for the built-in images and exit.
    #[arg(long, value_name = "PATH")]
    emit_layout: Option<PathBuf>,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(passed) => {
            if passed {
                std::process::ExitCode::SUCCESS
            } else {
                std::process::ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("sbiv-runner: {err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<bool> {
    let cli = Cli::parse();

    if let Some(path) = &cli.emit_layout {
        let manifest = builtin_layout_manifest()?;
        let text = serde_json::to_string_pretty(&manifest).context("serialize layout manifest")?;
        std::fs::write(path, text)
            .with_context(|| format!("write layout manifest: {}", path.display()))?;
        return Ok(true);
    }

    let scenario = cli
        .scenario
        .context("--scenario is required unless --emit-layout is given")?;
    let cfg = RunnerConfig {
        scenario,
        harts: cli.harts,
        timeout: Duration::from_millis(cli.timeout_ms),
    };

    let report = run_scenario(&cfg)?;
    match &cli.report {
        Some(path) => write_report(&report, path)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        ),
    }

    Ok(report.outcome == TestOutcome::Success && !report.timed_out)
}
