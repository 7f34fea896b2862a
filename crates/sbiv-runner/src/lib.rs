//! Orchestrating test-runner: built-in guest scenarios, watchdog
//! enforcement, and the machine-readable run report.
//!
//! The core protocol has no timeout of its own; a hung SYNC_WAIT or spin
//! call is detected here, by deadline, and kills exactly that run.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use sbiv_contracts::layout::{FunctionBoundary, LayoutManifest};
use sbiv_contracts::{error_code, RawEcall, SbiCall, RUN_REPORT_SCHEMA_VERSION};
use sbiv_host::{HartHandle, RecordingPlatform, TestOutcome, TestVm};

mod scenarios;

pub use scenarios::Scenario;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub scenario: Scenario,
    pub harts: u64,
    pub timeout: Duration,
}

/// Report handed to whoever orchestrates the harness. One report per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunReport {
    pub schema_version: String,
    pub scenario: String,
    pub harts: u64,
    pub outcome: TestOutcome,
    pub timed_out: bool,
    pub interval_ns: Option<u64>,
    pub invalid_ipi_targets: u64,
    pub console_output: String,
}

/// Runs one scenario under the watchdog and collects the report.
///
/// A run that misses the deadline is reported `timed_out: true` with the
/// outcome as last observed; its hart threads are abandoned (only that run
/// is lost, the host stays up).
pub fn run_scenario(cfg: &RunnerConfig) -> Result<RunReport> {
    let scenario = cfg.scenario;
    let harts = cfg.harts.max(scenario.min_harts());

    let platform = Arc::new(RecordingPlatform::new());
    if let Some(input) = scenario.scripted_input() {
        platform.queue_input(input);
    }
    let mut vm = TestVm::new(harts, platform.clone());
    let interval_ns = Arc::new(Mutex::new(None));

    scenario.install(&mut vm, harts, interval_ns.clone())?;

    let dispatcher = vm.dispatcher().clone();
    let (done_tx, done_rx) = mpsc::channel();
    thread::Builder::new()
        .name("vm-supervisor".to_string())
        .spawn(move || {
            let _ = done_tx.send(vm.join());
        })
        .context("spawn vm supervisor")?;

    let timed_out = match done_rx.recv_timeout(cfg.timeout) {
        Ok(joined) => {
            joined?;
            false
        }
        Err(RecvTimeoutError::Timeout) => true,
        Err(RecvTimeoutError::Disconnected) => {
            anyhow::bail!("vm supervisor exited without reporting")
        }
    };

    let interval_ns = *interval_ns.lock().unwrap_or_else(|e| e.into_inner());
    Ok(RunReport {
        schema_version: RUN_REPORT_SCHEMA_VERSION.to_string(),
        scenario: scenario.image_name().to_string(),
        harts,
        outcome: dispatcher.outcome().snapshot(),
        timed_out,
        interval_ns,
        invalid_ipi_targets: dispatcher.irq().invalid_targets(),
        console_output: String::from_utf8_lossy(&platform.console_output()).into_owned(),
    })
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, text).with_context(|| format!("write report: {}", path.display()))?;
    Ok(())
}

/// Layout manifest for the built-in images: each one is placed as a single
/// page-aligned function named after its compiling unit, so a loader can
/// map or protect the image's page independently.
pub fn builtin_layout_manifest() -> Result<LayoutManifest> {
    const IMAGE_BASE: u64 = 0x8000_0000;
    const IMAGE_STRIDE: u64 = 2 * sbiv_contracts::layout::PAGE_SIZE;
    const IMAGE_SIZE: u64 = 0x200;

    let mut boundaries = Vec::new();
    for (i, scenario) in Scenario::value_variants().iter().enumerate() {
        let start = IMAGE_BASE + i as u64 * IMAGE_STRIDE;
        boundaries.push(FunctionBoundary::file_scoped(
            scenario.image_name(),
            start,
            IMAGE_SIZE,
        )?);
    }
    let manifest = LayoutManifest::new(boundaries);
    manifest.validate()?;
    Ok(manifest)
}

/// Probe a hand-built frame with an id outside every registered range.
pub(crate) fn probe_unknown_extension(h: &HartHandle) -> i64 {
    let mut raw = RawEcall::new(0xDEADBEEF);
    raw.args[0] = 0x1234;
    h.ecall_raw(&raw).expect_resume().error
}

pub(crate) fn outcome_from_probe(error: i64) -> SbiCall {
    if error == error_code::SBI_ERR_NOT_SUPPORTED {
        SbiCall::Success
    } else {
        SbiCall::Failed
    }
}
