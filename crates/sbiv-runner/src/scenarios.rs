//! Built-in guest test programs, one per scenario. These are the redesigned
//! counterparts of the per-test guest images: each exercises one protocol
//! property and reports SUCCESS/FAILED before terminating.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;

use sbiv_contracts::SbiCall;
use sbiv_host::TestVm;

use crate::{outcome_from_probe, probe_unknown_extension};

/// Rendezvous flag the coordinator sets for all waiters.
const FLAG_GO: u64 = 0;

/// Per-waiter completion flags start here (flag GO + hart id).
const FLAG_DONE_BASE: u64 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum Scenario {
    /// Hart 0 releases every other hart with one SYNC_SET, then waits for
    /// each of them on its own done flag.
    SyncRendezvous,

    /// TIME_START / TIME_END bracket around a short busy period.
    TimingBracket,

    /// A hart raises a virtual IPI at itself, then proves delivery by
    /// entering HU_LOOP, which ends immediately on the pending interrupt.
    SelfVipi,

    /// Hart 1 spins in HU_LOOP until hart 0 injects a user IPI.
    LoopInterrupt,

    /// A frame with an unregistered extension id must come back
    /// NOT_SUPPORTED without taking the host down.
    UnknownExtension,

    /// CONSOLE_GETCHAR until newline, echoing through CONSOLE_PUTCHAR.
    ConsoleEcho,

    /// SYNC_WAIT on a flag nobody sets; exists to exercise the watchdog.
    Hang,
}

impl Scenario {
    pub fn min_harts(&self) -> u64 {
        match self {
            Scenario::SyncRendezvous | Scenario::LoopInterrupt => 2,
            _ => 1,
        }
    }

    /// Name of the scenario's compiled unit, used for the report and the
    /// layout manifest.
    pub fn image_name(&self) -> &'static str {
        match self {
            Scenario::SyncRendezvous => "sync_rendezvous",
            Scenario::TimingBracket => "timing_bracket",
            Scenario::SelfVipi => "self_vipi",
            Scenario::LoopInterrupt => "loop_interrupt",
            Scenario::UnknownExtension => "unknown_extension",
            Scenario::ConsoleEcho => "console_echo",
            Scenario::Hang => "hang",
        }
    }

    /// Spawns the scenario's guest programs onto the VM's harts.
    pub(crate) fn install(
        &self,
        vm: &mut TestVm,
        harts: u64,
        interval_ns: Arc<Mutex<Option<u64>>>,
    ) -> Result<()> {
        match self {
            Scenario::SyncRendezvous => {
                for hart in 1..harts {
                    vm.spawn(hart, move |h| {
                        h.sync_wait(FLAG_GO);
                        h.sync_set(FLAG_DONE_BASE + h.hart_id());
                    })?;
                }
                vm.spawn(0, move |h| {
                    h.sync_set(FLAG_GO);
                    for hart in 1..harts {
                        h.sync_wait(FLAG_DONE_BASE + hart);
                    }
                    h.report_success();
                    h.ecall(SbiCall::VmTestEnd);
                })?;
            }
            Scenario::TimingBracket => {
                vm.spawn(0, move |h| {
                    h.time_start();
                    thread::sleep(Duration::from_millis(2));
                    let ret = h.time_end();
                    *interval_ns.lock().unwrap_or_else(|e| e.into_inner()) = Some(ret.value);
                    if ret.is_ok() {
                        h.report_success();
                    } else {
                        h.report_failed();
                    }
                    h.ecall(SbiCall::VmTestEnd);
                })?;
            }
            Scenario::SelfVipi => {
                vm.spawn(0, |h| {
                    h.call(SbiCall::HuVirtualIpi { target: h.hart_id() });
                    // Delivery proof: the pending interrupt ends the loop
                    // without external help.
                    h.call(SbiCall::HuLoop);
                    h.report_success();
                    h.ecall(SbiCall::VmTestEnd);
                })?;
            }
            Scenario::LoopInterrupt => {
                vm.spawn(1, |h| {
                    h.call(SbiCall::HuLoop);
                    h.report_success();
                    h.ecall(SbiCall::VmTestEnd);
                })?;
                vm.spawn(0, |h| {
                    thread::sleep(Duration::from_millis(50));
                    h.call(SbiCall::HuUserIpi { target: 1 });
                })?;
            }
            Scenario::UnknownExtension => {
                vm.spawn(0, |h| {
                    let error = probe_unknown_extension(&h);
                    h.call(outcome_from_probe(error));
                    h.ecall(SbiCall::VmTestEnd);
                })?;
            }
            Scenario::ConsoleEcho => {
                vm.spawn(0, |h| {
                    loop {
                        let ret = h.call(SbiCall::ConsoleGetchar);
                        let ch = ret.value as u8;
                        if ch == 0 {
                            h.report_failed();
                            break;
                        }
                        h.call(SbiCall::ConsolePutchar { ch });
                        if ch == b'\n' {
                            h.report_success();
                            break;
                        }
                    }
                    h.ecall(SbiCall::VmTestEnd);
                })?;
            }
            Scenario::Hang => {
                vm.spawn(0, |h| {
                    // Nobody ever sets this flag.
                    h.sync_wait(u64::MAX);
                })?;
            }
        }
        Ok(())
    }

    /// Input the console-echo image expects queued on the platform.
    pub fn scripted_input(&self) -> Option<&'static [u8]> {
        match self {
            Scenario::ConsoleEcho => Some(b"getchar succeed\n"),
            _ => None,
        }
    }
}
