//! End-to-end protocol scenarios over a real multi-hart VM: guest programs
//! on hart threads, calls round-tripping the register-frame ABI.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sbiv_contracts::{error_code, RawEcall, SbiCall};
use sbiv_host::{Control, RecordingPlatform, TestOutcome, TestVm};

fn vm(nharts: u64) -> (Arc<RecordingPlatform>, TestVm) {
    let platform = Arc::new(RecordingPlatform::new());
    let vm = TestVm::new(nharts, platform.clone());
    (platform, vm)
}

/// Hart 0 reports SUCCESS then terminates; the host observes the outcome,
/// the termination, and no further processing on that hart.
#[test]
fn success_then_terminator() {
    let (_, mut vm) = vm(1);
    vm.spawn(0, |h| {
        h.report_success();
        assert_eq!(h.ecall(SbiCall::VmTestEnd), Control::TestEnd);
        // A well-behaved image stops issuing calls here.
    })
    .expect("spawn");
    vm.join().expect("join");
    assert_eq!(vm.dispatcher().outcome().snapshot(), TestOutcome::Success);
}

/// Hart 1 waits on a flag before hart 0 sets it: the waiter must stay
/// blocked until SET completes, then proceed.
#[test]
fn wait_blocks_until_set() {
    const FLAG: u64 = 1;
    let (_, mut vm) = vm(2);
    let set_done = Arc::new(AtomicBool::new(false));

    let observed = set_done.clone();
    vm.spawn(1, move |h| {
        h.sync_wait(FLAG);
        assert!(
            observed.load(Ordering::SeqCst),
            "waiter released before SET completed"
        );
        h.report_success();
        h.ecall(SbiCall::VmTestEnd);
    })
    .expect("spawn waiter");

    let set_done = set_done.clone();
    vm.spawn(0, move |h| {
        // Give the waiter time to park first.
        thread::sleep(Duration::from_millis(50));
        set_done.store(true, Ordering::SeqCst);
        h.sync_set(FLAG);
    })
    .expect("spawn setter");

    vm.join().expect("join");
    assert_eq!(vm.dispatcher().outcome().snapshot(), TestOutcome::Success);
}

/// A single SET releases every concurrently blocked waiter.
#[test]
fn one_set_releases_all_waiting_harts() {
    const FLAG: u64 = 2;
    const WAITERS: u64 = 3;
    let (_, mut vm) = vm(WAITERS + 1);
    let released = Arc::new(AtomicUsize::new(0));

    for hart in 1..=WAITERS {
        let released = released.clone();
        vm.spawn(hart, move |h| {
            h.sync_wait(FLAG);
            released.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn waiter");
    }

    let check = released.clone();
    vm.spawn(0, move |h| {
        thread::sleep(Duration::from_millis(50));
        assert_eq!(check.load(Ordering::SeqCst), 0, "released before SET");
        h.sync_set(FLAG);
    })
    .expect("spawn setter");

    vm.join().expect("join");
    assert_eq!(released.load(Ordering::SeqCst), WAITERS as usize);
}

/// An unregistered extension id yields `SBI_ERR_NOT_SUPPORTED` to the
/// issuing hart; the host keeps processing calls afterwards.
#[test]
fn unknown_extension_is_recoverable() {
    let (_, mut vm) = vm(1);
    vm.spawn(0, |h| h.report_success()).expect("spawn");
    vm.join().expect("join");

    // Raw frame straight at the dispatcher, as a hand-rolled guest would.
    let mut raw = RawEcall::new(0xDEADBEEF);
    raw.args[0] = 42;
    let ret = vm.dispatcher().handle_ecall(0, &raw).expect_resume();
    assert_eq!(ret.error, error_code::SBI_ERR_NOT_SUPPORTED);

    // The host keeps dispatching after the unknown call.
    let ret = vm.dispatcher().dispatch(0, SbiCall::GetVcpuId).expect_resume();
    assert!(ret.is_ok());
    assert_eq!(vm.dispatcher().outcome().snapshot(), TestOutcome::Success);
}

/// Timing bracket on one hart: non-negative interval, and a second TIME_END
/// fails because the mark is closed.
#[test]
fn timing_bracket_per_hart() {
    let (_, mut vm) = vm(2);
    vm.spawn(0, |h| {
        h.time_start();
        thread::sleep(Duration::from_millis(5));
        let ret = h.time_end();
        assert!(ret.is_ok());
        assert!(ret.value >= Duration::from_millis(5).as_nanos() as u64);

        let ret = h.time_end();
        assert_eq!(ret.error, error_code::SBI_ERR_FAILURE);
    })
    .expect("spawn");

    // Hart 1 never opened a mark.
    vm.spawn(1, |h| {
        assert_eq!(h.time_end().error, error_code::SBI_ERR_FAILURE);
    })
    .expect("spawn");

    vm.join().expect("join");
}

/// HU_LOOP keeps the hart busy in the host; only an externally injected
/// interrupt ends it.
#[test]
fn loop_ends_only_on_injected_interrupt() {
    let (_, mut vm) = vm(1);
    vm.spawn(0, |h| {
        let start = Instant::now();
        h.call(SbiCall::HuLoop);
        // Injection happens ~100ms in; returning early means the loop
        // ended without an interrupt.
        assert!(start.elapsed() >= Duration::from_millis(80));
        h.report_success();
        h.ecall(SbiCall::VmTestEnd);
    })
    .expect("spawn");

    let dispatcher = vm.dispatcher().clone();
    while !dispatcher.irq().is_looping(0) {
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(100));
    assert!(dispatcher.irq().is_looping(0), "loop ended without injection");
    dispatcher.irq().trigger(0);

    vm.join().expect("join");
    assert_eq!(vm.dispatcher().outcome().snapshot(), TestOutcome::Success);
}

/// A hart busy in HU_LOOP still receives an IPI sent by another hart.
#[test]
fn ipi_delivery_into_a_busy_hart() {
    let (_, mut vm) = vm(2);
    vm.spawn(1, |h| {
        h.call(SbiCall::HuLoop);
        h.report_success();
    })
    .expect("spawn busy hart");

    vm.spawn(0, move |h| {
        // HU_USER_IPI at a looping hart acts as the injected interrupt.
        thread::sleep(Duration::from_millis(50));
        h.call(SbiCall::HuUserIpi { target: 1 });
    })
    .expect("spawn sender");

    vm.join().expect("join");
    assert_eq!(vm.dispatcher().outcome().snapshot(), TestOutcome::Success);
}

/// SHUTDOWN is intercepted by the platform and never resumes the hart.
#[test]
fn shutdown_is_intercepted() {
    let (platform, mut vm) = vm(1);
    vm.spawn(0, |h| {
        assert_eq!(h.ecall(SbiCall::Shutdown), Control::Shutdown);
    })
    .expect("spawn");
    vm.join().expect("join");
    assert_eq!(
        platform.events(),
        vec![sbiv_host::PlatformEvent::Shutdown { hart: 0 }]
    );
}

/// Console putchar traffic lands in the platform buffer in guest order.
#[test]
fn console_output_is_captured() {
    let (platform, mut vm) = vm(1);
    vm.spawn(0, |h| {
        for ch in b"hart ok" {
            h.call(SbiCall::ConsolePutchar { ch: *ch });
        }
    })
    .expect("spawn");
    vm.join().expect("join");
    assert_eq!(platform.console_output(), b"hart ok");
}
