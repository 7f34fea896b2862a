use std::sync::Arc;
use std::{thread, time};

use sbiv_contracts::{error_code::*, DecodeError, RawEcall, SbiCall, SbiRet, ECALL_VM_TEST_END};

use crate::irq::VirtualIrqChip;
use crate::outcome::{OutcomeCell, TestOutcome};
use crate::platform::{FenceRequest, Platform};
use crate::sync::SyncBoard;
use crate::timing::TimeBoard;

/// What the hart loop does after a handled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Resume the guest with the given return registers.
    Resume(SbiRet),

    /// SHUTDOWN: the calling hart never resumes.
    Shutdown,

    /// VM_TEST_END: end the current test image, hand control back to the
    /// orchestrating host.
    TestEnd,
}

impl Control {
    /// Return value for calls documented to resume; panics on the
    /// non-returning dispositions, so tests misusing it fail loudly.
    pub fn expect_resume(self) -> SbiRet {
        match self {
            Control::Resume(ret) => ret,
            other => panic!("call did not resume: {other:?}"),
        }
    }
}

/// Routes decoded calls to their handlers.
///
/// One dispatcher per test VM. Every core-detected error resolves locally
/// inside the dispatch call: an unknown extension id comes back to the guest
/// as `SBI_ERR_NOT_SUPPORTED`, a timing misuse as `SBI_ERR_FAILURE`; nothing
/// unwinds across hart boundaries.
pub struct Dispatcher {
    nharts: u64,
    platform: Arc<dyn Platform>,
    irq: VirtualIrqChip,
    sync: SyncBoard,
    timers: TimeBoard,
    outcome: OutcomeCell,
}

impl Dispatcher {
    pub fn new(nharts: u64, platform: Arc<dyn Platform>) -> Self {
        Self {
            nharts,
            platform,
            irq: VirtualIrqChip::new(nharts),
            sync: SyncBoard::new(),
            timers: TimeBoard::new(),
            outcome: OutcomeCell::new(),
        }
    }

    pub fn nharts(&self) -> u64 {
        self.nharts
    }

    pub fn irq(&self) -> &VirtualIrqChip {
        &self.irq
    }

    pub fn sync(&self) -> &SyncBoard {
        &self.sync
    }

    pub fn outcome(&self) -> &OutcomeCell {
        &self.outcome
    }

    /// Entry point for a trapped frame. The terminator sentinel is checked
    /// before extension routing, as in the vcpu exit path it models.
    pub fn handle_ecall(&self, hart: u64, raw: &RawEcall) -> Control {
        if raw.ext_id == ECALL_VM_TEST_END {
            return Control::TestEnd;
        }

        match raw.decode() {
            Ok(call) => self.dispatch(hart, call),
            Err(DecodeError::UnknownExtension { ext_id }) => {
                eprintln!("ext id 0x{ext_id:x} has no registered handler");
                Control::Resume(SbiRet::err(SBI_ERR_NOT_SUPPORTED))
            }
        }
    }

    /// Invokes exactly one handler for the call.
    pub fn dispatch(&self, hart: u64, call: SbiCall) -> Control {
        match call {
            SbiCall::SetTimer { deadline } => {
                self.platform.set_timer(hart, deadline);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::ConsolePutchar { ch } => {
                self.platform.console_putchar(ch);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::ConsoleGetchar => {
                let ch = self.platform.console_getchar();
                Control::Resume(SbiRet::ok(u64::from(ch)))
            }
            SbiCall::ClearIpi => {
                self.irq.clear(hart);
                self.platform.clear_ipi(hart);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::SendIpi { hart_mask } => {
                let delivered = self.deliver_ipi_mask(hart_mask);
                self.platform.send_ipi(delivered);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::RemoteFenceI { hart_mask } => {
                self.platform.remote_fence(FenceRequest::FenceI { hart_mask });
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::RemoteSfenceVma {
                hart_mask,
                addr,
                size,
            } => {
                self.platform
                    .remote_fence(FenceRequest::SfenceVma { hart_mask, addr, size });
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::RemoteSfenceVmaAsid {
                hart_mask,
                addr,
                size,
                asid,
            } => {
                self.platform.remote_fence(FenceRequest::SfenceVmaAsid {
                    hart_mask,
                    addr,
                    size,
                    asid,
                });
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::Shutdown => {
                self.platform.shutdown(hart);
                Control::Shutdown
            }
            SbiCall::HuUserIpi { target } | SbiCall::HuVirtualIpi { target } => {
                self.irq.trigger(target);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::GetVcpuId => Control::Resume(SbiRet::ok(hart)),
            SbiCall::SyncWait { flag } => {
                self.sync.wait(flag);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::SyncSet { flag } => {
                self.sync.set(flag);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::TimeStart => {
                self.timers.start(hart);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::TimeEnd => match self.timers.end(hart) {
                Ok(interval) => Control::Resume(SbiRet::ok(interval.as_nanos() as u64)),
                Err(err) => {
                    eprintln!("{err}");
                    Control::Resume(SbiRet::err(SBI_ERR_FAILURE))
                }
            },
            SbiCall::Success => {
                self.outcome.report(TestOutcome::Success);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::Failed => {
                self.outcome.report(TestOutcome::Failed);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::HuLoop => {
                self.hu_loop(hart);
                Control::Resume(SbiRet::ok(0))
            }
            SbiCall::VmTestEnd => Control::TestEnd,
        }
    }

    /// Walks the hart mask, raising each valid target's line. Returns the
    /// mask of targets actually delivered; invalid bits are counted by the
    /// irq chip and skipped.
    fn deliver_ipi_mask(&self, hart_mask: u64) -> u64 {
        let mut delivered = 0u64;
        for i in 0..u64::BITS as u64 {
            if (1 << i) & hart_mask != 0 && self.irq.trigger(i) {
                delivered |= 1 << i;
            }
        }
        delivered
    }

    /// Spins in the host until an interrupt is injected on this hart's line.
    /// Under normal operation nothing injects one and the call never ends.
    fn hu_loop(&self, hart: u64) {
        self.irq.set_looping(hart, true);
        while !self.irq.claim(hart) {
            let ten_millis = time::Duration::from_millis(10);
            thread::sleep(ten_millis);
        }
        self.irq.set_looping(hart, false);
    }
}
