use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use sbiv_contracts::{RawEcall, SbiCall, SbiRet};

use crate::dispatch::{Control, Dispatcher};
use crate::platform::Platform;

/// A guest program's view of one hart: it can only trap into the dispatcher.
///
/// `ecall` packages the typed call into the register frame and hands it to
/// the host, so every guest call exercises the same encode/decode path real
/// test images would.
#[derive(Clone)]
pub struct HartHandle {
    hart_id: u64,
    dispatcher: Arc<Dispatcher>,
}

impl HartHandle {
    /// Stable for the hart's lifetime.
    pub fn hart_id(&self) -> u64 {
        self.hart_id
    }

    pub fn ecall(&self, call: SbiCall) -> Control {
        self.ecall_raw(&call.encode())
    }

    /// Traps with a hand-built frame, bypassing the typed encoder. This is
    /// how a guest probes ids the encoder cannot produce.
    pub fn ecall_raw(&self, raw: &RawEcall) -> Control {
        self.dispatcher.handle_ecall(self.hart_id, raw)
    }

    /// Convenience for calls documented to resume.
    pub fn call(&self, call: SbiCall) -> SbiRet {
        self.ecall(call).expect_resume()
    }

    pub fn sync_set(&self, flag: u64) {
        self.call(SbiCall::SyncSet { flag });
    }

    pub fn sync_wait(&self, flag: u64) {
        self.call(SbiCall::SyncWait { flag });
    }

    pub fn time_start(&self) {
        self.call(SbiCall::TimeStart);
    }

    /// Interval in nanoseconds, or the SBI error code from a missing mark.
    pub fn time_end(&self) -> SbiRet {
        self.call(SbiCall::TimeEnd)
    }

    pub fn report_success(&self) {
        self.call(SbiCall::Success);
    }

    pub fn report_failed(&self) {
        self.call(SbiCall::Failed);
    }
}

/// A multi-hart test VM: guest programs run as OS threads, one per hart,
/// against a shared dispatcher. There is no scheduler; harts run
/// concurrently and independently, exactly as the protocol assumes.
pub struct TestVm {
    dispatcher: Arc<Dispatcher>,
    harts: Vec<Option<JoinHandle<()>>>,
}

impl TestVm {
    pub fn new(nharts: u64, platform: Arc<dyn Platform>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(nharts, platform)),
            harts: (0..nharts).map(|_| None).collect(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Handle for issuing calls from the orchestrating host's own thread
    /// (e.g. injecting work on behalf of a hart in tests).
    pub fn hart(&self, hart_id: u64) -> HartHandle {
        HartHandle {
            hart_id,
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Runs `program` on the given hart. Each hart runs at most one program
    /// per test image.
    pub fn spawn<F>(&mut self, hart_id: u64, program: F) -> Result<()>
    where
        F: FnOnce(HartHandle) + Send + 'static,
    {
        let slot = match self.harts.get_mut(hart_id as usize) {
            Some(slot) => slot,
            None => bail!("hart {hart_id} out of range (nharts = {})", self.harts.len()),
        };
        if slot.is_some() {
            bail!("hart {hart_id} already has a program");
        }

        let handle = HartHandle {
            hart_id,
            dispatcher: self.dispatcher.clone(),
        };
        let joined = thread::Builder::new()
            .name(format!("hart-{hart_id}"))
            .spawn(move || program(handle))
            .with_context(|| format!("spawn hart {hart_id}"))?;
        *slot = Some(joined);
        Ok(())
    }

    /// Waits for every spawned hart to finish its program. A panic inside a
    /// guest program is confined to its hart thread and surfaces here, after
    /// all other harts have been joined.
    pub fn join(&mut self) -> Result<()> {
        let mut panicked: Vec<usize> = Vec::new();
        for (hart_id, slot) in self.harts.iter_mut().enumerate() {
            if let Some(handle) = slot.take() {
                if handle.join().is_err() {
                    panicked.push(hart_id);
                }
            }
        }
        if !panicked.is_empty() {
            bail!("guest programs panicked on harts {panicked:?}");
        }
        Ok(())
    }
}
