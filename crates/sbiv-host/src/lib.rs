//! Host side of the SBI verification harness.
//!
//! A [`Dispatcher`] decodes trapped ecall frames and routes them to handlers;
//! guest test programs run on hart threads owned by a [`TestVm`] and talk to
//! the dispatcher through [`HartHandle`], so every call round-trips the real
//! register-frame ABI. The interrupt controller and device surface sit behind
//! the [`Platform`] trait; the harness owns only the call protocol, the
//! synchronization flags, the timing brackets, and the pass/fail outcome.

mod dispatch;
mod irq;
mod outcome;
mod platform;
mod sync;
mod timing;
mod vm;

pub use dispatch::{Control, Dispatcher};
pub use irq::VirtualIrqChip;
pub use outcome::{OutcomeCell, TestOutcome};
pub use platform::{FenceRequest, Platform, PlatformEvent, RecordingPlatform};
pub use sync::SyncBoard;
pub use timing::{NoOpenMark, TimeBoard};
pub use vm::{HartHandle, TestVm};
