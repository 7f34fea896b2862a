use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct IrqLine {
    pending: AtomicBool,
    /* Set while the hart spins inside HU_LOOP. */
    looping: AtomicBool,
}

/// Per-hart virtual interrupt lines.
///
/// HU_USER_IPI, HU_VIRTUAL_IPI and SEND_IPI raise a target hart's pending
/// bit; a hart busy in HU_LOOP leaves the loop only once it claims a pending
/// interrupt. Out-of-range targets are counted and skipped, never fatal.
pub struct VirtualIrqChip {
    lines: Vec<IrqLine>,
    invalid_targets: AtomicU64,
}

impl VirtualIrqChip {
    pub fn new(nharts: u64) -> Self {
        let lines = (0..nharts)
            .map(|_| IrqLine {
                pending: AtomicBool::new(false),
                looping: AtomicBool::new(false),
            })
            .collect();
        Self {
            lines,
            invalid_targets: AtomicU64::new(0),
        }
    }

    pub fn nharts(&self) -> u64 {
        self.lines.len() as u64
    }

    /// Raises the pending bit on `target`. Returns false (and counts the
    /// miss) for an out-of-range target.
    pub fn trigger(&self, target: u64) -> bool {
        match self.lines.get(target as usize) {
            Some(line) => {
                line.pending.store(true, Ordering::Release);
                true
            }
            None => {
                self.invalid_targets.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Consumes a pending interrupt on `hart`, if any.
    pub fn claim(&self, hart: u64) -> bool {
        match self.lines.get(hart as usize) {
            Some(line) => line.pending.swap(false, Ordering::AcqRel),
            None => false,
        }
    }

    pub fn clear(&self, hart: u64) {
        if let Some(line) = self.lines.get(hart as usize) {
            line.pending.store(false, Ordering::Release);
        }
    }

    pub fn is_pending(&self, hart: u64) -> bool {
        self.lines
            .get(hart as usize)
            .map(|line| line.pending.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// True while `hart` spins inside HU_LOOP; the injector can poll this to
    /// know the loop has been entered before injecting.
    pub fn is_looping(&self, hart: u64) -> bool {
        self.lines
            .get(hart as usize)
            .map(|line| line.looping.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub(crate) fn set_looping(&self, hart: u64, value: bool) {
        if let Some(line) = self.lines.get(hart as usize) {
            line.looping.store(value, Ordering::Release);
        }
    }

    pub fn invalid_targets(&self) -> u64 {
        self.invalid_targets.load(Ordering::SeqCst)
    }
}
