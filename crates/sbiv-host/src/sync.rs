use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};

struct FlagCell {
    state: Mutex<bool>,
    cond: Condvar,
}

/// One-shot broadcast rendezvous flags, keyed by flag id.
///
/// A flag moves UNSET -> SET exactly once per round; `set` is idempotent and
/// a single SET releases every waiter, current and future, until the owning
/// hart explicitly starts a new round with `reset`. The flag word itself is
/// never exposed: the mutex/condvar pair provides the release/acquire edge,
/// so a WAIT issued after SET has returned can never miss the wakeup.
#[derive(Default)]
pub struct SyncBoard {
    flags: Mutex<BTreeMap<u64, Arc<FlagCell>>>,
}

impl SyncBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, flag: u64) -> Arc<FlagCell> {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        flags
            .entry(flag)
            .or_insert_with(|| {
                Arc::new(FlagCell {
                    state: Mutex::new(false),
                    cond: Condvar::new(),
                })
            })
            .clone()
    }

    /// UNSET -> SET; repeating the call leaves observable state unchanged.
    pub fn set(&self, flag: u64) {
        let cell = self.cell(flag);
        let mut state = cell.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = true;
        cell.cond.notify_all();
    }

    /// Parks until the flag is SET; returns immediately if it already is.
    pub fn wait(&self, flag: u64) {
        let cell = self.cell(flag);
        let mut state = cell.state.lock().unwrap_or_else(|e| e.into_inner());
        while !*state {
            state = cell.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Reinitializes the flag for a new round. The caller owns the round;
    /// resetting while a previous round still has waiters is unsupported.
    pub fn reset(&self, flag: u64) {
        let cell = self.cell(flag);
        let mut state = cell.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = false;
    }
}
