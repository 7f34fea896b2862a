use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Pass/fail verdict of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOutcome {
    Unreported,
    Success,
    Failed,
}

/// Outcome record for the current run. SUCCESS/FAILED overwrite whatever
/// was there before; the host test-runner reads the final value after the
/// terminator. `reset` reinitializes the cell for the next run.
#[derive(Default)]
pub struct OutcomeCell {
    outcome: Mutex<Option<TestOutcome>>,
}

impl OutcomeCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, outcome: TestOutcome) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
    }

    pub fn snapshot(&self) -> TestOutcome {
        self.outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(TestOutcome::Unreported)
    }

    pub fn reset(&self) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
