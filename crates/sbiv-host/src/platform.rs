use std::collections::VecDeque;
use std::sync::Mutex;

/// Remote fence request, as read from the legacy fence calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceRequest {
    FenceI { hart_mask: u64 },
    SfenceVma { hart_mask: u64, addr: u64, size: u64 },
    SfenceVmaAsid { hart_mask: u64, addr: u64, size: u64, asid: u64 },
}

/// Host-level device and interrupt-controller surface consumed by the
/// dispatcher. The legacy STANDARD extensions map onto these operations;
/// their internals are out of scope for the harness.
pub trait Platform: Send + Sync {
    fn set_timer(&self, hart: u64, deadline: u64);

    fn console_putchar(&self, ch: u8);

    fn console_getchar(&self) -> u8;

    fn clear_ipi(&self, hart: u64);

    /// Valid bits of the guest-supplied hart mask, after the dispatcher has
    /// filtered out-of-range targets.
    fn send_ipi(&self, hart_mask: u64);

    fn remote_fence(&self, request: FenceRequest);

    /// SHUTDOWN is intercepted: the platform is notified and the calling
    /// hart's loop ends, but the host process keeps running.
    fn shutdown(&self, hart: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    SetTimer { hart: u64, deadline: u64 },
    ClearIpi { hart: u64 },
    SendIpi { hart_mask: u64 },
    RemoteFence(FenceRequest),
    Shutdown { hart: u64 },
}

/// Platform that records every operation and buffers console traffic, used
/// both by the runner (console capture for the report) and by tests.
#[derive(Default)]
pub struct RecordingPlatform {
    events: Mutex<Vec<PlatformEvent>>,
    console_out: Mutex<Vec<u8>>,
    console_in: Mutex<VecDeque<u8>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for CONSOLE_GETCHAR to hand out.
    pub fn queue_input(&self, bytes: &[u8]) {
        self.console_in
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(bytes.iter().copied());
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn console_output(&self) -> Vec<u8> {
        self.console_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, event: PlatformEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl Platform for RecordingPlatform {
    fn set_timer(&self, hart: u64, deadline: u64) {
        self.record(PlatformEvent::SetTimer { hart, deadline });
    }

    fn console_putchar(&self, ch: u8) {
        self.console_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ch);
    }

    fn console_getchar(&self) -> u8 {
        self.console_in
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(0)
    }

    fn clear_ipi(&self, hart: u64) {
        self.record(PlatformEvent::ClearIpi { hart });
    }

    fn send_ipi(&self, hart_mask: u64) {
        self.record(PlatformEvent::SendIpi { hart_mask });
    }

    fn remote_fence(&self, request: FenceRequest) {
        self.record(PlatformEvent::RemoteFence(request));
    }

    fn shutdown(&self, hart: u64) {
        self.record(PlatformEvent::Shutdown { hart });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_echo_round_trip() {
        let platform = RecordingPlatform::new();
        platform.queue_input(b"ok");
        assert_eq!(platform.console_getchar(), b'o');
        assert_eq!(platform.console_getchar(), b'k');
        // Drained queue yields NUL rather than blocking.
        assert_eq!(platform.console_getchar(), 0);

        platform.console_putchar(b'!');
        assert_eq!(platform.console_output(), b"!");
    }

    #[test]
    fn events_are_recorded_in_order() {
        let platform = RecordingPlatform::new();
        platform.set_timer(0, 99);
        platform.send_ipi(0b10);
        assert_eq!(
            platform.events(),
            vec![
                PlatformEvent::SetTimer { hart: 0, deadline: 99 },
                PlatformEvent::SendIpi { hart_mask: 0b10 },
            ]
        );
    }
}
