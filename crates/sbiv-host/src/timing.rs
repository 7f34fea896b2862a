use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoOpenMark {
    pub hart: u64,
}

impl std::fmt::Display for NoOpenMark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TIME_END on hart {} with no open mark", self.hart)
    }
}

impl std::error::Error for NoOpenMark {}

/// Per-hart timing brackets. At most one open mark per hart; re-issuing
/// TIME_START overwrites the previous mark (last write wins), TIME_END
/// closes it.
#[derive(Default)]
pub struct TimeBoard {
    marks: Mutex<BTreeMap<u64, Instant>>,
}

impl TimeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, hart: u64) {
        self.marks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hart, Instant::now());
    }

    pub fn end(&self, hart: u64) -> Result<Duration, NoOpenMark> {
        self.marks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&hart)
            .map(|mark| mark.elapsed())
            .ok_or(NoOpenMark { hart })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn end_after_start_is_nonnegative() {
        let board = TimeBoard::new();
        board.start(0);
        let interval = board.end(0).expect("open mark");
        assert!(interval >= Duration::ZERO);
    }

    #[test]
    fn end_without_start_fails() {
        let board = TimeBoard::new();
        assert_eq!(board.end(3), Err(NoOpenMark { hart: 3 }));
    }

    #[test]
    fn end_closes_the_mark() {
        let board = TimeBoard::new();
        board.start(1);
        board.end(1).expect("open mark");
        assert_eq!(board.end(1), Err(NoOpenMark { hart: 1 }));
    }

    #[test]
    fn restart_overwrites_the_mark() {
        let board = TimeBoard::new();
        board.start(0);
        thread::sleep(Duration::from_millis(30));
        board.start(0);
        let interval = board.end(0).expect("open mark");
        assert!(interval < Duration::from_millis(30));
    }

    #[test]
    fn marks_are_per_hart() {
        let board = TimeBoard::new();
        board.start(0);
        assert_eq!(board.end(1), Err(NoOpenMark { hart: 1 }));
        board.end(0).expect("hart 0 mark untouched");
    }
}
