use std::hint;
use std::thread;

/// Backoff for the solver's stage barriers.
///
/// A worker that finishes its share of a stage bumps the shared completed-stage counter, then calls
/// `spin_once` until the counter reaches `worker_count * sync_stage`. One waiter is created per barrier.
/// The first few calls busy-spin with doubling counts, later calls yield the timeslice. It never sleeps,
/// so the worker stays on its core and keeps the bundles of the next batch warm in cache.
pub(crate) struct LocalSpinWait {
    pub wait_count: i32,
}

impl LocalSpinWait {
    pub const YIELD_THRESHOLD: i32 = 3;

    #[inline(always)]
    pub fn new() -> Self {
        Self { wait_count: 0 }
    }

    #[inline(always)]
    pub fn spin_once(&mut self) {
        if self.wait_count >= Self::YIELD_THRESHOLD {
            thread::yield_now();
        } else {
            let spin_count = 1 << self.wait_count;
            for _ in 0..spin_count {
                hint::spin_loop();
            }
            self.wait_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_wait_releases_once_every_worker_arrives() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let worker_count = 4;
        let completed_stages = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| {
                    completed_stages.fetch_add(1, Ordering::AcqRel);
                    let mut wait = LocalSpinWait::new();
                    while completed_stages.load(Ordering::Acquire) < worker_count {
                        wait.spin_once();
                    }
                    assert!(wait.wait_count <= LocalSpinWait::YIELD_THRESHOLD);
                });
            }
        });
        assert_eq!(completed_stages.load(Ordering::Relaxed), worker_count);
    }

    #[test]
    fn wait_count_saturates_at_yield_threshold() {
        let mut wait = LocalSpinWait::new();
        for _ in 0..10 {
            wait.spin_once();
        }
        assert_eq!(wait.wait_count, LocalSpinWait::YIELD_THRESHOLD);
    }
}
