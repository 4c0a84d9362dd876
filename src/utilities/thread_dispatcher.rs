/// Provides multithreading dispatch primitives and a thread count for the solver to use.
///
/// The solver does not need a load balancing parallel for. All it needs is a way to jumpstart some threads;
/// the scheduling inside a dispatch is its own. Wrapping an existing thread pool is usually enough.
pub trait ThreadDispatcher: Send + Sync {
    /// Gets the number of workers available in the thread dispatcher.
    ///
    /// The solver expects every worker to be backed by an independent thread capable of progressing while
    /// another is blocked at a barrier. If workers are not truly independent, the solver will deadlock.
    fn thread_count(&self) -> usize;

    /// Runs `worker_body` once per worker with worker indices `0..min(thread_count, maximum_worker_count)`
    /// and blocks until every invocation returns.
    fn dispatch_workers(&self, worker_body: &(dyn Fn(usize) + Sync), maximum_worker_count: usize);
}

/// Dispatcher spawning scoped threads for every dispatch. The calling thread acts as worker 0.
#[derive(Clone, Copy, Debug)]
pub struct SimpleThreadDispatcher {
    thread_count: usize,
}

impl SimpleThreadDispatcher {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count: thread_count.max(1),
        }
    }

    /// Creates a dispatcher with one worker per available hardware thread.
    pub fn with_available_parallelism() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1),
        )
    }
}

impl ThreadDispatcher for SimpleThreadDispatcher {
    #[inline(always)]
    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn dispatch_workers(&self, worker_body: &(dyn Fn(usize) + Sync), maximum_worker_count: usize) {
        let worker_count = self.thread_count.min(maximum_worker_count);
        if worker_count <= 1 {
            worker_body(0);
            return;
        }
        let result = crossbeam_utils::thread::scope(|scope| {
            for worker_index in 1..worker_count {
                scope.spawn(move |_| worker_body(worker_index));
            }
            worker_body(0);
        });
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_worker_runs_once() {
        let dispatcher = SimpleThreadDispatcher::new(4);
        let mask = AtomicUsize::new(0);
        dispatcher.dispatch_workers(
            &|worker_index| {
                mask.fetch_or(1 << worker_index, Ordering::Relaxed);
            },
            usize::MAX,
        );
        assert_eq!(mask.load(Ordering::Relaxed), 0b1111);
    }

    #[test]
    fn maximum_worker_count_limits_dispatch() {
        let dispatcher = SimpleThreadDispatcher::new(8);
        let count = AtomicUsize::new(0);
        dispatcher.dispatch_workers(
            &|_| {
                count.fetch_add(1, Ordering::Relaxed);
            },
            3,
        );
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }
}
