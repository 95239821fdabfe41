use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::BatchError;
use crate::settings::BatchSettings;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TaskState {
    complete: bool,
    continuations: Vec<Continuation>,
}

#[derive(Default)]
struct TaskInner {
    state: Mutex<TaskState>,
    done: Condvar,
}

/// Completion signal of one scheduled job.
///
/// Cloning shares the signal. Dependents registered through
/// [`TaskScheduler::schedule_after`] are spawned when the job finishes, so no
/// worker thread ever blocks on another task.
#[derive(Clone, Default)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    fn new() -> Self {
        Self::default()
    }

    /// A handle that is already complete, for jobs with nothing to wait on.
    pub fn completed() -> Self {
        let handle = Self::new();
        handle.complete();
        handle
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    /// Blocks the calling thread until the job has finished. Must not be
    /// called from inside a scheduler worker.
    pub fn wait(&self) {
        let mut state = self.lock();
        while !state.complete {
            state = self
                .inner
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self) {
        let continuations = {
            let mut state = self.lock();
            state.complete = true;
            std::mem::take(&mut state.continuations)
        };
        self.inner.done.notify_all();

        for continuation in continuations {
            continuation();
        }
    }

    fn on_complete(&self, continuation: Continuation) {
        let mut state = self.lock();
        if state.complete {
            drop(state);
            continuation();
        } else {
            state.continuations.push(continuation);
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Background job scheduler backed by a dedicated rayon pool.
pub struct TaskScheduler {
    pool: Arc<rayon::ThreadPool>,
}

impl TaskScheduler {
    pub fn new(settings: &BatchSettings) -> Result<Self, BatchError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("mesh-pass-{}", i));
        if let Some(threads) = settings.worker_threads {
            builder = builder.num_threads(threads);
        }

        let pool = builder.build()?;
        log::info!(
            "Mesh pass scheduler started with {} worker threads",
            pool.current_num_threads()
        );

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) -> TaskHandle {
        let handle = TaskHandle::new();
        let signal = handle.clone();
        self.pool.spawn(move || {
            job();
            signal.complete();
        });
        handle
    }

    /// Schedules `job` to start once `dependency` has completed.
    pub fn schedule_after(
        &self,
        dependency: &TaskHandle,
        job: impl FnOnce() + Send + 'static,
    ) -> TaskHandle {
        let handle = TaskHandle::new();
        let signal = handle.clone();
        let pool = Arc::clone(&self.pool);
        dependency.on_complete(Box::new(move || {
            pool.spawn(move || {
                job();
                signal.complete();
            });
        }));
        handle
    }
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// One wait cycle of one [`TaskRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameId {
    registry: u64,
    generation: u64,
}

/// Proof that every handle registered in one wait cycle of a registry has
/// completed.
///
/// Only [`TaskRegistry::wait_all`] produces one. It vouches for the handles
/// pushed since the registry's previous `wait_all` and for nothing else.
#[derive(Debug)]
#[must_use]
pub struct TasksComplete {
    frame: FrameId,
}

impl TasksComplete {
    /// Whether this token covers handles registered during `frame`.
    pub(crate) fn covers(&self, frame: FrameId) -> bool {
        self.frame == frame
    }
}

/// Outstanding task handles of a frame, owned by the frame orchestrator.
#[derive(Debug)]
pub struct TaskRegistry {
    id: u64,
    generation: u64,
    handles: Vec<TaskHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: TaskHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The wait cycle that handles pushed now belong to.
    pub(crate) fn current_frame(&self) -> FrameId {
        FrameId {
            registry: self.id,
            generation: self.generation,
        }
    }

    /// Waits for every outstanding handle, empties the registry and starts a
    /// new wait cycle.
    pub fn wait_all(&mut self) -> TasksComplete {
        for handle in self.handles.drain(..) {
            handle.wait();
        }
        let frame = self.current_frame();
        self.generation += 1;
        TasksComplete { frame }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> TaskScheduler {
        let settings = BatchSettings {
            worker_threads: Some(2),
            ..BatchSettings::default()
        };
        TaskScheduler::new(&settings).expect("thread pool")
    }

    #[test]
    fn dependent_jobs_run_in_order() {
        let scheduler = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = Arc::clone(&log);
            scheduler.schedule(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                log.lock().unwrap().push("filter");
            })
        };
        let second = {
            let log = Arc::clone(&log);
            scheduler.schedule_after(&first, move || log.lock().unwrap().push("sort"))
        };
        let third = {
            let log = Arc::clone(&log);
            scheduler.schedule_after(&second, move || log.lock().unwrap().push("build"))
        };

        third.wait();
        assert!(first.is_complete() && second.is_complete());
        assert_eq!(*log.lock().unwrap(), vec!["filter", "sort", "build"]);
    }

    #[test]
    fn scheduling_after_a_completed_handle_still_runs() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let handle = scheduler.schedule_after(&TaskHandle::completed(), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        handle.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_all_drains_the_registry() {
        let scheduler = scheduler();
        let mut registry = TaskRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let c = Arc::clone(&counter);
            registry.push(scheduler.schedule(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let _ready = registry.wait_all();
        assert!(registry.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn tokens_cover_only_their_own_wait_cycle() {
        let mut registry = TaskRegistry::new();
        let mut other = TaskRegistry::new();

        let frame = registry.current_frame();
        let ready = registry.wait_all();
        assert!(ready.covers(frame));
        assert!(!other.wait_all().covers(frame));

        let next = registry.current_frame();
        assert_ne!(frame, next);
        assert!(!ready.covers(next));
        assert!(registry.wait_all().covers(next));
    }
}
