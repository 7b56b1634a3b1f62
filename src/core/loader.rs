//! Purpose: Drive the heavy one-time library load off the calling thread.
//! Exports: `Bootstrapper`, `CompletionHandler`, `ThreadBootstrapper`.
//! Role: Process-bootstrap collaborator consumed by the coordinator; swappable in tests.
//! Invariants: Concurrent requests share one in-flight pass; a successful pass never repeats.
//! Invariants: A failed pass may be retried by a later request.
//! Invariants: Every registered completion handler fires exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::core::error::{Error, ErrorKind};

pub type CompletionHandler = Box<dyn FnOnce(Result<(), Error>) + Send + 'static>;

pub trait Bootstrapper: Send + Sync {
    /// Starts loading in the background if nothing is in flight or loaded.
    fn prefetch(&self);
    /// Never blocks; `on_done` runs once the load settles, possibly inline.
    fn start_async(&self, on_done: CompletionHandler);
    /// Blocks until the load settles.
    fn start_sync(&self) -> Result<(), Error>;
}

type LoadFn = dyn Fn() -> Result<(), Error> + Send + Sync;

#[derive(Clone, Debug, Eq, PartialEq)]
enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

struct LoaderState {
    phase: LoadPhase,
    waiters: Vec<CompletionHandler>,
}

struct LoaderInner {
    load: Box<LoadFn>,
    state: Mutex<LoaderState>,
    settled: Condvar,
    passes: AtomicUsize,
}

#[derive(Clone)]
pub struct ThreadBootstrapper {
    inner: Arc<LoaderInner>,
}

impl ThreadBootstrapper {
    pub fn new(load: impl Fn() -> Result<(), Error> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                load: Box::new(load),
                state: Mutex::new(LoaderState {
                    phase: LoadPhase::Idle,
                    waiters: Vec::new(),
                }),
                settled: Condvar::new(),
                passes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of load passes started so far, successful or not.
    pub fn passes(&self) -> usize {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().phase == LoadPhase::Loaded
    }

    fn kick(&self, waiter: Option<CompletionHandler>) {
        let mut state = self.inner.lock();
        if state.phase == LoadPhase::Loaded {
            drop(state);
            if let Some(waiter) = waiter {
                waiter(Ok(()));
            }
            return;
        }
        state.waiters.extend(waiter);
        if state.phase == LoadPhase::Loading {
            return;
        }
        state.phase = LoadPhase::Loading;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("embedboot-loader".to_string())
            .spawn(move || inner.run_pass());
        if let Err(err) = spawned {
            self.inner.settle(Err(Error::new(ErrorKind::Internal)
                .with_message("failed to spawn loader thread")
                .with_source(err)));
        }
    }
}

impl Bootstrapper for ThreadBootstrapper {
    fn prefetch(&self) {
        self.kick(None);
    }

    fn start_async(&self, on_done: CompletionHandler) {
        self.kick(Some(on_done));
    }

    fn start_sync(&self) -> Result<(), Error> {
        self.kick(None);
        let mut state = self.inner.lock();
        loop {
            match &state.phase {
                LoadPhase::Loaded => return Ok(()),
                LoadPhase::Failed(message) => return Err(load_failure(message)),
                LoadPhase::Idle | LoadPhase::Loading => {}
            }
            state = self
                .inner
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl LoaderInner {
    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_pass(&self) {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(pass, "library load started");
        let result = (self.load)();
        self.settle(result);
    }

    fn settle(&self, result: Result<(), Error>) {
        let mut state = self.lock();
        state.phase = match &result {
            Ok(()) => LoadPhase::Loaded,
            Err(err) => {
                tracing::warn!(error = %err, "library load failed");
                LoadPhase::Failed(err.to_string())
            }
        };
        let waiters = std::mem::take(&mut state.waiters);
        let phase = state.phase.clone();
        self.settled.notify_all();
        drop(state);

        for waiter in waiters {
            match &phase {
                LoadPhase::Failed(message) => waiter(Err(load_failure(message))),
                _ => waiter(Ok(())),
            }
        }
    }
}

fn load_failure(message: &str) -> Error {
    Error::new(ErrorKind::Bootstrap)
        .with_message(format!("library load failed: {message}"))
        .with_hint("The load may be retried by requesting it again.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn sync_loads_once() {
        let loader = ThreadBootstrapper::new(|| Ok(()));
        loader.start_sync().expect("load");
        loader.start_sync().expect("load again");
        assert_eq!(loader.passes(), 1);
        assert!(loader.is_loaded());
    }

    #[test]
    fn async_waiters_share_one_pass() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let loader = ThreadBootstrapper::new(move || {
            let _ = release_rx
                .lock()
                .expect("lock")
                .recv_timeout(Duration::from_secs(5));
            Ok(())
        });

        let (done_tx, done_rx) = mpsc::channel();
        for i in 0..4 {
            let done_tx = done_tx.clone();
            loader.start_async(Box::new(move |result| {
                done_tx.send((i, result.is_ok())).expect("send");
            }));
        }
        release_tx.send(()).expect("release");

        let mut seen: Vec<_> = (0..4)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).expect("done"))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![(0, true), (1, true), (2, true), (3, true)]);
        assert_eq!(loader.passes(), 1);
    }

    #[test]
    fn already_loaded_completes_inline() {
        let loader = ThreadBootstrapper::new(|| Ok(()));
        loader.start_sync().expect("load");

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        loader.start_async(Box::new(move |result| {
            assert!(result.is_ok());
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_pass_can_be_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let loader = ThreadBootstrapper::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::new(ErrorKind::Io).with_message("missing .so"));
            }
            Ok(())
        });

        let err = loader.start_sync().expect_err("first pass fails");
        assert_eq!(err.kind(), ErrorKind::Bootstrap);
        assert!(err.message().unwrap_or_default().contains("missing .so"));
        assert!(!loader.is_loaded());

        loader.start_sync().expect("retry");
        assert_eq!(loader.passes(), 2);
    }

    #[test]
    fn prefetch_then_sync_reuses_pass() {
        let loader = ThreadBootstrapper::new(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(())
        });
        loader.prefetch();
        loader.start_sync().expect("load");
        assert_eq!(loader.passes(), 1);
    }
}
