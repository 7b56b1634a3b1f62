//! Purpose: Bring the embedded library to a usable state exactly once per process.
//! Exports: `Coordinator`, `CoordinatorBuilder`, `HostEnvironment`, `NoopHost`, `SetupReport`,
//! `BootstrapSnapshot`, `FatalHandler`, `abort_on_identity_error`, `panic_on_identity_error`.
//! Role: Single funnel for the racing sync and async entry points; owns all once-guards.
//! Invariants: One-time setup runs exactly once; the native-loaded hook runs exactly once.
//! Invariants: Native-loaded implies setup started; neither flag ever resets.
//! Invariants: Every async handler is completed exactly once, even if deferred behind setup.
//! Invariants: Identity failures never return to callers; they go to the fatal handler.
//! Invariants: If setup unwinds, the phase becomes `Failed` and every waiter gets an error.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, Once, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use serde::Serialize;

use crate::core::config::BootConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::identity::{self, IdentityError, NamespaceTable, PackageIdentity};
use crate::core::loader::{Bootstrapper, CompletionHandler};
use crate::core::purge::{FileSystem, StdFileSystem};
use crate::core::store::{JsonFileStore, VersionStore};
use crate::core::version_guard::{self, VersionOutcome, VersionRecord};

/// Host-side hooks invoked during setup. Every method defaults to a no-op so
/// embedders only implement the stages they participate in.
pub trait HostEnvironment: Send + Sync {
    fn establish_context(&self) {}

    /// Whether the caller's code-loading context differs from the library's.
    fn loader_contexts_differ(&self) -> bool {
        false
    }

    /// Tells a co-resident sibling runtime it shares the process (compat mode only).
    fn notify_sibling_runtime(&self) -> Result<(), Error> {
        Ok(())
    }

    fn on_resources_loaded(&self, _assigned_id: u8) {}

    fn command_line_ready(&self) -> bool {
        false
    }

    fn init_command_line(&self) {}

    fn register_feature_hooks(&self, _compat_mode: bool) {}

    fn on_native_loaded(&self, _compat_mode: bool) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHost;

impl HostEnvironment for NoopHost {}

pub type FatalHandler = fn(&IdentityError) -> !;

pub fn abort_on_identity_error(err: &IdentityError) -> ! {
    tracing::error!(error = %err, "resource identity cannot be reconciled");
    eprintln!("embedboot: fatal: {err}");
    std::process::abort()
}

pub fn panic_on_identity_error(err: &IdentityError) -> ! {
    panic!("resource identity cannot be reconciled: {err}")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SetupPhase {
    Unstarted,
    SettingUp { owner: ThreadId },
    Ready,
    Failed,
}

struct SetupSlot {
    phase: SetupPhase,
    deferred: Vec<CompletionHandler>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SetupReport {
    pub compat_mode: bool,
    pub identity: PackageIdentity,
    pub version: VersionOutcome,
    pub command_line_initialized: bool,
    /// Time from coordinator construction to the first entry into setup.
    pub entry_offset_ms: u64,
    pub setup_ms: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct BootstrapSnapshot {
    pub setup_started: bool,
    pub setup_complete: bool,
    pub native_loaded: bool,
    pub compat_mode: Option<bool>,
    pub assigned_id: Option<u8>,
}

pub struct Coordinator {
    config: BootConfig,
    namespace: Arc<dyn NamespaceTable>,
    bootstrapper: Arc<dyn Bootstrapper>,
    store: Arc<dyn VersionStore>,
    fs: Arc<dyn FileSystem>,
    host: Arc<dyn HostEnvironment>,
    on_fatal: FatalHandler,
    created_at: Instant,
    setup: Mutex<SetupSlot>,
    setup_done: Condvar,
    context: Once,
    identity: OnceLock<PackageIdentity>,
    compat_mode: OnceLock<bool>,
    report: OnceLock<SetupReport>,
    native_loaded: Once,
}

impl Coordinator {
    pub fn builder(config: BootConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Runs setup if needed, blocks until the library is loaded, then runs
    /// the native-loaded hook if nobody has yet.
    pub fn request_sync(self: &Arc<Self>) -> Result<(), Error> {
        self.ensure_setup()?;
        self.bootstrapper.start_sync()?;
        self.mark_native_loaded();
        Ok(())
    }

    /// Runs setup if nobody has started it, then completes `handler` once the
    /// load settles. If another thread is mid-setup the handler is queued and
    /// this call returns immediately.
    pub fn request_async<F>(self: &Arc<Self>, handler: F)
    where
        F: FnOnce(Result<(), Error>) + Send + 'static,
    {
        let handler: CompletionHandler = Box::new(handler);
        let mut slot = self.lock_setup();
        let phase = slot.phase;
        match phase {
            SetupPhase::Ready => {
                drop(slot);
                self.dispatch_async(handler);
            }
            SetupPhase::SettingUp { .. } => slot.deferred.push(handler),
            SetupPhase::Failed => {
                drop(slot);
                handler(Err(setup_unwound()));
            }
            SetupPhase::Unstarted => {
                slot.phase = SetupPhase::SettingUp {
                    owner: thread::current().id(),
                };
                slot.deferred.push(handler);
                drop(slot);
                self.run_setup();
            }
        }
    }

    /// The "minimally initialized" stage alone: embedding context plus
    /// resource identity. Safe to call before, during, or after full setup.
    pub fn minimal_init(&self) -> PackageIdentity {
        self.establish_context();
        self.ensure_identity()
    }

    pub fn snapshot(&self) -> BootstrapSnapshot {
        let phase = self.lock_setup().phase;
        BootstrapSnapshot {
            setup_started: phase != SetupPhase::Unstarted,
            setup_complete: phase == SetupPhase::Ready,
            native_loaded: self.native_loaded.is_completed(),
            compat_mode: self.compat_mode.get().copied(),
            assigned_id: self.identity.get().map(|identity| identity.assigned_id),
        }
    }

    pub fn report(&self) -> Option<&SetupReport> {
        self.report.get()
    }

    pub fn compat_mode(&self) -> Option<bool> {
        self.compat_mode.get().copied()
    }

    pub fn is_native_loaded(&self) -> bool {
        self.native_loaded.is_completed()
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    fn lock_setup(&self) -> MutexGuard<'_, SetupSlot> {
        self.setup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_setup(self: &Arc<Self>) -> Result<(), Error> {
        let current = thread::current().id();
        let mut slot = self.lock_setup();
        loop {
            let phase = slot.phase;
            match phase {
                SetupPhase::Ready => return Ok(()),
                SetupPhase::Failed => return Err(setup_unwound()),
                SetupPhase::Unstarted => {
                    slot.phase = SetupPhase::SettingUp { owner: current };
                    drop(slot);
                    self.run_setup();
                    return Ok(());
                }
                SetupPhase::SettingUp { owner } if owner == current => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("synchronous load requested from inside one-time setup")
                        .with_hint("Use request_async from setup hooks; it completes after setup."));
                }
                SetupPhase::SettingUp { .. } => {
                    slot = self
                        .setup_done
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    // Caller must have moved the phase to `SettingUp`.
    fn run_setup(self: &Arc<Self>) {
        let mut unwind = UnwindGuard {
            coordinator: self,
            armed: true,
        };
        let report = self.perform_setup();
        unwind.armed = false;
        let _ = self.report.set(report);

        let deferred = {
            let mut slot = self.lock_setup();
            slot.phase = SetupPhase::Ready;
            self.setup_done.notify_all();
            std::mem::take(&mut slot.deferred)
        };
        for handler in deferred {
            self.dispatch_async(handler);
        }
    }

    fn perform_setup(&self) -> SetupReport {
        let started = Instant::now();
        let span = tracing::info_span!(
            "setup",
            package = %self.config.package.name,
            version_code = self.config.version_code
        );
        let _entered = span.enter();

        self.establish_context();
        let compat_mode = self.resolve_compat_mode();
        let identity = self.ensure_identity();
        let version = self.reconcile_version();
        self.bootstrapper.prefetch();

        let command_line_initialized = !self.host.command_line_ready();
        if command_line_initialized {
            self.host.init_command_line();
        }
        self.host.register_feature_hooks(compat_mode);

        let setup_ms = elapsed_ms(started);
        tracing::info!(setup_ms, compat_mode, "one-time setup complete");
        SetupReport {
            compat_mode,
            identity,
            version,
            command_line_initialized,
            entry_offset_ms: started
                .saturating_duration_since(self.created_at)
                .as_millis()
                .try_into()
                .unwrap_or(u64::MAX),
            setup_ms,
        }
    }

    fn establish_context(&self) {
        self.context.call_once(|| {
            self.host.establish_context();
            tracing::debug!("embedding context established");
        });
    }

    fn resolve_compat_mode(&self) -> bool {
        *self.compat_mode.get_or_init(|| {
            let compat_mode = self.host.loader_contexts_differ();
            if compat_mode {
                if let Err(err) = self.host.notify_sibling_runtime() {
                    tracing::warn!(error = %err, "unable to notify sibling runtime in process");
                }
            }
            compat_mode
        })
    }

    fn ensure_identity(&self) -> PackageIdentity {
        *self.identity.get_or_init(|| {
            match identity::resolve(self.namespace.as_ref(), &self.config.package) {
                Ok(identity) => {
                    self.host.on_resources_loaded(identity.assigned_id);
                    identity
                }
                Err(err) => (self.on_fatal)(&err),
            }
        })
    }

    fn reconcile_version(&self) -> VersionOutcome {
        let key = self.config.version_key.as_str();
        let record = VersionRecord::load(self.store.as_ref(), key);
        let action = version_guard::reconcile(
            record,
            self.config.current_version_code(),
            &self.config.data_root,
        );
        version_guard::apply(record, action, self.store.as_ref(), self.fs.as_ref(), key)
    }

    fn dispatch_async(self: &Arc<Self>, handler: CompletionHandler) {
        let coordinator = Arc::clone(self);
        self.bootstrapper.start_async(Box::new(move |result| {
            if result.is_ok() {
                coordinator.mark_native_loaded();
            }
            handler(result);
        }));
    }

    fn mark_native_loaded(&self) {
        self.native_loaded.call_once(|| {
            let compat_mode = self.compat_mode.get().copied().unwrap_or(false);
            self.host.on_native_loaded(compat_mode);
            tracing::info!(compat_mode, "native library loaded");
        });
    }
}

// Publishes `Failed` when setup unwinds so waiters and queued handlers are released.
struct UnwindGuard<'a> {
    coordinator: &'a Coordinator,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let deferred = {
            let mut slot = self.coordinator.lock_setup();
            slot.phase = SetupPhase::Failed;
            self.coordinator.setup_done.notify_all();
            std::mem::take(&mut slot.deferred)
        };
        tracing::error!(queued = deferred.len(), "one-time setup unwound");
        for handler in deferred {
            handler(Err(setup_unwound()));
        }
    }
}

fn setup_unwound() -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("one-time setup did not complete")
        .with_hint("Setup unwound on another thread; the library cannot be loaded in this process.")
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

pub struct CoordinatorBuilder {
    config: BootConfig,
    namespace: Option<Arc<dyn NamespaceTable>>,
    bootstrapper: Option<Arc<dyn Bootstrapper>>,
    store: Option<Arc<dyn VersionStore>>,
    fs: Arc<dyn FileSystem>,
    host: Arc<dyn HostEnvironment>,
    on_fatal: FatalHandler,
}

impl CoordinatorBuilder {
    fn new(config: BootConfig) -> Self {
        Self {
            config,
            namespace: None,
            bootstrapper: None,
            store: None,
            fs: Arc::new(StdFileSystem),
            host: Arc::new(NoopHost),
            on_fatal: abort_on_identity_error,
        }
    }

    pub fn with_namespace<T: NamespaceTable + 'static>(mut self, namespace: Arc<T>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_bootstrapper<T: Bootstrapper + 'static>(mut self, bootstrapper: Arc<T>) -> Self {
        self.bootstrapper = Some(bootstrapper);
        self
    }

    /// Defaults to a `JsonFileStore` at the configured prefs path.
    pub fn with_store<T: VersionStore + 'static>(mut self, store: Arc<T>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_file_system<T: FileSystem + 'static>(mut self, fs: Arc<T>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_host<T: HostEnvironment + 'static>(mut self, host: Arc<T>) -> Self {
        self.host = host;
        self
    }

    pub fn with_fatal_handler(mut self, on_fatal: FatalHandler) -> Self {
        self.on_fatal = on_fatal;
        self
    }

    pub fn build(self) -> Result<Arc<Coordinator>, Error> {
        let namespace = self.namespace.ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("coordinator requires a namespace table")
        })?;
        let bootstrapper = self.bootstrapper.ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("coordinator requires a bootstrapper")
        })?;
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(self.config.prefs_path.clone())),
        };

        Ok(Arc::new(Coordinator {
            config: self.config,
            namespace,
            bootstrapper,
            store,
            fs: self.fs,
            host: self.host,
            on_fatal: self.on_fatal,
            created_at: Instant::now(),
            setup: Mutex::new(SetupSlot {
                phase: SetupPhase::Unstarted,
                deferred: Vec::new(),
            }),
            setup_done: Condvar::new(),
            context: Once::new(),
            identity: OnceLock::new(),
            compat_mode: OnceLock::new(),
            report: OnceLock::new(),
            native_loaded: Once::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SequentialNamespace;
    use crate::core::identity::{PackageSpec, REQUIRED_PACKAGE_ID, ResolutionMode};
    use crate::core::loader::ThreadBootstrapper;
    use crate::core::store::MemoryStore;
    use crate::core::version_guard::{LAST_VERSION_KEY, VersionAction};
    use std::sync::Weak;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const LIB: &str = "org.example.lib";
    const APK: &str = "/data/app/lib.apk";

    #[derive(Default)]
    struct RecordingHost {
        events: Mutex<Vec<String>>,
        compat: bool,
        coordinator: OnceLock<Weak<Coordinator>>,
        reentrant_sync: Mutex<Option<ErrorKind>>,
        reentrant_async: Mutex<Option<mpsc::Sender<bool>>>,
    }

    impl RecordingHost {
        fn record(&self, event: impl Into<String>) {
            self.events.lock().expect("lock").push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("lock").clone()
        }
    }

    impl HostEnvironment for RecordingHost {
        fn establish_context(&self) {
            self.record("context");
        }

        fn loader_contexts_differ(&self) -> bool {
            self.record("compat");
            self.compat
        }

        fn notify_sibling_runtime(&self) -> Result<(), Error> {
            self.record("sibling");
            Err(Error::new(ErrorKind::NotFound).with_message("no sibling"))
        }

        fn on_resources_loaded(&self, assigned_id: u8) {
            self.record(format!("resources:{assigned_id}"));
        }

        fn init_command_line(&self) {
            self.record("command_line");
        }

        fn register_feature_hooks(&self, _compat_mode: bool) {
            self.record("features");
            let Some(coordinator) = self.coordinator.get().and_then(Weak::upgrade) else {
                return;
            };
            if let Err(err) = coordinator.request_sync() {
                *self.reentrant_sync.lock().expect("lock") = Some(err.kind());
            }
            if let Some(tx) = self.reentrant_async.lock().expect("lock").take() {
                coordinator.request_async(move |result| {
                    let _ = tx.send(result.is_ok());
                });
            }
        }

        fn on_native_loaded(&self, compat_mode: bool) {
            self.record(format!("native:{compat_mode}"));
        }
    }

    fn namespace_with_library_at(observed: u8) -> Arc<SequentialNamespace> {
        let namespace = SequentialNamespace::with_base_os();
        namespace.install_at(LIB, APK, observed).expect("install");
        Arc::new(namespace)
    }

    fn build(
        namespace: Arc<SequentialNamespace>,
        host: Arc<RecordingHost>,
        store: Arc<MemoryStore>,
        dir: &tempfile::TempDir,
    ) -> Arc<Coordinator> {
        let config = BootConfig::new(PackageSpec::new(LIB, APK), 150300210)
            .with_base_dir(dir.path(), "lib")
            .expect("config");
        Coordinator::builder(config)
            .with_namespace(namespace)
            .with_bootstrapper(Arc::new(ThreadBootstrapper::new(|| Ok(()))))
            .with_store(store)
            .with_host(host)
            .with_fatal_handler(panic_on_identity_error)
            .build()
            .expect("build")
    }

    #[test]
    fn setup_runs_steps_in_order_then_native_hook() {
        let host = Arc::new(RecordingHost::default());
        let store = Arc::new(MemoryStore::new().with_value(LAST_VERSION_KEY, 150300210));
        let dir = tempfile::tempdir().expect("tempdir");
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            namespace_with_library_at(REQUIRED_PACKAGE_ID - 2),
            Arc::clone(&host),
            Arc::clone(&store),
            &dir,
        );

        coordinator.request_sync().expect("sync");
        coordinator.request_sync().expect("sync again");

        assert_eq!(
            host.events(),
            vec![
                "context".to_string(),
                "compat".to_string(),
                format!("resources:{REQUIRED_PACKAGE_ID}"),
                "command_line".to_string(),
                "features".to_string(),
                "native:false".to_string(),
            ]
        );
        let report = coordinator.report().expect("report");
        assert_eq!(
            report.identity.resolution,
            ResolutionMode::Forced { registrations: 2 }
        );
        assert_eq!(report.version.action, VersionAction::Keep);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn compat_mode_notifies_sibling_and_survives_failure() {
        let host = Arc::new(RecordingHost {
            compat: true,
            ..RecordingHost::default()
        });
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            namespace_with_library_at(REQUIRED_PACKAGE_ID),
            Arc::clone(&host),
            Arc::new(MemoryStore::new()),
            &dir,
        );
        coordinator.request_sync().expect("sync");

        let events = host.events();
        assert_eq!(&events[..3], ["context", "compat", "sibling"]);
        assert_eq!(events.last().map(String::as_str), Some("native:true"));
        assert_eq!(coordinator.compat_mode(), Some(true));
    }

    #[test]
    #[should_panic(expected = "incompatible layout")]
    fn collision_goes_to_fatal_handler() {
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            namespace_with_library_at(REQUIRED_PACKAGE_ID + 1),
            Arc::new(RecordingHost::default()),
            Arc::new(MemoryStore::new()),
            &dir,
        );
        let _ = coordinator.request_sync();
    }

    #[test]
    fn snapshot_tracks_both_axes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            namespace_with_library_at(REQUIRED_PACKAGE_ID),
            Arc::new(RecordingHost::default()),
            Arc::new(MemoryStore::new()),
            &dir,
        );
        let before = coordinator.snapshot();
        assert!(!before.setup_started);
        assert!(!before.native_loaded);
        assert_eq!(before.assigned_id, None);

        coordinator.request_sync().expect("sync");
        let after = coordinator.snapshot();
        assert!(after.setup_started && after.setup_complete && after.native_loaded);
        assert_eq!(after.assigned_id, Some(REQUIRED_PACKAGE_ID));
        assert_eq!(after.compat_mode, Some(false));
    }

    #[test]
    fn minimal_init_is_shared_with_setup() {
        let namespace = namespace_with_library_at(REQUIRED_PACKAGE_ID - 1);
        let host = Arc::new(RecordingHost::default());
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            Arc::clone(&namespace),
            Arc::clone(&host),
            Arc::new(MemoryStore::new()),
            &dir,
        );

        let identity = coordinator.minimal_init();
        assert_eq!(identity.assigned_id, REQUIRED_PACKAGE_ID);
        assert!(!coordinator.snapshot().setup_started);

        coordinator.request_sync().expect("sync");
        assert_eq!(namespace.registrations(), 1);
        let contexts = host.events().iter().filter(|e| *e == "context").count();
        assert_eq!(contexts, 1);
    }

    #[test]
    fn reentrant_requests_from_setup_do_not_deadlock() {
        let host = Arc::new(RecordingHost::default());
        let (tx, rx) = mpsc::channel();
        *host.reentrant_async.lock().expect("lock") = Some(tx);
        let dir = tempfile::tempdir().expect("tempdir");
        let coordinator = build(
            namespace_with_library_at(REQUIRED_PACKAGE_ID),
            Arc::clone(&host),
            Arc::new(MemoryStore::new()),
            &dir,
        );
        host.coordinator
            .set(Arc::downgrade(&coordinator))
            .expect("set once");

        coordinator.request_sync().expect("sync");
        assert_eq!(
            *host.reentrant_sync.lock().expect("lock"),
            Some(ErrorKind::Usage)
        );
        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("deferred"));
    }

    #[test]
    fn async_failure_skips_hook_and_allows_retry() {
        let healthy = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&healthy);
        let loader = Arc::new(ThreadBootstrapper::new(move || {
            if !flag.load(Ordering::SeqCst) {
                return Err(Error::new(ErrorKind::Io).with_message("relro mapping failed"));
            }
            Ok(())
        }));
        let host = Arc::new(RecordingHost::default());
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BootConfig::new(PackageSpec::new(LIB, APK), 1)
            .with_base_dir(dir.path(), "lib")
            .expect("config");
        let coordinator = Coordinator::builder(config)
            .with_namespace(namespace_with_library_at(REQUIRED_PACKAGE_ID))
            .with_bootstrapper(Arc::clone(&loader))
            .with_store(Arc::new(MemoryStore::new()))
            .with_host(Arc::clone(&host))
            .with_fatal_handler(panic_on_identity_error)
            .build()
            .expect("build");

        let (tx, rx) = mpsc::channel();
        coordinator.request_async(move |result| {
            let _ = tx.send(result.map_err(|err| err.kind()));
        });
        let first = rx.recv_timeout(Duration::from_secs(5)).expect("first");
        assert_eq!(first, Err(ErrorKind::Bootstrap));
        assert!(!coordinator.is_native_loaded());
        assert!(coordinator.snapshot().setup_complete);

        healthy.store(true, Ordering::SeqCst);
        coordinator.request_sync().expect("retry");
        assert!(coordinator.is_native_loaded());
        assert!(loader.is_loaded());
        let natives = host
            .events()
            .iter()
            .filter(|e| e.starts_with("native:"))
            .count();
        assert_eq!(natives, 1);
    }

    #[test]
    fn builder_requires_collaborators() {
        let config = BootConfig::new(PackageSpec::new(LIB, APK), 1);
        let err = Coordinator::builder(config).build().err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
