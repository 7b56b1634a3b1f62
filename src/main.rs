//! Purpose: `embedboot` CLI entry point: simulate a host boot and inspect guard decisions.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable JSON on stdout; diagnostics go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All setup goes through `api::Coordinator`; the CLI never mutates state directly.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use embedboot::api::{
    BootConfig, Coordinator, DIRECT_RESOLUTION_THRESHOLD, Error, ErrorKind, IdentityError,
    JsonFileStore, LAST_VERSION_KEY, PackageSpec, REQUIRED_PACKAGE_ID, SequentialNamespace,
    ThreadBootstrapper, VersionRecord, branch, reconcile, to_exit_code,
};
use embedboot::data_paths::{DEFAULT_DATA_SUFFIX, default_base_dir};
use embedboot::notice::{Notice, notice_json};

const DEFAULT_PACKAGE: &str = "org.embedboot.lib";
const DEFAULT_CONTENT_PATH: &str = "/data/app/embedboot.apk";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `embedboot --help`."));
            }
        },
    };

    let base_dir = cli.dir.unwrap_or_else(default_base_dir);
    command_dispatch::dispatch_command(cli.command, base_dir)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or_else(|| arg)
        })
        .collect()
}

#[derive(Parser)]
#[command(
    name = "embedboot",
    version,
    about = "One-time bootstrap coordinator for embedded libraries",
    long_about = None,
    before_help = r#"Simulates a host process bringing an embedded library up exactly once.

Mental model:
  - `boot` runs setup (identity, version guard, load) with racing callers
  - `branch` shows the release branch of a version code
  - `guard` shows what the version guard would do, without changing anything
"#,
    after_help = r#"EXAMPLES
  $ embedboot boot --version-code 150300210 --observed-id 33
  $ embedboot boot --version-code 150300210 --mode race --callers 8 --load-ms 50
  $ embedboot guard 140000000
  $ embedboot branch 150300210

  $ embedboot <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Base directory for private data and the version store (default: ~/.embedboot)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run one-time setup and load the library",
        long_about = r#"Build a simulated identifier table and drive the coordinator.

The library is installed at --observed-id with placeholder packages below it.
Setup reconciles its identifier to --required-id, applies the version guard to
<dir>/app_<suffix>, and loads the library through one or more callers.

NOTES
  - An identifier above --required-id (and below 0x7f) is fatal and exits 8.
  - A failed load exits 9; in race mode the remaining callers still report."#,
        after_help = r#"EXAMPLES
  $ embedboot boot --version-code 150300210
  $ embedboot boot --version-code 150300210 --observed-id 40   # incompatible layout
  $ embedboot boot --version-code 150300210 --mode async --fail-load"#
    )]
    Boot(BootArgs),
    #[command(
        arg_required_else_help = true,
        about = "Print the release branch of a version code",
        after_help = r#"EXAMPLES
  $ embedboot branch 150300210"#
    )]
    Branch {
        #[arg(help = "Version code (BBBBPPPAX)")]
        version_code: u32,
    },
    #[command(
        arg_required_else_help = true,
        about = "Show the version-guard decision for a version code (dry run)",
        long_about = r#"Read the stored version record and report whether running
<version-code> would keep, update, or purge private data. Nothing is written."#,
        after_help = r#"EXAMPLES
  $ embedboot guard 140000000
  $ embedboot --dir /tmp/host guard 150300210 --suffix browser"#
    )]
    Guard {
        #[arg(help = "Version code that would be running")]
        version_code: u32,
        #[arg(long, default_value = DEFAULT_DATA_SUFFIX, help = "Private data directory suffix")]
        suffix: String,
    },
    #[command(about = "Print version info as JSON")]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ embedboot completion bash > ~/.local/share/bash-completion/completions/embedboot
  $ embedboot completion zsh > ~/.zfunc/_embedboot"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Args)]
struct BootArgs {
    #[arg(long, help = "Version code of the running library")]
    version_code: u32,
    #[arg(long, default_value = DEFAULT_PACKAGE, help = "Library package name")]
    package: String,
    #[arg(long, default_value = DEFAULT_CONTENT_PATH, help = "Library content path")]
    content_path: String,
    #[arg(long, default_value_t = REQUIRED_PACKAGE_ID, help = "Identifier the library's resources expect")]
    required_id: u8,
    #[arg(long, help = "Identifier the table assigns at install (default: --required-id)")]
    observed_id: Option<u8>,
    #[arg(long, default_value = DEFAULT_DATA_SUFFIX, help = "Private data directory suffix")]
    suffix: String,
    #[arg(long, value_enum, default_value = "sync", help = "How callers request the library")]
    mode: BootMode,
    #[arg(long, default_value_t = 4, help = "Number of racing callers in race mode")]
    callers: usize,
    #[arg(long, default_value_t = 0, help = "Simulated load time in milliseconds")]
    load_ms: u64,
    #[arg(long, help = "Make every load pass fail")]
    fail_load: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BootMode {
    Sync,
    Async,
    Race,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CallerMode {
    Sync,
    Async,
}

impl CallerMode {
    fn label(self) -> &'static str {
        match self {
            CallerMode::Sync => "sync",
            CallerMode::Async => "async",
        }
    }
}

struct CallerResult {
    caller: usize,
    mode: CallerMode,
    result: Result<(), Error>,
}

fn build_namespace(args: &BootArgs) -> Result<Arc<SequentialNamespace>, Error> {
    let observed = args.observed_id.unwrap_or(args.required_id);
    let table = SequentialNamespace::with_base_os();
    if observed >= DIRECT_RESOLUTION_THRESHOLD {
        table.install_at(&args.package, &args.content_path, observed)?;
        return Ok(Arc::new(table));
    }
    if observed < 2 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--observed-id must be at least 2")
            .with_hint("Identifier 1 is reserved for the base OS package."));
    }
    table.occupy("com.vendor.shared", observed - 2)?;
    table.install(&args.package, &args.content_path)?;
    Ok(Arc::new(table))
}

fn build_bootstrapper(args: &BootArgs) -> Arc<ThreadBootstrapper> {
    let load_time = Duration::from_millis(args.load_ms);
    let fail = args.fail_load;
    Arc::new(ThreadBootstrapper::new(move || {
        if !load_time.is_zero() {
            thread::sleep(load_time);
        }
        if fail {
            return Err(Error::new(ErrorKind::Io).with_message("simulated load failure"));
        }
        Ok(())
    }))
}

fn run_boot(args: BootArgs, base_dir: &Path) -> Result<RunOutcome, Error> {
    let package = PackageSpec::new(&args.package, &args.content_path)
        .with_required_id(args.required_id);
    let config = BootConfig::new(package, args.version_code).with_base_dir(base_dir, &args.suffix)?;
    let namespace = build_namespace(&args)?;
    let bootstrapper = build_bootstrapper(&args);

    let coordinator = Coordinator::builder(config)
        .with_namespace(Arc::clone(&namespace))
        .with_bootstrapper(Arc::clone(&bootstrapper))
        .with_fatal_handler(exit_on_identity_error)
        .build()?;

    let results = match args.mode {
        BootMode::Sync => vec![CallerResult {
            caller: 0,
            mode: CallerMode::Sync,
            result: coordinator.request_sync(),
        }],
        BootMode::Async => vec![request_async_blocking(&coordinator, 0)?],
        BootMode::Race => race_callers(&coordinator, args.callers.max(1))?,
    };

    if let Some(report) = coordinator.report() {
        if !report.version.purge_failures.is_empty() {
            emit_purge_notice(&coordinator.config().data_root, &report.version.purge_failures);
        }
    }

    let callers: Vec<Value> = results.iter().map(caller_json).collect();
    emit_json(json!({
        "report": coordinator.report(),
        "snapshot": coordinator.snapshot(),
        "callers": callers,
        "registrations": namespace.registrations(),
        "load_passes": bootstrapper.passes(),
    }));

    let failure = results.iter().find_map(|caller| caller.result.as_ref().err());
    Ok(match failure {
        Some(err) => RunOutcome::with_code(to_exit_code(err.kind())),
        None => RunOutcome::ok(),
    })
}

fn request_async_blocking(
    coordinator: &Arc<Coordinator>,
    caller: usize,
) -> Result<CallerResult, Error> {
    let (tx, rx) = mpsc::channel();
    coordinator.request_async(move |result| {
        let _ = tx.send(result);
    });
    let result = rx.recv().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("async completion was dropped")
            .with_source(err)
    })?;
    Ok(CallerResult {
        caller,
        mode: CallerMode::Async,
        result,
    })
}

// Even callers block; odd callers register a handler and wait on a channel.
fn race_callers(coordinator: &Arc<Coordinator>, callers: usize) -> Result<Vec<CallerResult>, Error> {
    let barrier = Arc::new(std::sync::Barrier::new(callers));
    let (tx, rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(callers);
    for caller in 0..callers {
        let coordinator = Arc::clone(coordinator);
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        let handle = thread::Builder::new()
            .name(format!("caller-{caller}"))
            .spawn(move || {
                barrier.wait();
                if caller % 2 == 0 {
                    let _ = tx.send(CallerResult {
                        caller,
                        mode: CallerMode::Sync,
                        result: coordinator.request_sync(),
                    });
                } else {
                    coordinator.request_async(move |result| {
                        let _ = tx.send(CallerResult {
                            caller,
                            mode: CallerMode::Async,
                            result,
                        });
                    });
                }
            })
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to spawn caller thread")
                    .with_source(err)
            })?;
        handles.push(handle);
    }
    drop(tx);

    for handle in handles {
        if handle.join().is_err() {
            return Err(Error::new(ErrorKind::Internal).with_message("caller thread panicked"));
        }
    }
    let mut results: Vec<CallerResult> = rx.iter().collect();
    results.sort_by_key(|result| result.caller);
    Ok(results)
}

fn caller_json(caller: &CallerResult) -> Value {
    let mut value = Map::new();
    value.insert("caller".to_string(), json!(caller.caller));
    value.insert("mode".to_string(), json!(caller.mode.label()));
    value.insert("ok".to_string(), json!(caller.result.is_ok()));
    if let Err(err) = &caller.result {
        value.insert("error".to_string(), error_json(err)["error"].clone());
    }
    Value::Object(value)
}

fn run_guard(version_code: u32, suffix: &str, base_dir: &Path) -> Result<RunOutcome, Error> {
    let placeholder = PackageSpec::new(DEFAULT_PACKAGE, DEFAULT_CONTENT_PATH);
    let config = BootConfig::new(placeholder, version_code).with_base_dir(base_dir, suffix)?;
    let store = JsonFileStore::new(&config.prefs_path);
    let record = VersionRecord::load(&store, &config.version_key);
    let action = reconcile(record, config.current_version_code(), &config.data_root);

    emit_json(json!({
        "store": config.prefs_path.display().to_string(),
        "key": LAST_VERSION_KEY,
        "previous": record.last_version_code,
        "previous_branch": branch(record.last_version_code),
        "current": version_code,
        "current_branch": branch(version_code),
        "decision": action,
    }));
    Ok(RunOutcome::ok())
}

/// Fatal path for unreconcilable identity: report and exit without unwinding.
fn exit_on_identity_error(err: &IdentityError) -> ! {
    tracing::error!(error = %err, "resource identity cannot be reconciled");
    let error = Error::new(ErrorKind::Identity)
        .with_message(err.to_string())
        .with_hint("Another shared library occupies the required resource slot; load this library before it or in a separate process.");
    emit_error(&error);
    std::process::exit(to_exit_code(ErrorKind::Identity))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("embedboot {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "embedboot",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_purge_notice(data_dir: &Path, failures: &[String]) {
    let mut details = Map::new();
    details.insert("failures".to_string(), json!(failures));
    let notice = Notice {
        kind: "purge_incomplete".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "boot".to_string(),
        data_dir: data_dir.display().to_string(),
        message: format!("{} entries could not be deleted", failures.len()),
        details,
    };
    emit_notice(&notice);
}

fn emit_notice(notice: &Notice) {
    if io::stderr().is_terminal() {
        eprintln!("notice: {} (data dir: {})", notice.message, notice.data_dir);
        return;
    }
    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Identity => "resource identity mismatch".to_string(),
        ErrorKind::Bootstrap => "library load failed".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint(
            "Permission denied. Check directory permissions or use --dir to a writable location.",
        ),
        ErrorKind::Busy => {
            err.with_hint("Version store is busy (another writer holds the lock). Retry with backoff.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
