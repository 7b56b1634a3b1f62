//! Purpose: Hold top-level CLI command dispatch for `embedboot`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Command behavior, output envelopes, and exit code semantics stay unchanged.
//! Invariants: Helpers in `main.rs` remain the source of command business logic.

use super::*;

pub(super) fn dispatch_command(command: Command, base_dir: PathBuf) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "embedboot", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Branch { version_code } => {
            emit_json(json!({
                "version_code": version_code,
                "branch": branch(version_code),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Guard {
            version_code,
            suffix,
        } => run_guard(version_code, &suffix, &base_dir),
        Command::Boot(args) => {
            if args.mode == BootMode::Race && args.callers == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--callers must be at least 1")
                    .with_hint("Use --callers 2 or more to exercise racing entry points."));
            }
            run_boot(args, &base_dir)
        }
    }
}
