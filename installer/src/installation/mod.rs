// Host-side installation primitives
//
// This module contains the shared command runner every driver and lifecycle step goes through,
// plus the Linux helpers (service control, file placement, host parsing).
//
// External commands are injected as a `CommandRunner` so the best-effort policy is testable:
// a non-zero exit is a structured outcome, not a swallowed exit code.

pub mod files;
pub mod linux;
pub mod linux_parsers;
pub mod service;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::error::InstallerError;
use crate::utils::logging::output_tail;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Short label used in logs (`apt_install`, `systemctl_start`, ...).
    pub operation: String,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I, timeout: Duration, operation: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
            operation: operation.to_string(),
        }
    }

    /// `su - <user> -c "<command>"`
    pub fn as_user(user: &str, command: &str, timeout: Duration, operation: &str) -> Self {
        Self::new(
            "su",
            ["-".to_string(), user.to_string(), "-c".to_string(), command.to_string()],
            timeout,
            operation,
        )
    }

    /// Command line as a single string, for logs and test assertions.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// Runs external commands.
///
/// `Err` means the command could not be run at all (spawn failure, timeout); a command that ran
/// and exited non-zero is `Ok` with `exit_code` set (caller decides success).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Production runner: spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        run_cmd_with_timeout(&spec.program, &spec.args, spec.timeout, &spec.operation).await
    }
}

/// What to do when an external command in a best-effort step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and keep going.
    BestEffort,
    /// Turn the failure into a fatal error.
    FailFast,
}

/// Timeout + failure policy shared by every step of a run.
#[derive(Debug, Clone, Copy)]
pub struct ExecPolicy {
    pub failure: FailurePolicy,
    pub timeout: Duration,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self {
            failure: FailurePolicy::BestEffort,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Structured result of a best-effort command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    /// Ran but exited non-zero (or was killed by a signal).
    Failed { exit_code: Option<i32>, stderr_tail: String },
    /// Could not be started or timed out.
    NotRun { reason: String },
    /// Nothing to do (e.g. empty package set).
    Skipped,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Succeeded | CommandOutcome::Skipped)
    }
}

/// Run a command under the best-effort policy.
///
/// Failures are logged at warn and returned as an outcome; with `FailurePolicy::FailFast` they
/// become an `InstallerError::CommandFailed`.
pub async fn run_best_effort(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    policy: FailurePolicy,
) -> Result<CommandOutcome> {
    let outcome = match runner.run(spec).await {
        Ok(out) if out.success() => CommandOutcome::Succeeded,
        Ok(out) => {
            let mut tail = output_tail(&out.stderr, 5);
            if tail.is_empty() {
                tail = output_tail(&out.stdout, 5);
            }
            CommandOutcome::Failed {
                exit_code: out.exit_code,
                stderr_tail: tail,
            }
        }
        Err(e) => CommandOutcome::NotRun {
            reason: format!("{:#}", e),
        },
    };

    match &outcome {
        CommandOutcome::Succeeded | CommandOutcome::Skipped => {}
        CommandOutcome::Failed {
            exit_code,
            stderr_tail,
        } => {
            warn!(
                "[PHASE: installation] [STEP: cmd] Command failed, continuing (operation={}, command={}, exit_code={:?}, stderr={})",
                spec.operation,
                spec.display(),
                exit_code,
                stderr_tail
            );
        }
        CommandOutcome::NotRun { reason } => {
            warn!(
                "[PHASE: installation] [STEP: cmd] Command could not be run, continuing (operation={}, command={}, reason={})",
                spec.operation,
                spec.display(),
                reason
            );
        }
    }

    if policy == FailurePolicy::FailFast && !outcome.is_success() {
        let exit_code = match &outcome {
            CommandOutcome::Failed { exit_code, .. } => *exit_code,
            _ => None,
        };
        return Err(InstallerError::CommandFailed {
            program: spec.program.clone(),
            operation: spec.operation.clone(),
            exit_code,
        }
        .into());
    }

    Ok(outcome)
}

/// Only spawn-level hiccups are retried. A command that timed out is never re-run: the timeouts
/// here are long (package managers) and a second attempt would double the wait.
fn is_transient_exec_error(e: &anyhow::Error) -> bool {
    let msg = format!("{:#}", e).to_ascii_lowercase();
    if msg.contains("timed out") {
        return false;
    }
    msg.contains("temporarily unavailable")
        || msg.contains("resource busy")
        || msg.contains("text file busy")
        || msg.contains("interrupted")
}

async fn run_cmd_with_timeout_once(
    program: &str,
    args: &[String],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();

    debug!(
        "[PHASE: installation] [STEP: cmd] run_cmd_with_timeout_once entered (operation={}, program={}, args=[{}], timeout_ms={})",
        operation,
        program,
        args.join(", "),
        timeout_dur.as_millis()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn command '{}' (operation={})",
            program, operation
        )
    })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout (operation={})", operation))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr (operation={})", operation))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });

    let status = match timeout(timeout_dur, child.wait()).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            return Err(anyhow::Error::new(e)).with_context(|| {
                format!(
                    "Command wait failed (operation={}, program={})",
                    operation, program
                )
            });
        }
        Err(_) => {
            warn!(
                "[PHASE: installation] [STEP: cmd] Timeout reached (operation={}, program={}, timeout_ms={}); attempting to kill process",
                operation,
                program,
                timeout_dur.as_millis()
            );

            if let Err(e) = child.kill().await {
                warn!(
                    "[PHASE: installation] [STEP: cmd] Failed to kill timed-out process (operation={}, program={}): {}",
                    operation, program, e
                );
            }

            return Err(anyhow::anyhow!(
                "Command timed out after {}ms (operation={}, program={})",
                timeout_dur.as_millis(),
                operation,
                program
            ));
        }
    };

    let stdout_str = stdout_task
        .await
        .context("stdout join failed")?
        .context("stdout read failed")?;
    let stderr_str = stderr_task
        .await
        .context("stderr join failed")?
        .context("stderr read failed")?;

    let out = CommandOutput {
        exit_code: status.code(),
        stdout: stdout_str,
        stderr: stderr_str,
        duration_ms: started.elapsed().as_millis(),
    };

    debug!(
        "[PHASE: installation] [STEP: cmd] run_cmd_with_timeout_once exit (operation={}, program={}, exit_code={:?}, duration_ms={}, stdout_len={}, stderr_len={})",
        operation,
        program,
        out.exit_code,
        out.duration_ms,
        out.stdout.len(),
        out.stderr.len()
    );

    Ok(out)
}

/// Run an external command with a timeout and up to 3 retries for transient spawn failures.
///
/// Returns captured stdout/stderr even when exit code is non-zero (caller decides success).
pub async fn run_cmd_with_timeout(
    program: &str,
    args: &[String],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();
    info!(
        "[PHASE: installation] [STEP: cmd] Running {} (operation={}, args_count={})",
        program,
        operation,
        args.len()
    );

    let program_owned = program.to_string();
    let args_owned = args.to_vec();
    let operation_owned = operation.to_string();

    let attempt = move || {
        let program = program_owned.clone();
        let args = args_owned.clone();
        let op = operation_owned.clone();
        async move { run_cmd_with_timeout_once(&program, &args, timeout_dur, &op).await }
    };

    let retry_strategy = ExponentialBackoff::from_millis(200)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter);

    let result = RetryIf::spawn(retry_strategy, attempt, |e: &anyhow::Error| {
        let transient = is_transient_exec_error(e);
        if transient {
            warn!(
                "[PHASE: installation] [STEP: cmd] Transient command failure detected; will retry (operation={}, program={}, err={})",
                operation,
                program,
                e
            );
        }
        transient
    })
    .await;

    match &result {
        Ok(out) => {
            debug!(
                "[PHASE: installation] [STEP: cmd] run_cmd_with_timeout exit (operation={}, program={}, exit_code={:?}, duration_ms={})",
                operation,
                program,
                out.exit_code,
                started.elapsed().as_millis()
            );
        }
        Err(e) => {
            error!(
                "[PHASE: installation] [STEP: cmd] run_cmd_with_timeout error (operation={}, program={}, duration_ms={}, err={:?})",
                operation,
                program,
                started.elapsed().as_millis(),
                e
            );
        }
    }

    result
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording runner used by driver and lifecycle tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        /// Commands whose display string contains one of these fragments exit with code 1.
        fail_matching: Vec<String>,
        /// Commands whose display string contains one of these fragments cannot be spawned.
        missing_matching: Vec<String>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(fragments: &[&str]) -> Self {
            Self {
                fail_matching: fragments.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn missing(fragments: &[&str]) -> Self {
            Self {
                missing_matching: fragments.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|c| c.iter().map(CommandSpec::display).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec.clone());
            }
            let line = spec.display();
            if self.missing_matching.iter().any(|f| line.contains(f.as_str())) {
                anyhow::bail!("Failed to spawn command '{}'", spec.program);
            }
            let failed = self.fail_matching.iter().any(|f| line.contains(f.as_str()));
            Ok(CommandOutput {
                exit_code: Some(if failed { 1 } else { 0 }),
                stdout: String::new(),
                stderr: if failed {
                    "E: simulated failure".to_string()
                } else {
                    String::new()
                },
                duration_ms: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    fn spec(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec::new(program, args.iter().copied(), Duration::from_secs(5), "test")
    }

    #[test]
    fn as_user_builds_su_invocation() {
        let s = CommandSpec::as_user("media", "dropdb koozic-v2", Duration::from_secs(5), "dropdb");
        assert_eq!(s.display(), "su - media -c dropdb koozic-v2");
        assert_eq!(s.args, vec!["-", "media", "-c", "dropdb koozic-v2"]);
    }

    #[test]
    fn transient_classification_never_retries_timeouts() {
        assert!(!is_transient_exec_error(&anyhow::anyhow!(
            "Command timed out after 10ms (operation=x, program=y)"
        )));
        assert!(is_transient_exec_error(&anyhow::anyhow!(
            "Failed to spawn: Text file busy (os error 26)"
        )));
        assert!(!is_transient_exec_error(&anyhow::anyhow!(
            "No such file or directory (os error 2)"
        )));
    }

    #[tokio::test]
    async fn best_effort_reports_failure_without_error() {
        let runner = RecordingRunner::failing(&["apt-get"]);
        let outcome = run_best_effort(
            &runner,
            &spec("apt-get", &["install", "-y", "mediainfo"]),
            FailurePolicy::BestEffort,
        )
        .await
        .expect("best effort never raises");
        match outcome {
            CommandOutcome::Failed {
                exit_code,
                stderr_tail,
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr_tail.contains("simulated"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn best_effort_reports_spawn_failure_without_error() {
        let runner = RecordingRunner::missing(&["zypper"]);
        let outcome = run_best_effort(&runner, &spec("zypper", &["install"]), FailurePolicy::BestEffort)
            .await
            .expect("best effort never raises");
        assert!(matches!(outcome, CommandOutcome::NotRun { .. }));
    }

    #[tokio::test]
    async fn fail_fast_escalates() {
        let runner = RecordingRunner::failing(&["dnf"]);
        let err = run_best_effort(&runner, &spec("dnf", &["install"]), FailurePolicy::FailFast)
            .await
            .unwrap_err();
        match err.downcast_ref::<InstallerError>() {
            Some(InstallerError::CommandFailed { exit_code, .. }) => {
                assert_eq!(*exit_code, Some(1))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_cmd_with_timeout_basic_smoke() {
        let out = run_cmd_with_timeout(
            "sh",
            &["-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()],
            Duration::from_secs(5),
            "test_echo",
        )
        .await
        .expect("command should run");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(out.stdout.contains("hello"));
        assert!(out.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn run_cmd_with_timeout_times_out() {
        let err = run_cmd_with_timeout(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
            "test_sleep",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let res = SystemCommandRunner
            .run(&spec("definitely-not-a-real-program-koozic", &[]))
            .await;
        assert!(res.is_err());
    }
}
