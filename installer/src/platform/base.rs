// Behavior shared by every family driver.

use anyhow::Result;
use log::info;
use std::sync::Arc;

use super::RuntimePackage;
use crate::installation::service::{control_service, ServiceAction};
use crate::installation::{run_best_effort, CommandOutcome, CommandRunner, CommandSpec, ExecPolicy};

pub const POSTGRES_ADMIN: &str = "postgres";
pub const POSTGRES_SERVICE: &str = "postgresql";

#[derive(Clone)]
pub struct BaseDriver {
    runner: Arc<dyn CommandRunner>,
    exec: ExecPolicy,
}

impl BaseDriver {
    pub fn new(runner: Arc<dyn CommandRunner>, exec: ExecPolicy) -> Self {
        Self { runner, exec }
    }

    pub fn exec(&self) -> ExecPolicy {
        self.exec
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// `<program> <base_args...> <names...>`; skipped when `names` is empty.
    pub async fn run_package_manager(
        &self,
        program: &str,
        base_args: &[&str],
        names: &[String],
        operation: &str,
    ) -> Result<CommandOutcome> {
        if names.is_empty() {
            info!(
                "[PHASE: install] [STEP: {}] No packages to install; skipping",
                operation
            );
            return Ok(CommandOutcome::Skipped);
        }
        info!(
            "[PHASE: install] [STEP: {}] Installing {} package(s) with {}",
            operation,
            names.len(),
            program
        );
        let args = base_args
            .iter()
            .map(|a| a.to_string())
            .chain(names.iter().cloned());
        let spec = CommandSpec::new(program, args, self.exec.timeout, operation);
        run_best_effort(self.runner(), &spec, self.exec.failure).await
    }

    pub async fn pip_install(&self, packages: &[RuntimePackage]) -> Result<CommandOutcome> {
        let specs: Vec<String> = packages.iter().map(ToString::to_string).collect();
        self.run_package_manager("pip3", &["install", "-q"], &specs, "pip_install")
            .await
    }

    /// `su - postgres -c "createuser -s <user>"`
    pub async fn create_database_role(&self, owning_user: &str) -> Result<CommandOutcome> {
        info!(
            "[PHASE: install] [STEP: database_role] Creating PostgreSQL role (user={})",
            owning_user
        );
        let spec = CommandSpec::as_user(
            POSTGRES_ADMIN,
            &format!("createuser -s {}", owning_user),
            self.exec.timeout,
            "createuser",
        );
        run_best_effort(self.runner(), &spec, self.exec.failure).await
    }

    pub async fn run_command(
        &self,
        program: &str,
        args: &[&str],
        operation: &str,
    ) -> Result<CommandOutcome> {
        let spec = CommandSpec::new(program, args.iter().copied(), self.exec.timeout, operation);
        run_best_effort(self.runner(), &spec, self.exec.failure).await
    }

    /// `systemctl enable` then `systemctl start` for `unit`.
    pub async fn enable_and_start(&self, unit: &str) -> Result<Vec<CommandOutcome>> {
        let enabled = control_service(self.runner(), self.exec, Some(unit), ServiceAction::Enable)
            .await?;
        let started = control_service(self.runner(), self.exec, Some(unit), ServiceAction::Start)
            .await?;
        Ok(vec![enabled, started])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::testing::RecordingRunner;

    fn base(runner: Arc<RecordingRunner>) -> BaseDriver {
        BaseDriver::new(runner, ExecPolicy::default())
    }

    #[tokio::test]
    async fn empty_package_list_issues_no_command() {
        let runner = Arc::new(RecordingRunner::new());
        let b = base(runner.clone());
        let out = b
            .run_package_manager("apt-get", &["install", "-y"], &[], "apt_install")
            .await
            .expect("skip");
        assert_eq!(out, CommandOutcome::Skipped);
        assert_eq!(b.pip_install(&[]).await.expect("skip"), CommandOutcome::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn pip_install_renders_pins() {
        let runner = Arc::new(RecordingRunner::new());
        let b = base(runner.clone());
        b.pip_install(&[
            RuntimePackage::pinned("mutagen", "1.41.1"),
            RuntimePackage::unpinned("wheel"),
        ])
        .await
        .expect("pip");
        assert_eq!(runner.calls(), vec!["pip3 install -q mutagen==1.41.1 wheel"]);
    }

    #[tokio::test]
    async fn role_creation_runs_as_postgres() {
        let runner = Arc::new(RecordingRunner::failing(&["createuser"]));
        let b = base(runner.clone());
        let out = b.create_database_role("media").await.expect("best effort");
        assert!(!out.is_success());
        assert_eq!(runner.calls(), vec!["su - postgres -c createuser -s media"]);
    }
}
