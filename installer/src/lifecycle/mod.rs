// Install / upgrade / uninstall sequencing
//
// Uninstalled -> Installed (install), Installed -> Installed (upgrade),
// Installed -> Uninstalled (uninstall). Nothing is persisted between steps; a run interrupted
// half-way leaves the host as it was at that point and needs manual cleanup.
//
// Pre-flight checks run before the first mutating step of every mode.

pub mod layout;

use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::InstallerError;
use crate::installation::files::{chown_recursive, remove_path, write_owned_file, Ownership};
use crate::installation::linux::lookup_account;
use crate::installation::linux_parsers::PasswdEntry;
use crate::installation::service::{
    control_service, install_service_unit, service_instance, ServiceAction,
};
use crate::installation::{run_best_effort, CommandOutcome, CommandRunner, CommandSpec, ExecPolicy};
use crate::models::settings::INSTALL_DIR_NAME;
use crate::models::state::InstallState;
use crate::platform::PlatformDriver;
use crate::prompt::Confirm;
use crate::release::codec::{install_codec_toolset, CodecOutcome};
use crate::release::{
    download_latest_release, fetch_latest_release, unpack_release, ReleaseSource,
};
use crate::runtime_config::{
    compute_runtime_options, HostProfiler, OPTIONS_FILE_MODE, OPTIONS_FILE_NAME,
};

pub use layout::SystemLayout;

pub const APP_URL: &str = "http://localhost:8069/";
pub const ADDONS_TO_INSTALL: &str = "oomusic,oovideo";

/// One-shot initialization run as the owning user.
pub fn init_command(install_dir: &Path, suffix: &str) -> String {
    format!(
        "{}/odoo-bin -i {} -d {} --without-demo=all --stop-after-init --log-level=warn{}",
        install_dir.display(),
        ADDONS_TO_INSTALL,
        INSTALL_DIR_NAME,
        suffix
    )
}

pub fn completion_banner() -> String {
    format!(
        "\nInstallation successful!\n\n\
         You can now connect to {}.\n\
         Default credentials:\n    \
         Email:    admin\n    \
         Password: admin\n",
        APP_URL
    )
}

/// Install pre-flight: the target folder must not exist yet.
pub async fn ensure_install_dir_free(install_dir: &Path) -> Result<(), InstallerError> {
    if tokio::fs::symlink_metadata(install_dir).await.is_ok() {
        return Err(InstallerError::InstallDirExists(install_dir.to_path_buf()));
    }
    Ok(())
}

/// Per-user data folder of the application.
pub fn user_data_dir(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("Odoo")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: &'static str,
    pub outcome: CommandOutcome,
}

/// What a run did, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub steps: Vec<StepRecord>,
    /// Confirmation groups the operator declined.
    pub declined: Vec<&'static str>,
    pub release_version: Option<String>,
    pub codec: Option<CodecOutcome>,
    pub removed: Vec<PathBuf>,
}

impl LifecycleReport {
    fn record(&mut self, step: &'static str, outcome: CommandOutcome) {
        self.steps.push(StepRecord { step, outcome });
    }

    fn record_all(&mut self, step: &'static str, outcomes: Vec<CommandOutcome>) {
        for o in outcomes {
            self.record(step, o);
        }
    }

    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|s| !s.outcome.is_success())
            .map(|s| s.step)
            .collect()
    }
}

pub struct Orchestrator<'a> {
    pub driver: &'a dyn PlatformDriver,
    pub runner: &'a dyn CommandRunner,
    pub exec: ExecPolicy,
    pub release: &'a dyn ReleaseSource,
    pub profiler: &'a dyn HostProfiler,
    pub confirm: &'a mut dyn Confirm,
    pub layout: &'a SystemLayout,
}

fn ownership(account: &PasswdEntry) -> Ownership {
    Ownership {
        uid: account.uid,
        gid: account.gid,
    }
}

impl<'a> Orchestrator<'a> {
    async fn systemctl(&self, unit: Option<&str>, action: ServiceAction) -> Result<CommandOutcome> {
        control_service(self.runner, self.exec, unit, action).await
    }

    /// Owner recorded in the state file; a deleted account is reported, not fatal.
    async fn find_owner(&self, user: &str, mode: &str) -> Result<Option<PasswdEntry>> {
        let account = self.layout.accounts.find(user).await?;
        if account.is_none() {
            warn!(
                "[PHASE: {}] [STEP: preflight] Account '{}' no longer exists; continuing without it",
                mode, user
            );
        }
        Ok(account)
    }

    async fn run_init(&self, user: &str, install_dir: &Path) -> Result<CommandOutcome> {
        info!("[PHASE: init] [STEP: odoo_init] Initializing KooZic...");
        let spec = CommandSpec::as_user(
            user,
            &init_command(install_dir, self.driver.init_command_suffix()),
            self.exec.timeout,
            "odoo_init",
        );
        run_best_effort(self.runner, &spec, self.exec.failure).await
    }

    fn log_summary(&self, mode: &str, report: &LifecycleReport, started: Instant) {
        let failed = report.failed_steps();
        if failed.is_empty() {
            info!(
                "[PHASE: {}] [STEP: done] Completed (steps={}, duration_ms={})",
                mode,
                report.steps.len(),
                started.elapsed().as_millis()
            );
        } else {
            warn!(
                "[PHASE: {}] [STEP: done] Completed with failed steps: {} (duration_ms={})",
                mode,
                failed.join(", "),
                started.elapsed().as_millis()
            );
        }
    }

    /// Fresh install of the latest release into `install_dir`, owned by `user`.
    pub async fn install(&mut self, user: &str, install_dir: &Path) -> Result<LifecycleReport> {
        let started = Instant::now();
        info!(
            "[PHASE: install] [STEP: preflight] Starting install (user={}, dir={:?}, os={})",
            user,
            install_dir,
            self.driver.family()
        );

        ensure_install_dir_free(install_dir).await?;
        let account = lookup_account(&self.layout.accounts, user).await?;
        let profile = self.profiler.profile()?;
        let owner = ownership(&account);
        let mut report = LifecycleReport::default();

        InstallState::new(user, install_dir)
            .persist(&self.layout.state_file)
            .await?;

        info!("[PHASE: install] [STEP: os_packages] Installing package dependencies...");
        let os = self.driver.packages().os_names();
        report.record("os_packages", self.driver.install_os_packages(&os).await?);

        info!("[PHASE: install] [STEP: runtime_packages] Installing pip dependencies...");
        let runtime = self.driver.packages().runtime_packages();
        report.record(
            "runtime_packages",
            self.driver.install_runtime_packages(&runtime).await?,
        );

        info!("[PHASE: install] [STEP: database] Setting up PostgreSQL...");
        report.record_all(
            "database",
            self.driver.bootstrap_database_engine(user).await?,
        );

        let version = fetch_latest_release(self.release, install_dir).await?;
        chown_recursive(install_dir, owner).await?;
        report.release_version = Some(version);

        report.codec = Some(
            install_codec_toolset(
                install_dir,
                &self.layout.codec_bin_dir,
                self.layout.search_path.clone(),
                owner,
            )
            .await?,
        );

        report.record("init", self.run_init(user, install_dir).await?);

        install_service_unit(
            install_dir,
            &self.layout.systemd_unit_dir,
            &install_dir.join("odoo-bin"),
        )
        .await?;

        let options = compute_runtime_options(&profile, install_dir, &account.home)?;
        let options_path = account.home.join(OPTIONS_FILE_NAME);
        write_owned_file(
            &options_path,
            options.render().as_bytes(),
            OPTIONS_FILE_MODE,
            Some(owner),
        )
        .await?;
        info!(
            "[PHASE: install] [STEP: options] Wrote {:?} (workers={:?}, limit_memory_soft={:?}, limit_memory_hard={:?})",
            options_path,
            options.computed().get("workers").map(ToString::to_string),
            options.computed().get("limit_memory_soft").map(ToString::to_string),
            options.computed().get("limit_memory_hard").map(ToString::to_string)
        );

        let unit = service_instance(user);
        report.record("service", self.systemctl(None, ServiceAction::DaemonReload).await?);
        report.record("service", self.systemctl(Some(&unit), ServiceAction::Enable).await?);
        report.record("service", self.systemctl(Some(&unit), ServiceAction::Start).await?);

        self.log_summary("install", &report, started);
        Ok(report)
    }

    /// Remove the installation recorded in the state file, one confirmed group at a time.
    pub async fn uninstall(&mut self) -> Result<LifecycleReport> {
        let started = Instant::now();
        let state =
            InstallState::load(&self.layout.state_file, &self.layout.legacy_state_file).await?;
        let account = self.find_owner(&state.owning_user, "uninstall").await?;
        info!(
            "[PHASE: uninstall] [STEP: preflight] Starting uninstall (user={}, dir={:?})",
            state.owning_user, state.install_dir
        );
        let mut report = LifecycleReport::default();
        let unit = service_instance(&state.owning_user);

        if self
            .confirm
            .confirm("Do you want to deactivate the KooZic systemd service? ")?
        {
            report.record("service", self.systemctl(Some(&unit), ServiceAction::Stop).await?);
            report.record(
                "service",
                self.systemctl(Some(&unit), ServiceAction::Disable).await?,
            );
        } else {
            info!("[PHASE: uninstall] [STEP: service] Declined; service left in place");
            report.declined.push("service");
        }

        if self.confirm.confirm("Do you want to drop the KooZic database? ")? {
            let spec = CommandSpec::as_user(
                &state.owning_user,
                &format!("dropdb {}", INSTALL_DIR_NAME),
                self.exec.timeout,
                "dropdb",
            );
            report.record(
                "database",
                run_best_effort(self.runner, &spec, self.exec.failure).await?,
            );
        } else {
            info!("[PHASE: uninstall] [STEP: database] Declined; database kept");
            report.declined.push("database");
        }

        if let Some(engine) = self.driver.managed_engine_service() {
            if self
                .confirm
                .confirm("Do you want to deactivate the PostgreSQL systemd service? ")?
            {
                report.record(
                    "engine_service",
                    self.systemctl(Some(engine), ServiceAction::Stop).await?,
                );
                report.record(
                    "engine_service",
                    self.systemctl(Some(engine), ServiceAction::Disable).await?,
                );
            } else {
                info!("[PHASE: uninstall] [STEP: engine_service] Declined; PostgreSQL left running");
                report.declined.push("engine_service");
            }
        }

        let mut candidates = Vec::new();
        if let Some(a) = &account {
            candidates.push(user_data_dir(&a.home));
            candidates.push(a.home.join(OPTIONS_FILE_NAME));
        }
        candidates.extend([
            self.layout.unit_file(),
            self.layout.state_file.clone(),
            self.layout.codec_binary(),
            state.install_dir.clone(),
        ]);
        let mut to_delete = Vec::new();
        for p in candidates {
            if tokio::fs::symlink_metadata(&p).await.is_ok() {
                to_delete.push(p);
            }
        }

        if to_delete.is_empty() {
            info!("[PHASE: uninstall] [STEP: files] Nothing left to delete");
        } else {
            let listing = to_delete
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            if self.confirm.confirm(&format!(
                "Do you want to delete the following files/folders?\n{}\n",
                listing
            ))? {
                for p in to_delete {
                    if remove_path(&p).await? {
                        report.removed.push(p);
                    }
                }
            } else {
                info!("[PHASE: uninstall] [STEP: files] Declined; files kept");
                report.declined.push("files");
            }
        }

        self.log_summary("uninstall", &report, started);
        Ok(report)
    }

    /// Replace the sources (when confirmed) and re-run initialization.
    pub async fn upgrade(&mut self) -> Result<LifecycleReport> {
        let started = Instant::now();
        let state =
            InstallState::load(&self.layout.state_file, &self.layout.legacy_state_file).await?;
        let account = self.find_owner(&state.owning_user, "upgrade").await?;
        info!(
            "[PHASE: upgrade] [STEP: preflight] Starting upgrade (user={}, dir={:?})",
            state.owning_user, state.install_dir
        );
        let mut report = LifecycleReport::default();
        let unit = service_instance(&state.owning_user);

        report.record("service", self.systemctl(Some(&unit), ServiceAction::Stop).await?);

        if self.confirm.confirm(&format!(
            "Delete content of folder {} and replace with new sources? ",
            state.install_dir.display()
        ))? {
            let Some(account) = account else {
                return Err(InstallerError::UnknownUser(state.owning_user.clone()).into());
            };
            let (version, archive) = download_latest_release(self.release).await?;
            remove_path(&state.install_dir).await?;
            unpack_release(archive, &state.install_dir).await?;
            chown_recursive(&state.install_dir, ownership(&account)).await?;
            report.release_version = Some(version);
        } else {
            info!("[PHASE: upgrade] [STEP: sources] Declined; keeping current sources");
            report.declined.push("sources");
        }

        report.record("init", self.run_init(&state.owning_user, &state.install_dir).await?);
        report.record("service", self.systemctl(Some(&unit), ServiceAction::Start).await?);

        self.log_summary("upgrade", &report, started);
        Ok(report)
    }
}
