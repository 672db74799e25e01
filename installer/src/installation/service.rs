// systemd service helpers
//
// The application ships a templated unit (`koozic@.service`, instantiated per user). We rewrite its
// ExecStart line to the concrete install path and drive it through `systemctl`.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::installation::{run_best_effort, CommandOutcome, CommandRunner, CommandSpec, ExecPolicy};

/// Unit template file name, both inside the release and in the system unit directory.
pub const SERVICE_TEMPLATE_NAME: &str = "koozic@.service";

/// Location of the unit template inside an extracted release.
pub fn template_path_in_release(install_dir: &Path) -> PathBuf {
    install_dir
        .join("extra")
        .join("linux-systemd")
        .join("system")
        .join(SERVICE_TEMPLATE_NAME)
}

/// Instance name for the owning user (`koozic@<user>.service`).
pub fn service_instance(user: &str) -> String {
    format!("koozic@{}.service", user)
}

/// Rewrite every `ExecStart` line of a unit template to start `exec_path`.
///
/// All other lines are kept verbatim.
pub fn render_unit_from_template(template: &str, exec_path: &Path) -> String {
    let exec = quote_systemd_path(&exec_path.to_string_lossy());
    let mut out = String::with_capacity(template.len() + 64);
    for line in template.split_inclusive('\n') {
        if line.starts_with("ExecStart") {
            out.push_str("ExecStart=");
            out.push_str(&exec);
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Quote a path for systemd unit files if it contains spaces or special characters.
fn quote_systemd_path(path: &str) -> String {
    if path.contains(' ') || path.contains('\t') || path.contains('"') {
        format!("\"{}\"", path.replace('"', "\\\""))
    } else {
        path.to_string()
    }
}

/// Read the release's unit template, rewrite it and install it into `unit_dir`.
///
/// Returns the path of the written unit file.
pub async fn install_service_unit(
    install_dir: &Path,
    unit_dir: &Path,
    exec_path: &Path,
) -> Result<PathBuf> {
    let template_path = template_path_in_release(install_dir);
    let template = tokio::fs::read_to_string(&template_path)
        .await
        .with_context(|| format!("Service unit template not found: {:?}", template_path))?;

    let unit = render_unit_from_template(&template, exec_path);
    tokio::fs::create_dir_all(unit_dir)
        .await
        .with_context(|| format!("Failed to create unit directory {:?}", unit_dir))?;
    let unit_path = unit_dir.join(SERVICE_TEMPLATE_NAME);
    tokio::fs::write(&unit_path, unit)
        .await
        .with_context(|| format!("Failed to write systemd unit file: {:?}", unit_path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&unit_path, std::fs::Permissions::from_mode(0o644))
            .await
            .with_context(|| format!("Failed to chmod {:?}", unit_path))?;
    }

    info!(
        "[PHASE: install] [STEP: service_unit] Wrote systemd unit file: {:?}",
        unit_path
    );
    Ok(unit_path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    DaemonReload,
    Enable,
    Start,
    Stop,
    Disable,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::DaemonReload => "daemon-reload",
            ServiceAction::Enable => "enable",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Disable => "disable",
        }
    }
}

/// `systemctl <action> [unit]`, best effort.
pub async fn control_service(
    runner: &dyn CommandRunner,
    exec: ExecPolicy,
    unit: Option<&str>,
    action: ServiceAction,
) -> Result<CommandOutcome> {
    debug!(
        "[PHASE: installation] [STEP: service] control_service (unit={:?}, action={})",
        unit,
        action.as_str()
    );
    let mut args = vec![action.as_str().to_string()];
    if let Some(u) = unit {
        args.push(u.to_string());
    }
    let spec = CommandSpec::new(
        "systemctl",
        args,
        exec.timeout,
        &format!("systemctl_{}", action.as_str().replace('-', "_")),
    );
    run_best_effort(runner, &spec, exec.failure).await
}
