// KooZic installer
// Library entry point

pub mod cli;
pub mod error;
pub mod installation;
pub mod lifecycle;
pub mod models;
pub mod platform;
pub mod prompt;
pub mod release;
pub mod runtime_config;
pub mod utils;

use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{Cli, Mode};
use crate::installation::linux::detect_linux_distro;
use crate::installation::{CommandRunner, ExecPolicy, SystemCommandRunner};
use crate::lifecycle::{completion_banner, ensure_install_dir_free, Orchestrator, SystemLayout};
use crate::models::settings::{load_settings, DEFAULT_SETTINGS_FILE, ENV_PREFIX};
use crate::platform::{build_driver, PlatformFamily};
use crate::prompt::InteractiveConfirmer;
use crate::release::HttpReleaseSource;
use crate::runtime_config::LiveHostProfiler;

/// Initialize logging system with dual format (JSON + human-readable)
///
/// Returns the log folder in use.
pub fn init_logging(override_dir: Option<&Path>, run_id: &str) -> Result<PathBuf> {
    let log_dir = utils::path_resolver::resolve_log_folder(override_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("koozic-installer-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("koozic-installer-{}.txt", timestamp));

    let json_run_id = run_id.to_string();

    // - JSON format to .log file (debug and up)
    // - Human-readable format to .txt file (debug and up)
    // - Human-readable to stdout (info and up)
    fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        .chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        &json_run_id,
                    );
                    out.finish(format_args!("{}", json_line));
                })
                .chain(fern::log_file(&json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(fern::log_file(&txt_log_file)?),
        )
        .apply()?;

    log::debug!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(log_dir)
}

/// Pick the OS family from settings, or ask with the os-release guess as a hint.
fn choose_family(
    configured: Option<PlatformFamily>,
    detected: Option<PlatformFamily>,
    prompt: &mut InteractiveConfirmer<std::io::StdinLock<'static>, std::io::Stdout>,
) -> Result<Option<PlatformFamily>> {
    if let Some(f) = configured {
        if detected.is_some_and(|d| d != f) {
            warn!(
                "[PHASE: preflight] [STEP: os] Configured OS family {} differs from detected {:?}",
                f, detected
            );
        }
        return Ok(Some(f));
    }
    prompt.choose_platform(detected)
}

/// Full run for one CLI invocation. The caller has already checked for root.
pub async fn run(cli: Cli) -> Result<()> {
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = load_settings(
        &config_file,
        cli.config.is_some(),
        ENV_PREFIX,
        &cli.overrides(),
    )?;

    let run_id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = init_logging(settings.log_dir.as_deref(), &run_id) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }
    info!(
        "[PHASE: {}] [STEP: start] KooZic installer {} starting (run_id={}, user={}, directory={:?})",
        cli.mode.as_str(),
        env!("CARGO_PKG_VERSION"),
        run_id,
        settings.user,
        settings.directory
    );

    if cli.mode == Mode::Install {
        ensure_install_dir_free(&settings.install_dir()).await?;
    }

    let layout = SystemLayout::system();
    let distro = detect_linux_distro(&layout.os_release).await;
    if let Some(d) = &distro {
        info!(
            "[PHASE: preflight] [STEP: os] Host reports {} (id={}, version_id={})",
            d.pretty_name, d.id, d.version_id
        );
    }
    let detected = distro.as_ref().and_then(PlatformFamily::detect);

    let mut prompt = InteractiveConfirmer::stdio();
    let Some(family) = choose_family(settings.os, detected, &mut prompt)? else {
        info!("[PHASE: preflight] [STEP: os] No operating system chosen; exiting");
        return Ok(());
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let exec = ExecPolicy {
        failure: settings.failure_policy(),
        timeout: settings.command_timeout(),
    };
    let driver = build_driver(family, runner.clone(), exec);
    let release = HttpReleaseSource::new()?;
    let profiler = LiveHostProfiler::default();

    let mut orchestrator = Orchestrator {
        driver: driver.as_ref(),
        runner: runner.as_ref(),
        exec,
        release: &release,
        profiler: &profiler,
        confirm: &mut prompt,
        layout: &layout,
    };

    match cli.mode {
        Mode::Install => {
            orchestrator
                .install(&settings.user, &settings.install_dir())
                .await?;
            println!("{}", completion_banner());
        }
        Mode::Uninstall => {
            orchestrator.uninstall().await?;
        }
        Mode::Upgrade => {
            orchestrator.upgrade().await?;
        }
    }
    Ok(())
}
