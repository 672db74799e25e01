// Resource limits and option sets
//
// workers          = max(cpu, 2)
// max_cron_threads = 1
// soft             = clamp(memory / (workers + cron), 896 MiB, 2048 MiB)
// hard             = max(memory * 9 / 10, 1 GiB)

use anyhow::Result;
use std::path::Path;

use super::{OptionSet, ResourceProfile, RuntimeOptions};
use crate::models::settings::INSTALL_DIR_NAME;

pub const MIB: u64 = 1024 * 1024;
pub const SOFT_LIMIT_FLOOR: u64 = 896 * MIB;
pub const SOFT_LIMIT_CEILING: u64 = 2048 * MIB;
pub const HARD_LIMIT_FLOOR: u64 = 1024 * MIB;
pub const MIN_WORKERS: u64 = 2;
pub const MAX_CRON_THREADS: u64 = 1;
pub const LIMIT_TIME_CPU: i64 = 1800;
pub const LIMIT_TIME_REAL: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub workers: u64,
    pub max_cron_threads: u64,
    pub limit_memory_soft: u64,
    pub limit_memory_hard: u64,
}

pub fn compute_limits(profile: &ResourceProfile) -> ResourceLimits {
    let workers = profile.cpu_count.max(MIN_WORKERS);
    let soft_candidate = profile.physical_memory_bytes / (workers + MAX_CRON_THREADS);
    let limit_memory_soft = soft_candidate.clamp(SOFT_LIMIT_FLOOR, SOFT_LIMIT_CEILING);
    // u128 so that 9/10 of any u64 is exact.
    let ninety_percent = (u128::from(profile.physical_memory_bytes) * 9 / 10) as u64;
    let limit_memory_hard = ninety_percent.max(HARD_LIMIT_FLOOR);

    ResourceLimits {
        workers,
        max_cron_threads: MAX_CRON_THREADS,
        limit_memory_soft,
        limit_memory_hard,
    }
}

fn as_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Options derived from the host, in the order they are written.
pub fn computed_options(profile: &ResourceProfile) -> OptionSet {
    let limits = compute_limits(profile);
    let mut o = OptionSet::new();
    o.insert("db_name", INSTALL_DIR_NAME);
    o.insert("dbfilter", format!("^{}$", INSTALL_DIR_NAME));
    o.insert("limit_memory_hard", as_i64(limits.limit_memory_hard));
    o.insert("limit_memory_soft", as_i64(limits.limit_memory_soft));
    o.insert("limit_time_cpu", LIMIT_TIME_CPU);
    o.insert("limit_time_real", LIMIT_TIME_REAL);
    o.insert("list_db", false);
    o.insert("max_cron_threads", as_i64(limits.max_cron_threads));
    o.insert("workers", as_i64(limits.workers));
    o
}

/// Reference values written commented out.
pub fn default_options(install_dir: &Path, user_home: &Path) -> OptionSet {
    let addons_path = format!(
        "{},{}",
        install_dir.join("odoo").join("addons").display(),
        install_dir.join("addons").display()
    );
    let data_dir = user_home.join(".local").join("share").join("Odoo");

    let mut o = OptionSet::new();
    o.insert("addons_path", addons_path);
    o.insert("admin_passwd", "admin");
    o.insert("csv_internal_sep", ",");
    o.insert("data_dir", data_dir.display().to_string());
    o.insert("db_host", false);
    o.insert("db_maxconn", 64_i64);
    o.insert("db_password", false);
    o.insert("db_port", false);
    o.insert("db_sslmode", "prefer");
    o.insert("db_template", "template1");
    o.insert("db_user", false);
    o.insert("demo", "{}");
    o.insert("email_from", false);
    o.insert("geoip_database", "/usr/share/GeoIP/GeoLite2-City.mmdb");
    o.insert("http_enable", true);
    o.insert("http_interface", "");
    o.insert("http_port", 8069_i64);
    o.insert("import_partial", "");
    o.insert("limit_request", 8192_i64);
    o.insert("limit_time_real_cron", -1_i64);
    o.insert("log_db", false);
    o.insert("log_db_level", "warning");
    o.insert("log_handler", ":INFO");
    o.insert("log_level", "info");
    o.insert("logfile", "None");
    o.insert("logrotate", false);
    o.insert("longpolling_port", 8072_i64);
    o.insert("osv_memory_age_limit", 1.0_f64);
    o.insert("osv_memory_count_limit", false);
    o.insert("pg_path", "None");
    o.insert("pidfile", "None");
    o.insert("proxy_mode", false);
    o.insert("reportgz", false);
    o.insert("server_wide_modules", "web");
    o.insert("smtp_password", false);
    o.insert("smtp_port", 25_i64);
    o.insert("smtp_server", "localhost");
    o.insert("smtp_ssl", false);
    o.insert("smtp_user", false);
    o.insert("syslog", false);
    o.insert("test_commit", false);
    o.insert("test_enable", false);
    o.insert("test_file", false);
    o.insert("test_report_directory", false);
    o.insert("translate_modules", "['all']");
    o.insert("unaccent", false);
    o.insert("without_demo", false);
    o
}

pub fn compute_runtime_options(
    profile: &ResourceProfile,
    install_dir: &Path,
    user_home: &Path,
) -> Result<RuntimeOptions> {
    RuntimeOptions::new(
        computed_options(profile),
        default_options(install_dir, user_home),
    )
}
