// Linux parsing utilities
//
// Pure parsing functions for /etc/os-release, /proc/meminfo and /etc/passwd, kept separate from
// the file I/O in linux.rs so they can be tested against fixed fixtures.

use std::path::PathBuf;

/// Linux distribution information parsed from /etc/os-release.
#[derive(Debug, Clone, Default)]
pub struct LinuxDistro {
    /// Distribution ID (e.g., "ubuntu", "fedora", "opensuse-leap").
    pub id: String,
    /// Version ID (e.g., "22.04", "40").
    pub version_id: String,
    /// Human-readable name (e.g., "Ubuntu 22.04.3 LTS").
    pub pretty_name: String,
    /// Related distributions (e.g., ["debian"], ["suse", "opensuse"]).
    pub id_like: Vec<String>,
}

/// Parse /etc/os-release content into a LinuxDistro struct.
pub fn parse_os_release(contents: &str) -> LinuxDistro {
    let mut id = String::new();
    let mut version_id = String::new();
    let mut pretty_name = String::new();
    let mut id_like = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Parse KEY=VALUE or KEY="VALUE" or KEY='VALUE'
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);

            match key {
                "ID" => id = value.to_ascii_lowercase(),
                "VERSION_ID" => version_id = value.to_string(),
                "PRETTY_NAME" => pretty_name = value.to_string(),
                "ID_LIKE" => {
                    id_like = value
                        .split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect();
                }
                _ => {}
            }
        }
    }

    if id.is_empty() {
        id = "linux".to_string();
    }
    if pretty_name.is_empty() {
        pretty_name = if version_id.is_empty() {
            id.clone()
        } else {
            format!("{} {}", id, version_id)
        };
    }

    LinuxDistro {
        id,
        version_id,
        pretty_name,
        id_like,
    }
}

/// Parse /proc/meminfo content and return `MemTotal` in kB.
pub fn parse_meminfo_total_kb(contents: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (key, rest) = line.trim().split_once(':')?;
        if key.trim() != "MemTotal" {
            return None;
        }
        // Format: "MemTotal:       16384000 kB"
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// One account from /etc/passwd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Find `user` in /etc/passwd content (`name:pw:uid:gid:gecos:home:shell`).
pub fn parse_passwd_entry(contents: &str, user: &str) -> Option<PasswdEntry> {
    contents.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 || fields[0] != user {
            return None;
        }
        Some(PasswdEntry {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
        })
    })
}
