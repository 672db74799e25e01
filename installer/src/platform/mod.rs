// OS-family drivers
//
// One struct per family behind the `PlatformDriver` trait. Shared behavior (pip, role creation,
// package-manager invocation) lives in `BaseDriver`, which every variant delegates to.

pub mod base;
pub mod debian;
pub mod fedora;
pub mod suse;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::installation::linux_parsers::LinuxDistro;
use crate::installation::{CommandOutcome, CommandRunner, ExecPolicy};

pub use base::BaseDriver;
pub use debian::DebianDriver;
pub use fedora::FedoraDriver;
pub use suse::SuseDriver;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Debian,
    Fedora,
    Suse,
}

impl PlatformFamily {
    pub const ALL: [PlatformFamily; 3] = [
        PlatformFamily::Debian,
        PlatformFamily::Fedora,
        PlatformFamily::Suse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Debian => "debian",
            PlatformFamily::Fedora => "fedora",
            PlatformFamily::Suse => "suse",
        }
    }

    /// Label shown in the OS menu.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformFamily::Debian => "Debian / Ubuntu",
            PlatformFamily::Fedora => "Fedora / RHEL",
            PlatformFamily::Suse => "openSUSE / SLES",
        }
    }

    /// Map an os-release record to a family using `ID` first, then `ID_LIKE`.
    pub fn detect(distro: &LinuxDistro) -> Option<Self> {
        std::iter::once(distro.id.as_str())
            .chain(distro.id_like.iter().map(String::as_str))
            .find_map(Self::from_os_release_id)
    }

    fn from_os_release_id(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" => Some(PlatformFamily::Debian),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some(PlatformFamily::Fedora),
            "suse" | "opensuse" | "sles" | "sled" => Some(PlatformFamily::Suse),
            _ if id.starts_with("opensuse") => Some(PlatformFamily::Suse),
            _ => None,
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pip requirement, optionally pinned (`name==version`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimePackage {
    pub name: String,
    pub version: Option<String>,
}

impl RuntimePackage {
    pub fn pinned(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Some(version.to_string()),
        }
    }

    pub fn unpinned(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
        }
    }
}

impl fmt::Display for RuntimePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}=={}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// OS and runtime packages of one family. Ordered sets keep invocations deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    pub os: BTreeSet<String>,
    pub runtime: BTreeSet<RuntimePackage>,
}

impl PackageSet {
    pub fn with_os<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.os.extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn with_runtime(mut self, packages: impl IntoIterator<Item = RuntimePackage>) -> Self {
        self.runtime.extend(packages);
        self
    }

    pub fn os_names(&self) -> Vec<String> {
        self.os.iter().cloned().collect()
    }

    pub fn runtime_packages(&self) -> Vec<RuntimePackage> {
        self.runtime.iter().cloned().collect()
    }
}

#[async_trait]
pub trait PlatformDriver: Send + Sync {
    fn family(&self) -> PlatformFamily;

    fn packages(&self) -> &PackageSet;

    /// Non-interactive package-manager install of `names`. Empty input issues no command.
    async fn install_os_packages(&self, names: &[String]) -> Result<CommandOutcome>;

    /// `pip3 install -q <specs>`. Empty input issues no command.
    async fn install_runtime_packages(&self, packages: &[RuntimePackage])
        -> Result<CommandOutcome>;

    /// Family pre-steps for PostgreSQL, then role creation for `owning_user`.
    async fn bootstrap_database_engine(&self, owning_user: &str) -> Result<Vec<CommandOutcome>>;

    /// Appended to the one-shot initialization command.
    fn init_command_suffix(&self) -> &'static str {
        ""
    }

    /// Engine service this family enabled itself during bootstrap.
    fn managed_engine_service(&self) -> Option<&'static str> {
        None
    }
}

pub fn build_driver(
    family: PlatformFamily,
    runner: Arc<dyn CommandRunner>,
    exec: ExecPolicy,
) -> Box<dyn PlatformDriver> {
    let base = BaseDriver::new(runner, exec);
    match family {
        PlatformFamily::Debian => Box::new(DebianDriver::new(base)),
        PlatformFamily::Fedora => Box::new(FedoraDriver::new(base)),
        PlatformFamily::Suse => Box::new(SuseDriver::new(base)),
    }
}
