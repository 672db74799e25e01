// Debian / Ubuntu (apt-get)

use anyhow::Result;
use async_trait::async_trait;

use super::{BaseDriver, PackageSet, PlatformDriver, PlatformFamily, RuntimePackage};
use crate::installation::CommandOutcome;

const APT_INSTALL: &[&str] = &["install", "-y", "--no-install-recommends", "-qq"];

const OS_PACKAGES: &[&str] = &[
    "adduser",
    "build-essential",
    "libtag1-dev",
    "lsb-base",
    "mediainfo",
    "postgresql",
    "postgresql-client",
    "python3-babel",
    "python3-chardet",
    "python3-dateutil",
    "python3-decorator",
    "python3-dev",
    "python3-docutils",
    "python3-feedparser",
    "python3-gevent",
    "python3-html2text",
    "python3-jinja2",
    "python3-libsass",
    "python3-lxml",
    "python3-mako",
    "python3-mock",
    "python3-passlib",
    "python3-pil",
    "python3-pip",
    "python3-psutil",
    "python3-psycopg2",
    "python3-pydot",
    "python3-pyldap",
    "python3-pyparsing",
    "python3-pypdf2",
    "python3-qrcode",
    "python3-reportlab",
    "python3-requests",
    "python3-setuptools",
    "python3-suds",
    "python3-tz",
    "python3-vatnumber",
    "python3-vobject",
    "python3-werkzeug",
    "python3-wheel",
    "python3-xlsxwriter",
    "python3-yaml",
];

pub struct DebianDriver {
    base: BaseDriver,
    packages: PackageSet,
}

impl DebianDriver {
    pub fn new(base: BaseDriver) -> Self {
        let packages = PackageSet::default()
            .with_os(OS_PACKAGES.iter().copied())
            .with_runtime([
                RuntimePackage::pinned("mutagen", "1.41.1"),
                RuntimePackage::pinned("pytaglib", "1.4.4"),
            ]);
        Self { base, packages }
    }
}

#[async_trait]
impl PlatformDriver for DebianDriver {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Debian
    }

    fn packages(&self) -> &PackageSet {
        &self.packages
    }

    async fn install_os_packages(&self, names: &[String]) -> Result<CommandOutcome> {
        self.base
            .run_package_manager("apt-get", APT_INSTALL, names, "apt_install")
            .await
    }

    async fn install_runtime_packages(
        &self,
        packages: &[RuntimePackage],
    ) -> Result<CommandOutcome> {
        self.base.pip_install(packages).await
    }

    /// The package starts the cluster itself; only the role is created.
    async fn bootstrap_database_engine(&self, owning_user: &str) -> Result<Vec<CommandOutcome>> {
        Ok(vec![self.base.create_database_role(owning_user).await?])
    }
}
