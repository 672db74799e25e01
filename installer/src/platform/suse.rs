// openSUSE / SLES (zypper)

use anyhow::Result;
use async_trait::async_trait;

use super::base::POSTGRES_SERVICE;
use super::{BaseDriver, PackageSet, PlatformDriver, PlatformFamily, RuntimePackage};
use crate::installation::CommandOutcome;

const ZYPPER_INSTALL: &[&str] = &["--non-interactive", "--quiet", "install", "--no-recommends"];

const OS_PACKAGES: &[&str] = &[
    "gcc",
    "gcc-c++",
    "mediainfo",
    "postgresql",
    "postgresql-contrib",
    "postgresql-devel",
    "postgresql-server",
    "python3-Babel",
    "python3-Jinja2",
    "python3-Mako",
    "python3-MarkupSafe",
    "python3-Pillow",
    "python3-PyPDF2",
    "python3-PyYAML",
    "python3-Werkzeug",
    "python3-XlsxWriter",
    "python3-chardet",
    "python3-decorator",
    "python3-devel",
    "python3-docutils",
    "python3-feedparser",
    "python3-gevent",
    "python3-greenlet",
    "python3-html2text",
    "python3-ldap",
    "python3-libsass",
    "python3-lxml",
    "python3-mock",
    "python3-num2words",
    "python3-passlib",
    "python3-pip",
    "python3-psutil",
    "python3-psycopg2",
    "python3-pydot",
    "python3-pyparsing",
    "python3-pyserial",
    "python3-python-dateutil",
    "python3-pytz",
    "python3-pyusb",
    "python3-qrcode",
    "python3-reportlab",
    "python3-requests",
    "python3-setuptools",
    "python3-six",
    "python3-suds-jurko",
    "python3-vobject",
    "python3-wheel",
    "python3-xlrd",
    "python3-xlwt",
    "taglib-devel",
];

pub struct SuseDriver {
    base: BaseDriver,
    packages: PackageSet,
}

impl SuseDriver {
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
impl PlatformDriver for SuseDriver {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Suse
    }

    fn packages(&self) -> &PackageSet {
        &self.packages
    }

    async fn install_os_packages(&self, names: &[String]) -> Result<CommandOutcome> {
        self.base
            .run_package_manager("zypper", ZYPPER_INSTALL, names, "zypper_install")
            .await
    }

    async fn install_runtime_packages(
        &self,
        packages: &[RuntimePackage],
    ) -> Result<CommandOutcome> {
        self.base.pip_install(packages).await
    }

    // The distribution unit runs initdb on first start.
    async fn bootstrap_database_engine(&self, owning_user: &str) -> Result<Vec<CommandOutcome>> {
        let mut outcomes = self.base.enable_and_start(POSTGRES_SERVICE).await?;
        outcomes.push(self.base.create_database_role(owning_user).await?);
        Ok(outcomes)
    }

    fn managed_engine_service(&self) -> Option<&'static str> {
        Some(POSTGRES_SERVICE)
    }
}
