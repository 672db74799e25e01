// Fedora / RHEL (dnf)

use anyhow::Result;
use async_trait::async_trait;

use super::base::POSTGRES_SERVICE;
use super::{BaseDriver, PackageSet, PlatformDriver, PlatformFamily, RuntimePackage};
use crate::installation::CommandOutcome;

const DNF_INSTALL: &[&str] = &["install", "-y", "-q"];

const OS_PACKAGES: &[&str] = &[
    "babel",
    "gcc",
    "gcc-c++",
    "libxslt-python",
    "mediainfo",
    "postgresql",
    "postgresql-contrib",
    "postgresql-devel",
    "postgresql-libs",
    "postgresql-server",
    "pychart",
    "pyparsing",
    "python3-babel",
    "python3-chardet",
    "python3-dateutil",
    "python3-decorator",
    "python3-devel",
    "python3-docutils",
    "python3-feedparser",
    "python3-gevent",
    "python3-greenlet",
    "python3-html2text",
    "python3-jinja2",
    "python3-libsass",
    "python3-lxml",
    "python3-mako",
    "python3-markupsafe",
    "python3-mock",
    "python3-num2words",
    "python3-ofxparse",
    "python3-passlib",
    "python3-pillow",
    "python3-psutil",
    "python3-psycopg2",
    "python3-pydot",
    "python3-pyldap",
    "python3-pyparsing",
    "python3-PyPDF2",
    "python3-pyserial",
    "python3-pytz",
    "python3-pyusb",
    "python3-PyYAML",
    "python3-qrcode",
    "python3-reportlab",
    "python3-requests",
    "python3-six",
    "python3-stdnum",
    "python3-suds",
    "python3-vatnumber",
    "python3-vobject",
    "python3-werkzeug",
    "python3-xlrd",
    "python3-xlwt",
    "redhat-rpm-config",
    "taglib-devel",
];

pub struct FedoraDriver {
    base: BaseDriver,
    packages: PackageSet,
}

impl FedoraDriver {
    pub fn new(base: BaseDriver) -> Self {
        let packages = PackageSet::default()
            .with_os(OS_PACKAGES.iter().copied())
            .with_runtime([
                RuntimePackage::pinned("mutagen", "1.41.1"),
                RuntimePackage::pinned("pytaglib", "1.4.4"),
                RuntimePackage::pinned("XlsxWriter", "0.9.3"),
            ]);
        Self { base, packages }
    }
}

#[async_trait]
impl PlatformDriver for FedoraDriver {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Fedora
    }

    fn packages(&self) -> &PackageSet {
        &self.packages
    }

    async fn install_os_packages(&self, names: &[String]) -> Result<CommandOutcome> {
        self.base
            .run_package_manager("dnf", DNF_INSTALL, names, "dnf_install")
            .await
    }

    async fn install_runtime_packages(
        &self,
        packages: &[RuntimePackage],
    ) -> Result<CommandOutcome> {
        self.base.pip_install(packages).await
    }

    /// initdb, enable + start the engine, then create the role.
    async fn bootstrap_database_engine(&self, owning_user: &str) -> Result<Vec<CommandOutcome>> {
        let mut outcomes = vec![
            self.base
                .run_command(
                    "postgresql-setup",
                    &["--initdb", "--unit", POSTGRES_SERVICE],
                    "postgresql_initdb",
                )
                .await?,
        ];
        outcomes.extend(self.base.enable_and_start(POSTGRES_SERVICE).await?);
        outcomes.push(self.base.create_database_role(owning_user).await?);
        Ok(outcomes)
    }

    fn init_command_suffix(&self) -> &'static str {
        " --db-template=template0"
    }

    fn managed_engine_service(&self) -> Option<&'static str> {
        Some(POSTGRES_SERVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::testing::RecordingRunner;
    use crate::installation::ExecPolicy;
    use std::sync::Arc;

    #[tokio::test]
    async fn bootstrap_initializes_enables_starts_then_creates_role() {
        let runner = Arc::new(RecordingRunner::new());
        let d = FedoraDriver::new(BaseDriver::new(runner.clone(), ExecPolicy::default()));

        let outcomes = d.bootstrap_database_engine("media").await.expect("bootstrap");
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(CommandOutcome::is_success));
        assert_eq!(
            runner.calls(),
            vec![
                "postgresql-setup --initdb --unit postgresql",
                "systemctl enable postgresql",
                "systemctl start postgresql",
                "su - postgres -c createuser -s media",
            ]
        );
        assert_eq!(d.managed_engine_service(), Some("postgresql"));
    }

    #[tokio::test]
    async fn initdb_failure_does_not_stop_role_creation() {
        let runner = Arc::new(RecordingRunner::failing(&["postgresql-setup"]));
        let d = FedoraDriver::new(BaseDriver::new(runner.clone(), ExecPolicy::default()));
        let outcomes = d.bootstrap_database_engine("media").await.expect("best effort");
        assert!(!outcomes[0].is_success());
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn dnf_invocation_includes_xlsxwriter_pin() {
        let runner = Arc::new(RecordingRunner::new());
        let d = FedoraDriver::new(BaseDriver::new(runner.clone(), ExecPolicy::default()));
        d.install_os_packages(&["mediainfo".to_string()]).await.expect("dnf");
        d.install_runtime_packages(&d.packages().runtime_packages())
            .await
            .expect("pip");
        assert_eq!(
            runner.calls(),
            vec![
                "dnf install -y -q mediainfo",
                "pip3 install -q XlsxWriter==0.9.3 mutagen==1.41.1 pytaglib==1.4.4",
            ]
        );
    }
}
