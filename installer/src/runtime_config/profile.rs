// Host resource profile (CPU count, physical memory)

use log::{debug, warn};
use std::path::PathBuf;

use crate::error::InstallerError;
use crate::installation::linux::{
    meminfo_total_bytes, online_cpu_count, physical_memory_bytes, MEMINFO_PATH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceProfile {
    pub cpu_count: u64,
    pub physical_memory_bytes: u64,
}

impl ResourceProfile {
    /// Both facts must be at least 1.
    pub fn new(cpu_count: u64, physical_memory_bytes: u64) -> Result<Self, InstallerError> {
        if cpu_count == 0 {
            return Err(InstallerError::HostFacts("CPU count is zero".to_string()));
        }
        if physical_memory_bytes == 0 {
            return Err(InstallerError::HostFacts(
                "physical memory size is zero".to_string(),
            ));
        }
        Ok(Self {
            cpu_count,
            physical_memory_bytes,
        })
    }
}

pub trait HostProfiler: Send + Sync {
    fn profile(&self) -> Result<ResourceProfile, InstallerError>;
}

/// Reads the running host through sysconf, falling back to meminfo for memory.
#[derive(Debug, Clone)]
pub struct LiveHostProfiler {
    pub meminfo_path: PathBuf,
}

impl Default for LiveHostProfiler {
    fn default() -> Self {
        Self {
            meminfo_path: PathBuf::from(MEMINFO_PATH),
        }
    }
}

impl HostProfiler for LiveHostProfiler {
    fn profile(&self) -> Result<ResourceProfile, InstallerError> {
        let cpu = online_cpu_count().ok_or_else(|| {
            InstallerError::HostFacts("online CPU count unavailable".to_string())
        })?;

        let memory = match physical_memory_bytes() {
            Some(m) => m,
            None => {
                warn!(
                    "[PHASE: preflight] [STEP: profile] sysconf memory query failed; reading {:?}",
                    self.meminfo_path
                );
                meminfo_total_bytes(&self.meminfo_path).ok_or_else(|| {
                    InstallerError::HostFacts(format!(
                        "physical memory unavailable (sysconf and {})",
                        self.meminfo_path.display()
                    ))
                })?
            }
        };

        let profile = ResourceProfile::new(cpu, memory)?;
        debug!(
            "[PHASE: preflight] [STEP: profile] Host profile (cpu_count={}, physical_memory_bytes={})",
            profile.cpu_count, profile.physical_memory_bytes
        );
        Ok(profile)
    }
}
