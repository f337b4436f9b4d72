//! Role quota reads and writes.

use tracing::{error, info};

use convoy_core::{Quota, SessionKey};

use crate::api::SchedulerApi;
use crate::error::{ClientError, ClientResult};
use crate::validate::{checked, validate};

pub struct QuotaManager<'a> {
    client: &'a dyn SchedulerApi,
}

impl<'a> QuotaManager<'a> {
    pub fn new(client: &'a dyn SchedulerApi) -> Self {
        Self { client }
    }

    pub fn get_quota(&self, role: &str) -> ClientResult<Quota> {
        let resp = checked(self.client.get_quota(role)?)?;
        resp.quota.ok_or_else(|| ClientError::Transport {
            method: "getQuota".to_string(),
            reason: "response carried no quota".to_string(),
        })
    }

    pub fn set_quota(&self, role: &str, quota: &Quota, session: &SessionKey) -> ClientResult<()> {
        info!(%role, cpus = quota.num_cpus, ram_mb = quota.ram_mb, disk_mb = quota.disk_mb, "setting quota");
        let resp = self.client.set_quota(role, quota, session)?;
        validate(&resp)
    }
}

/// Parse raw command-line quota values, logging the first bad one.
pub fn parse_quota_args(cpu: &str, ram_mb: &str, disk_mb: &str) -> ClientResult<Quota> {
    parse_quota(cpu, ram_mb, disk_mb).inspect_err(|e| error!("Invalid value: {e}"))
}

pub fn parse_quota(cpu: &str, ram_mb: &str, disk_mb: &str) -> ClientResult<Quota> {
    let invalid = |field: &str, value: &str| ClientError::InvalidQuota(format!("{field} = {value:?}"));

    let num_cpus: f64 = cpu.trim().parse().map_err(|_| invalid("cpu", cpu))?;
    if !num_cpus.is_finite() || num_cpus < 0.0 {
        return Err(invalid("cpu", cpu));
    }
    let ram_mb = ram_mb.trim().parse().map_err(|_| invalid("ram_mb", ram_mb))?;
    let disk_mb = disk_mb.trim().parse().map_err(|_| invalid("disk_mb", disk_mb))?;

    Ok(Quota {
        num_cpus,
        ram_mb,
        disk_mb,
    })
}

/// Render a quota the way `get_quota` prints it.
pub fn format_quota(role: &str, quota: &Quota) -> String {
    format!(
        "Quota for {role}:\n\tCPU\t{}\n\tRAM\t{:.6} GB\n\tDisk\t{:.6} GB",
        quota.num_cpus,
        quota.ram_mb as f64 / 1024.0,
        quota.disk_mb as f64 / 1024.0,
    )
}
