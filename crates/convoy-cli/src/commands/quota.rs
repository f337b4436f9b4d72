//! `get_quota` and `set_quota`.

use convoy_client::{QuotaManager, format_quota, parse_quota_args};

use super::Context;
use crate::{RoleArgs, SetQuotaArgs};

pub fn get_quota(ctx: &mut Context, args: &RoleArgs) -> anyhow::Result<()> {
    let client = ctx.session.client()?;
    let quota = QuotaManager::new(client.as_ref()).get_quota(&args.role)?;
    println!("{}", format_quota(&args.role, &quota));
    Ok(())
}

/// Values are checked before anything is signed or connected.
pub fn set_quota(ctx: &mut Context, args: &SetQuotaArgs) -> anyhow::Result<()> {
    let quota = parse_quota_args(&args.cpu, &args.ram_mb, &args.disk_mb)?;

    let key = ctx.auth.acquire_session()?;
    let client = ctx.session.client()?;
    QuotaManager::new(client.as_ref()).set_quota(&args.role, &quota, &key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_client::ClientError;
    use convoy_client::testing::Call;
    use convoy_core::Quota;

    use crate::commands::testing::{context, Harness};

    fn set_args(cpu: &str) -> SetQuotaArgs {
        SetQuotaArgs {
            role: "eng".to_string(),
            cpu: cpu.to_string(),
            ram_mb: "4096".to_string(),
            disk_mb: "10240".to_string(),
        }
    }

    fn invalid_quota(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<ClientError>(), Some(ClientError::InvalidQuota(_)))
    }

    #[test]
    fn set_quota_with_bad_cpu_sends_nothing() {
        let Harness { mut ctx, scheduler, .. } = context(Some("localhost:1234"));

        let err = set_quota(&mut ctx, &set_args("abc")).unwrap_err();

        assert!(invalid_quota(&err));
        assert!(scheduler.methods().is_empty());
        assert!(scheduler.sessions().is_empty());
    }

    #[test]
    fn bad_value_is_reported_before_cluster_resolution() {
        let Harness { mut ctx, scheduler, connector, .. } = context(None);

        let err = set_quota(&mut ctx, &set_args("abc")).unwrap_err();

        assert!(invalid_quota(&err), "unexpected error: {err:#}");
        assert!(connector.specs().is_empty());
        assert!(scheduler.methods().is_empty());
    }

    #[test]
    fn set_quota_is_signed() {
        let Harness { mut ctx, scheduler, .. } = context(Some("localhost:1234"));

        set_quota(&mut ctx, &set_args("2.5")).unwrap();

        assert_eq!(
            scheduler.calls(),
            vec![Call::SetQuota {
                role: "eng".to_string(),
                quota: Quota {
                    num_cpus: 2.5,
                    ram_mb: 4096,
                    disk_mb: 10240,
                },
            }]
        );
        assert_eq!(scheduler.sessions().len(), 1);
    }

    #[test]
    fn get_quota_reads_role() {
        let Harness { mut ctx, scheduler, .. } = context(Some("localhost:1234"));

        get_quota(
            &mut ctx,
            &RoleArgs {
                role: "eng".to_string(),
            },
        )
        .unwrap();

        assert_eq!(scheduler.methods(), vec!["getQuota"]);
    }
}
