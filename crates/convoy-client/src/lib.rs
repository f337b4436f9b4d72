//! convoy-client — talking to the cluster scheduler.
//!
//! Resolves a cluster argument to a live scheduler, signs a session key
//! per operation, validates every response, and drives job updates.
//!
//! # Architecture
//!
//! ```text
//! SchedulerSession (one per invocation)
//!   └── ConnectionRouter
//!       ├── LocalityProbe     (prod / corp)
//!       ├── TunnelLookup      (tunnel host per cluster)
//!       └── SchedulerConnector
//!           ├── Discovery     (leader lookup)
//!           └── SchedulerApi  (JSON over HTTPS)
//!
//! UpdateOrchestrator
//!   └── ShardUpdater (RollingShardUpdater)
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod discovery;
pub mod error;
pub mod locality;
pub mod quota;
pub mod router;
pub mod session;
pub mod staging;
pub mod status;
pub mod transport;
pub mod tunnel;
pub mod update;
pub mod updater;
pub mod validate;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use api::{SchedulerApi, SchedulerResponse};
pub use auth::{KeyFileSigner, SessionAuthenticator, SessionSigner};
pub use clock::{Clock, SystemClock};
pub use error::{ClientError, ClientResult};
pub use locality::{HostnameLocality, Locality, LocalityProbe};
pub use quota::{QuotaManager, format_quota, parse_quota_args};
pub use router::{ClientSpec, ConnectionRouter, SchedulerConnector};
pub use session::SchedulerSession;
pub use staging::{ArtifactStager, ProcessShellRunner, RemoteLogin, ShellRunner};
pub use status::TaskStatusReporter;
pub use transport::HttpConnector;
pub use tunnel::RegistryTunnelLookup;
pub use update::{ShardUpdater, UpdateBinding, UpdateOrchestrator, UpdateOutcome, UpdaterFactory};
pub use updater::RollingShardUpdater;
pub use validate::validate;
