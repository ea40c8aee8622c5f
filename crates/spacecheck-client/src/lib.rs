//! spacecheck-client: cluster collaborator layer for spacecheck
//!
//! This crate owns the boundary between the verification core and the
//! cluster platform. It defines the collaborator contracts, a platform-CLI
//! backed implementation, and in-memory fakes for tests.
//!
//! ## Key components
//!
//! - `ProvisioningClient` / `RemoteExec`: async collaborator traits
//! - `CommandClient`: drives the platform CLI via `tokio::process`
//! - `fakes::FakeCluster`: in-memory cluster for deterministic tests

mod command;
mod error;
pub mod fakes;
mod traits;

pub use command::CommandClient;
pub use error::{ClientError, ClientResult};
pub use traits::{
    ProvisioningClient, RemoteExec, SpaceListing, StatusSnapshot, UnitStatus, WorkloadStatus,
};
