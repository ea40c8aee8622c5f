//! Collaborator trait definitions for spacecheck.
//!
//! Two contracts sit between the verification core and the cluster platform:
//! - `ProvisioningClient`: issues space/subnet/deploy commands and reads the
//!   deployment status back.
//! - `RemoteExec`: runs a command on a deployed machine and returns its text
//!   output (used for `ip -o addr`-style interface probes).
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// Space listing as returned by the platform: space name to its CIDR list.
pub type SpaceListing = BTreeMap<String, Vec<String>>;

/// Status of a single running unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Identifier of the machine hosting this unit.
    pub machine: String,
    /// Whether the unit agent has reported started.
    pub started: bool,
}

/// Status of a single workload and its units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Units keyed by unit id (`<workload>/<index>`).
    pub units: BTreeMap<String, UnitStatus>,
}

/// Read-only, point-in-time view of the deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Workloads keyed by workload name.
    pub workloads: BTreeMap<String, WorkloadStatus>,
}

impl StatusSnapshot {
    /// Iterate over every unit across all workloads, in deterministic order.
    pub fn units(&self) -> impl Iterator<Item = (&str, &UnitStatus)> {
        self.workloads
            .values()
            .flat_map(|w| w.units.iter().map(|(id, u)| (id.as_str(), u)))
    }

    /// Total number of units in the snapshot.
    pub fn unit_count(&self) -> usize {
        self.workloads.values().map(|w| w.units.len()).sum()
    }

    /// Whether every unit has reported started.
    pub fn all_started(&self) -> bool {
        self.units().all(|(_, u)| u.started)
    }
}

/// Provisioning operations against the cluster platform.
///
/// All operations are synchronous from the caller's point of view and fail
/// by returning an error on a non-zero / error response from the platform.
/// No retries happen at this layer.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Create a named network space.
    async fn create_space(&self, name: &str) -> ClientResult<()>;

    /// Register a subnet CIDR under an existing space.
    async fn add_subnet(&self, cidr: &str, space: &str) -> ClientResult<()>;

    /// Deploy a workload from `charm`, named `workload`, constrained to `space`.
    async fn deploy(&self, charm: &str, workload: &str, space: &str) -> ClientResult<()>;

    /// Add one unit to an already-deployed workload. Placement constraints
    /// recorded at deploy time must still be honored.
    async fn add_unit(&self, workload: &str) -> ClientResult<()>;

    /// Block until every deployed unit reports started, then return the
    /// status snapshot. Times out per the client's configuration.
    async fn wait_until_running(&self) -> ClientResult<StatusSnapshot>;

    /// Fetch the current space listing (space name -> CIDR list).
    async fn list_spaces(&self) -> ClientResult<SpaceListing>;

    /// Bootstrap a fresh environment.
    async fn bootstrap(&self) -> ClientResult<()>;

    /// Tear the environment down entirely.
    async fn destroy_environment(&self) -> ClientResult<()>;

    /// Remove workloads and machines from an existing environment instead of
    /// destroying it. Returns `false` when the environment was not usable
    /// (the caller should bootstrap a fresh one).
    async fn clean_environment(&self) -> ClientResult<bool>;
}

/// Remote command execution on a deployed machine.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` on `machine_id` and return its stdout as text.
    async fn run(&self, machine_id: &str, command: &str) -> ClientResult<String>;
}
