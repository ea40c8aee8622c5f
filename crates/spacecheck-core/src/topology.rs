//! Topology collection.
//!
//! Builds the transient [`TopologySnapshot`] for a single verification run:
//! the space listing straight from the provisioning client, plus one observed
//! address per unit from remote interface probes. The snapshot is never
//! persisted and has no lifecycle beyond one check.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::debug;

use spacecheck_client::{ProvisioningClient, RemoteExec, SpaceListing, StatusSnapshot};

use crate::error::Result;

/// Command issued on each machine to list its interfaces.
pub const PROBE_COMMAND: &str = "ip -o addr";

/// Matches `<index>: <ifname> inet <addr>[/<prefix>]` lines in probe output.
const INET_LINE: &str = r"(?m)^\d+:\s+(\w+)\s+inet\s+(\S+)";

fn inet_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INET_LINE).expect("static pattern"))
}

/// The collected, point-in-time view a verification run operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    /// Space name to its registered CIDR list, verbatim from the platform.
    pub spaces: SpaceListing,
    /// Unit id to its single observed non-loopback IPv4 address.
    pub unit_addresses: BTreeMap<String, String>,
    /// Workload name to the space it was constrained to.
    pub expected_spaces: BTreeMap<String, String>,
    /// Total units discovered in the status snapshot. Can exceed
    /// `unit_addresses.len()` when a unit exposed no usable address.
    pub units_found: usize,
}

impl TopologySnapshot {
    /// Build a snapshot from pre-collected parts, taking the discovered-unit
    /// count from the address map itself.
    pub fn new(
        spaces: SpaceListing,
        unit_addresses: BTreeMap<String, String>,
        expected_spaces: BTreeMap<String, String>,
    ) -> Self {
        let units_found = unit_addresses.len();
        Self {
            spaces,
            unit_addresses,
            expected_spaces,
            units_found,
        }
    }
}

/// Addresses observed across the deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedUnits {
    /// Unit id to observed address. Units with only a loopback interface
    /// are absent.
    pub addresses: BTreeMap<String, String>,
    /// Every unit seen in the status snapshot, address or not.
    pub units_found: usize,
}

/// Copy the platform's space listing into the snapshot shape.
pub async fn collect_spaces(client: &dyn ProvisioningClient) -> Result<SpaceListing> {
    Ok(client.list_spaces().await?)
}

/// Probe every unit's machine for its interface listing and record the last
/// non-loopback IPv4 address per unit.
///
/// Probes fan out with at most `concurrency` in flight; the returned map is
/// complete before this function resolves, so the verifier never observes a
/// partially populated view. Probe failures propagate, no retries here.
pub async fn collect_unit_addresses(
    exec: &dyn RemoteExec,
    status: &StatusSnapshot,
    concurrency: usize,
) -> Result<CollectedUnits> {
    let probes: Vec<(String, String)> = status
        .units()
        .map(|(unit, info)| (unit.to_string(), info.machine.clone()))
        .collect();
    let units_found = probes.len();

    let mut results = stream::iter(probes)
        .map(|(unit, machine)| async move {
            let output = exec.run(&machine, PROBE_COMMAND).await?;
            Ok::<_, crate::error::SpaceCheckError>((unit, machine, output))
        })
        .buffer_unordered(concurrency.max(1));

    let mut addresses = BTreeMap::new();
    while let Some(result) = results.next().await {
        let (unit, machine, output) = result?;
        match last_global_inet(&output) {
            Some(address) => {
                debug!(%unit, %machine, %address, "observed address");
                addresses.insert(unit, address);
            }
            None => debug!(%unit, %machine, "no non-loopback address observed"),
        }
    }

    Ok(CollectedUnits {
        addresses,
        units_found,
    })
}

/// Extract the last non-loopback `inet` address from an interface listing.
///
/// Multiple non-loopback matches overwrite earlier ones (last one wins).
/// Multi-homed machines get no stronger guarantee than that.
pub fn last_global_inet(output: &str) -> Option<String> {
    let mut address = None;
    for capture in inet_line_re().captures_iter(output) {
        if &capture[1] != "lo" {
            address = Some(capture[2].to_string());
        }
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacecheck_client::{UnitStatus, WorkloadStatus};

    struct ScriptedExec {
        outputs: BTreeMap<String, String>,
    }

    #[async_trait::async_trait]
    impl RemoteExec for ScriptedExec {
        async fn run(
            &self,
            machine_id: &str,
            _command: &str,
        ) -> spacecheck_client::ClientResult<String> {
            self.outputs
                .get(machine_id)
                .cloned()
                .ok_or(spacecheck_client::ClientError::CommandFailed {
                    command: "ssh".to_string(),
                    code: 1,
                    stderr: "no such machine".to_string(),
                })
        }
    }

    fn status_of(units: &[(&str, &str)]) -> StatusSnapshot {
        let mut workloads: BTreeMap<String, WorkloadStatus> = BTreeMap::new();
        for (unit, machine) in units {
            let workload = unit.split('/').next().unwrap().to_string();
            workloads.entry(workload).or_default().units.insert(
                unit.to_string(),
                UnitStatus {
                    machine: machine.to_string(),
                    started: true,
                },
            );
        }
        StatusSnapshot { workloads }
    }

    #[test]
    fn test_last_global_inet_skips_loopback() {
        let output = "1: lo    inet 127.0.0.1/8 scope host lo\n\
                      2: eth0    inet 10.0.1.5/24 brd 10.0.1.255 scope global eth0\n";
        assert_eq!(last_global_inet(output), Some("10.0.1.5/24".to_string()));
    }

    #[test]
    fn test_last_global_inet_loopback_only_is_none() {
        let output = "1: lo    inet 127.0.0.1/8 scope host lo\n";
        assert_eq!(last_global_inet(output), None);
    }

    #[test]
    fn test_last_global_inet_last_write_wins() {
        let output = "1: lo    inet 127.0.0.1/8 scope host lo\n\
                      2: eth0    inet 10.0.1.5/24 scope global eth0\n\
                      3: eth1    inet 10.0.2.9/24 scope global eth1\n";
        assert_eq!(last_global_inet(output), Some("10.0.2.9/24".to_string()));
    }

    #[test]
    fn test_last_global_inet_ignores_unrelated_lines() {
        let output = "garbage\n2: eth0    link/ether aa:bb:cc:dd:ee:ff\n";
        assert_eq!(last_global_inet(output), None);
    }

    #[tokio::test]
    async fn test_collect_unit_addresses_maps_units() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "1".to_string(),
            "1: lo    inet 127.0.0.1/8\n2: eth0    inet 10.0.1.5/24\n".to_string(),
        );
        outputs.insert(
            "2".to_string(),
            "1: lo    inet 127.0.0.1/8\n2: eth0    inet 10.0.3.7/24\n".to_string(),
        );
        let exec = ScriptedExec { outputs };
        let status = status_of(&[("haproxy/0", "1"), ("mysql/0", "2")]);

        let collected = collect_unit_addresses(&exec, &status, 4).await.unwrap();
        assert_eq!(collected.units_found, 2);
        assert_eq!(collected.addresses["haproxy/0"], "10.0.1.5/24");
        assert_eq!(collected.addresses["mysql/0"], "10.0.3.7/24");
    }

    #[tokio::test]
    async fn test_collect_counts_loopback_only_units() {
        let mut outputs = BTreeMap::new();
        outputs.insert("1".to_string(), "1: lo    inet 127.0.0.1/8\n".to_string());
        let exec = ScriptedExec { outputs };
        let status = status_of(&[("haproxy/0", "1")]);

        let collected = collect_unit_addresses(&exec, &status, 1).await.unwrap();
        assert_eq!(collected.units_found, 1);
        assert!(collected.addresses.is_empty());
    }

    #[tokio::test]
    async fn test_collect_propagates_probe_failure() {
        let exec = ScriptedExec {
            outputs: BTreeMap::new(),
        };
        let status = status_of(&[("haproxy/0", "1")]);
        assert!(collect_unit_addresses(&exec, &status, 1).await.is_err());
    }
}
