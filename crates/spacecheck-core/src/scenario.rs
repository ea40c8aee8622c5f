//! Scenario declaration and provisioning orchestration.
//!
//! A [`Scenario`] declares the intended topology: spaces with their subnets,
//! workloads with their space constraints, and which workloads to scale out
//! after the initial deploy. [`run_check`] drives the full cycle: provision,
//! collect, verify.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use spacecheck_client::{ProvisioningClient, RemoteExec, StatusSnapshot};

use crate::error::{Result, SpaceCheckError};
use crate::topology::{collect_spaces, collect_unit_addresses, TopologySnapshot};
use crate::verify::verify_membership;

/// Declared constraints for one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Charm (or image) to deploy from. Defaults to the workload name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charm: Option<String>,
    /// Space this workload's units must be constrained to.
    pub space: String,
}

/// A workload spec with its charm default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWorkload {
    pub charm: String,
    pub space: String,
}

/// Declarative topology intent for one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Space name to the subnet CIDRs to register under it.
    pub spaces: BTreeMap<String, Vec<String>>,
    /// Workload name to its constraints.
    pub workloads: BTreeMap<String, WorkloadSpec>,
    /// Workloads that get one extra unit after deployment, to confirm
    /// constraints persist across scale-out.
    #[serde(default)]
    pub scale_out: Vec<String>,
}

impl Scenario {
    /// The fixed reference topology: four spaces with two subnets each, five
    /// workloads spread across them, and two scale-outs.
    pub fn reference() -> Self {
        let mut spaces = BTreeMap::new();
        spaces.insert(
            "apps".to_string(),
            vec!["10.0.2.0/24".to_string(), "10.0.6.0/24".to_string()],
        );
        spaces.insert(
            "backend".to_string(),
            vec!["10.0.3.0/24".to_string(), "10.0.7.0/24".to_string()],
        );
        spaces.insert(
            "default".to_string(),
            vec!["10.0.0.0/24".to_string(), "10.0.4.0/24".to_string()],
        );
        spaces.insert(
            "dmz".to_string(),
            vec!["10.0.1.0/24".to_string(), "10.0.5.0/24".to_string()],
        );

        let mut workloads = BTreeMap::new();
        workloads.insert(
            "haproxy".to_string(),
            WorkloadSpec {
                charm: None,
                space: "dmz".to_string(),
            },
        );
        workloads.insert(
            "mediawiki".to_string(),
            WorkloadSpec {
                charm: None,
                space: "apps".to_string(),
            },
        );
        workloads.insert(
            "memcached".to_string(),
            WorkloadSpec {
                charm: None,
                space: "apps".to_string(),
            },
        );
        workloads.insert(
            "mysql".to_string(),
            WorkloadSpec {
                charm: None,
                space: "backend".to_string(),
            },
        );
        workloads.insert(
            "mysql-slave".to_string(),
            WorkloadSpec {
                charm: Some("mysql".to_string()),
                space: "backend".to_string(),
            },
        );

        Scenario {
            spaces,
            workloads,
            scale_out: vec!["mysql-slave".to_string(), "mediawiki".to_string()],
        }
    }

    /// Every workload (and scale-out entry) must reference declared state.
    pub fn validate(&self) -> Result<()> {
        for (workload, spec) in &self.workloads {
            if !self.spaces.contains_key(&spec.space) {
                return Err(SpaceCheckError::UndeclaredSpace {
                    workload: workload.clone(),
                    space: spec.space.clone(),
                });
            }
        }
        for name in &self.scale_out {
            if !self.workloads.contains_key(name) {
                return Err(SpaceCheckError::UnknownWorkload {
                    unit: name.clone(),
                    workload: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Pure derivation of workload specs with charm defaults filled in.
    /// The scenario itself is never mutated.
    pub fn normalized(&self) -> BTreeMap<String, NormalizedWorkload> {
        self.workloads
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    NormalizedWorkload {
                        charm: spec.charm.clone().unwrap_or_else(|| name.clone()),
                        space: spec.space.clone(),
                    },
                )
            })
            .collect()
    }

    /// Workload name to its declared space, as the verifier consumes it.
    pub fn expected_spaces(&self) -> BTreeMap<String, String> {
        self.workloads
            .iter()
            .map(|(name, spec)| (name.clone(), spec.space.clone()))
            .collect()
    }

    /// Issue all provisioning commands and wait for the deployment to run.
    ///
    /// Spaces and workloads are created in name order (BTreeMap iteration)
    /// so command sequences are deterministic across runs.
    pub async fn provision(&self, client: &dyn ProvisioningClient) -> Result<StatusSnapshot> {
        self.validate()?;

        for (space, cidrs) in &self.spaces {
            info!(%space, "creating space");
            client.create_space(space).await?;
            for cidr in cidrs {
                client.add_subnet(cidr, space).await?;
            }
        }

        for (workload, spec) in &self.normalized() {
            info!(%workload, charm = %spec.charm, space = %spec.space, "deploying");
            client.deploy(&spec.charm, workload, &spec.space).await?;
        }

        // Scale-outs carry no explicit constraint; the platform must honor
        // the one recorded at deploy time.
        for workload in &self.scale_out {
            info!(%workload, "adding unit");
            client.add_unit(workload).await?;
        }

        Ok(client.wait_until_running().await?)
    }
}

/// Full verification cycle: provision the scenario, collect the topology,
/// verify membership. Returns the matched-unit count.
pub async fn run_check(
    client: &dyn ProvisioningClient,
    exec: &dyn RemoteExec,
    scenario: &Scenario,
    probe_concurrency: usize,
) -> Result<usize> {
    let status = scenario.provision(client).await?;
    info!(units = status.unit_count(), "deployment running");

    let spaces = collect_spaces(client).await?;
    let collected = collect_unit_addresses(exec, &status, probe_concurrency).await?;

    let snapshot = TopologySnapshot {
        spaces,
        unit_addresses: collected.addresses,
        expected_spaces: scenario.expected_spaces(),
        units_found: collected.units_found,
    };

    let matched = verify_membership(&snapshot)?;
    info!(matched, "all unit addresses verified against their declared spaces");
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scenario_is_valid() {
        Scenario::reference().validate().expect("reference invalid");
    }

    #[test]
    fn test_normalized_fills_charm_default_without_mutation() {
        let scenario = Scenario::reference();
        let normalized = scenario.normalized();

        assert_eq!(normalized["haproxy"].charm, "haproxy");
        assert_eq!(normalized["mysql-slave"].charm, "mysql");
        // Caller-supplied declaration is untouched.
        assert_eq!(scenario.workloads["haproxy"].charm, None);
    }

    #[test]
    fn test_validate_rejects_undeclared_space() {
        let mut scenario = Scenario::reference();
        scenario.workloads.insert(
            "rogue".to_string(),
            WorkloadSpec {
                charm: None,
                space: "nowhere".to_string(),
            },
        );
        assert!(matches!(
            scenario.validate().unwrap_err(),
            SpaceCheckError::UndeclaredSpace { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_scale_out() {
        let mut scenario = Scenario::reference();
        scenario.scale_out.push("ghost".to_string());
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_expected_spaces_matches_declaration() {
        let expected = Scenario::reference().expected_spaces();
        assert_eq!(expected["haproxy"], "dmz");
        assert_eq!(expected["mysql-slave"], "backend");
        assert_eq!(expected.len(), 5);
    }

    #[test]
    fn test_scenario_serde_round_trip() {
        let scenario = Scenario::reference();
        let json = serde_json::to_string(&scenario).expect("serialize");
        let back: Scenario = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(scenario, back);
    }
}
