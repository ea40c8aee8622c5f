//! In-memory fakes for the collaborator traits (testing only)
//!
//! `FakeCluster` satisfies both `ProvisioningClient` and `RemoteExec` without
//! touching a real platform. Units deployed into a space are handed addresses
//! from a caller-supplied per-space pool, and machine probes synthesize
//! `ip -o addr`-style listings (always including a loopback line). Every
//! command is appended to a journal so tests can assert issue order.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ClientError, ClientResult};
use crate::traits::{
    ProvisioningClient, RemoteExec, SpaceListing, StatusSnapshot, UnitStatus, WorkloadStatus,
};

#[derive(Debug, Default)]
struct FakeState {
    spaces: SpaceListing,
    pools: BTreeMap<String, Vec<String>>,
    workload_space: BTreeMap<String, String>,
    unit_machines: BTreeMap<String, String>,
    machine_addresses: BTreeMap<String, Option<String>>,
    unit_counts: BTreeMap<String, u32>,
    next_machine: u32,
    journal: Vec<String>,
    bootstrapped: bool,
}

/// In-memory cluster for tests.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue addresses to hand out to units constrained to `space`, in order.
    /// A unit deployed into a space with an exhausted (or absent) pool ends
    /// up with only a loopback interface.
    pub fn with_pool(self, space: &str, addresses: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .pools
                .entry(space.to_string())
                .or_default()
                .extend(addresses.iter().map(|a| a.to_string()));
        }
        self
    }

    /// Commands issued so far, in order.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    fn fail(command: &str, stderr: &str) -> ClientError {
        ClientError::CommandFailed {
            command: command.to_string(),
            code: 1,
            stderr: stderr.to_string(),
        }
    }
}

fn spawn_unit(state: &mut FakeState, workload: &str) -> ClientResult<()> {
    let space = state
        .workload_space
        .get(workload)
        .cloned()
        .ok_or_else(|| FakeCluster::fail("add-unit", "workload not deployed"))?;

    let index = {
        let count = state.unit_counts.entry(workload.to_string()).or_insert(0);
        let index = *count;
        *count += 1;
        index
    };

    state.next_machine += 1;
    let machine = state.next_machine.to_string();
    let address = state
        .pools
        .get_mut(&space)
        .and_then(|pool| if pool.is_empty() { None } else { Some(pool.remove(0)) });

    state
        .unit_machines
        .insert(format!("{workload}/{index}"), machine.clone());
    state.machine_addresses.insert(machine, address);
    Ok(())
}

#[async_trait]
impl ProvisioningClient for FakeCluster {
    async fn create_space(&self, name: &str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("add-space {name}"));
        state.spaces.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn add_subnet(&self, cidr: &str, space: &str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("add-subnet {cidr} {space}"));
        match state.spaces.get_mut(space) {
            Some(cidrs) => {
                cidrs.push(cidr.to_string());
                Ok(())
            }
            None => Err(Self::fail("add-subnet", "no such space")),
        }
    }

    async fn deploy(&self, charm: &str, workload: &str, space: &str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .journal
            .push(format!("deploy {charm} {workload} --constraints spaces={space}"));
        if !state.spaces.contains_key(space) {
            return Err(Self::fail("deploy", "no such space"));
        }
        state
            .workload_space
            .insert(workload.to_string(), space.to_string());
        spawn_unit(&mut state, workload)
    }

    async fn add_unit(&self, workload: &str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("add-unit {workload}"));
        spawn_unit(&mut state, workload)
    }

    async fn wait_until_running(&self) -> ClientResult<StatusSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("wait-until-running".to_string());

        let mut workloads: BTreeMap<String, WorkloadStatus> = BTreeMap::new();
        for (unit_id, machine) in &state.unit_machines {
            let workload = unit_id.split('/').next().unwrap_or(unit_id).to_string();
            workloads.entry(workload).or_default().units.insert(
                unit_id.clone(),
                UnitStatus {
                    machine: machine.clone(),
                    started: true,
                },
            );
        }
        Ok(StatusSnapshot { workloads })
    }

    async fn list_spaces(&self) -> ClientResult<SpaceListing> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("spaces".to_string());
        Ok(state.spaces.clone())
    }

    async fn bootstrap(&self) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("bootstrap".to_string());
        state.bootstrapped = true;
        Ok(())
    }

    async fn destroy_environment(&self) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("destroy-environment".to_string());
        state.spaces.clear();
        state.workload_space.clear();
        state.unit_machines.clear();
        state.machine_addresses.clear();
        state.unit_counts.clear();
        state.next_machine = 0;
        state.bootstrapped = false;
        Ok(())
    }

    async fn clean_environment(&self) -> ClientResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("clean-environment".to_string());
        if !state.bootstrapped {
            return Ok(false);
        }
        state.workload_space.clear();
        state.unit_machines.clear();
        state.machine_addresses.clear();
        state.unit_counts.clear();
        Ok(true)
    }
}

#[async_trait]
impl RemoteExec for FakeCluster {
    async fn run(&self, machine_id: &str, command: &str) -> ClientResult<String> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(format!("ssh {machine_id} {command}"));

        let address = state
            .machine_addresses
            .get(machine_id)
            .cloned()
            .ok_or_else(|| Self::fail("ssh", "no such machine"))?;

        let mut listing = String::from("1: lo    inet 127.0.0.1/8 scope host lo\n");
        if let Some(addr) = address {
            listing.push_str(&format!(
                "2: eth0    inet {addr}/24 brd 10.0.255.255 scope global eth0\n"
            ));
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deploy_hands_out_pool_addresses_in_order() {
        let cluster = FakeCluster::new().with_pool("dmz", &["10.0.1.5", "10.0.1.6"]);
        cluster.create_space("dmz").await.unwrap();
        cluster.deploy("haproxy", "haproxy", "dmz").await.unwrap();
        cluster.add_unit("haproxy").await.unwrap();

        let status = cluster.wait_until_running().await.unwrap();
        assert_eq!(status.unit_count(), 2);

        let first = cluster.run("1", "ip -o addr").await.unwrap();
        let second = cluster.run("2", "ip -o addr").await.unwrap();
        assert!(first.contains("inet 10.0.1.5/24"));
        assert!(second.contains("inet 10.0.1.6/24"));
    }

    #[tokio::test]
    async fn test_exhausted_pool_leaves_only_loopback() {
        let cluster = FakeCluster::new();
        cluster.create_space("apps").await.unwrap();
        cluster.deploy("memcached", "memcached", "apps").await.unwrap();

        let listing = cluster.run("1", "ip -o addr").await.unwrap();
        assert!(listing.contains("lo"));
        assert!(!listing.contains("eth0"));
    }

    #[tokio::test]
    async fn test_deploy_to_unknown_space_fails() {
        let cluster = FakeCluster::new();
        let err = cluster.deploy("mysql", "mysql", "backend").await.unwrap_err();
        assert!(matches!(err, ClientError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_add_unit_honors_original_constraint() {
        let cluster = FakeCluster::new().with_pool("backend", &["10.0.3.4", "10.0.3.9"]);
        cluster.create_space("backend").await.unwrap();
        cluster.deploy("mysql", "mysql-slave", "backend").await.unwrap();
        // Scale-out carries no explicit constraint but must reuse the pool
        // of the space recorded at deploy time.
        cluster.add_unit("mysql-slave").await.unwrap();

        let listing = cluster.run("2", "ip -o addr").await.unwrap();
        assert!(listing.contains("inet 10.0.3.9/24"));
    }

    #[tokio::test]
    async fn test_journal_records_commands_in_order() {
        let cluster = FakeCluster::new();
        cluster.create_space("dmz").await.unwrap();
        cluster.add_subnet("10.0.1.0/24", "dmz").await.unwrap();
        cluster.deploy("haproxy", "haproxy", "dmz").await.unwrap();

        let journal = cluster.journal();
        assert_eq!(
            journal,
            vec![
                "add-space dmz",
                "add-subnet 10.0.1.0/24 dmz",
                "deploy haproxy haproxy --constraints spaces=dmz",
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_environment_requires_bootstrap() {
        let cluster = FakeCluster::new();
        assert!(!cluster.clean_environment().await.unwrap());
        cluster.bootstrap().await.unwrap();
        assert!(cluster.clean_environment().await.unwrap());
    }
}
