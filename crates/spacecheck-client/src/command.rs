//! Platform CLI backed implementation of the collaborator traits.
//!
//! `CommandClient` drives the cluster platform through its command-line
//! binary, one subcommand per provisioning operation. Structured documents
//! (status, space listing) are requested with `--format json` and decoded
//! with serde. Remote execution goes through the platform's `ssh` subcommand.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::traits::{
    ProvisioningClient, RemoteExec, SpaceListing, StatusSnapshot, UnitStatus, WorkloadStatus,
};

const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(1200);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Collaborator client that shells out to the platform CLI.
#[derive(Debug, Clone)]
pub struct CommandClient {
    binary: String,
    model: Option<String>,
    status_timeout: Duration,
    poll_interval: Duration,
}

impl CommandClient {
    /// Create a client around the given platform binary (e.g. `juju`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: None,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Target a named model/environment instead of the default one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the status-wait deadline.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Override the status polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one platform subcommand and return its stdout.
    async fn exec(&self, args: &[&str]) -> ClientResult<String> {
        let mut full_args: Vec<&str> = Vec::new();
        if let Some(model) = &self.model {
            full_args.push("-m");
            full_args.push(model);
        }
        full_args.extend_from_slice(args);

        let rendered = format!("{} {}", self.binary, full_args.join(" "));
        debug!(command = %rendered, "exec");

        let child = Command::new(&self.binary)
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ClientError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClientError::CommandFailed {
                command: rendered,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn status(&self) -> ClientResult<StatusSnapshot> {
        let raw = self.exec(&["status", "--format", "json"]).await?;
        parse_status_doc(&raw)
    }
}

#[async_trait]
impl ProvisioningClient for CommandClient {
    async fn create_space(&self, name: &str) -> ClientResult<()> {
        self.exec(&["add-space", name]).await.map(|_| ())
    }

    async fn add_subnet(&self, cidr: &str, space: &str) -> ClientResult<()> {
        self.exec(&["add-subnet", cidr, space]).await.map(|_| ())
    }

    async fn deploy(&self, charm: &str, workload: &str, space: &str) -> ClientResult<()> {
        let constraint = format!("spaces={space}");
        self.exec(&["deploy", charm, workload, "--constraints", &constraint])
            .await
            .map(|_| ())
    }

    async fn add_unit(&self, workload: &str) -> ClientResult<()> {
        self.exec(&["add-unit", workload]).await.map(|_| ())
    }

    async fn wait_until_running(&self) -> ClientResult<StatusSnapshot> {
        let started = Instant::now();
        loop {
            let snapshot = self.status().await?;
            if snapshot.unit_count() > 0 && snapshot.all_started() {
                return Ok(snapshot);
            }
            if started.elapsed() > self.status_timeout {
                return Err(ClientError::Timeout {
                    what: "all units to report started".to_string(),
                    seconds: self.status_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn list_spaces(&self) -> ClientResult<SpaceListing> {
        let raw = self.exec(&["spaces", "--format", "json"]).await?;
        parse_space_doc(&raw)
    }

    async fn bootstrap(&self) -> ClientResult<()> {
        self.exec(&["bootstrap"]).await.map(|_| ())
    }

    async fn destroy_environment(&self) -> ClientResult<()> {
        self.exec(&["destroy-environment", "--yes"]).await.map(|_| ())
    }

    async fn clean_environment(&self) -> ClientResult<bool> {
        // An unreachable environment is reported as unusable, not an error;
        // the caller is expected to bootstrap a fresh one.
        let snapshot = match self.status().await {
            Ok(snapshot) => snapshot,
            Err(_) => return Ok(false),
        };

        for workload in snapshot.workloads.keys() {
            self.exec(&["remove-application", workload]).await?;
        }

        let started = Instant::now();
        loop {
            let snapshot = self.status().await?;
            if snapshot.unit_count() == 0 {
                return Ok(true);
            }
            if started.elapsed() > self.status_timeout {
                return Err(ClientError::Timeout {
                    what: "environment to drain".to_string(),
                    seconds: self.status_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl RemoteExec for CommandClient {
    async fn run(&self, machine_id: &str, command: &str) -> ClientResult<String> {
        self.exec(&["ssh", machine_id, command]).await
    }
}

// ---------------------------------------------------------------------------
// Wire documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StatusDoc {
    #[serde(default)]
    applications: BTreeMap<String, ApplicationDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationDoc {
    #[serde(default)]
    units: BTreeMap<String, UnitDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct UnitDoc {
    #[serde(default)]
    machine: String,
    #[serde(rename = "agent-status", default)]
    agent_status: AgentStatusDoc,
}

#[derive(Debug, Default, Deserialize)]
struct AgentStatusDoc {
    #[serde(default)]
    current: String,
}

#[derive(Debug, Deserialize)]
struct SpaceDoc {
    #[serde(default)]
    spaces: SpaceListing,
}

fn parse_status_doc(raw: &str) -> ClientResult<StatusSnapshot> {
    let doc: StatusDoc =
        serde_json::from_str(raw).map_err(|e| ClientError::MalformedDocument {
            document: "status".to_string(),
            reason: e.to_string(),
        })?;

    let mut workloads = BTreeMap::new();
    for (name, app) in doc.applications {
        let mut status = WorkloadStatus::default();
        for (unit_id, unit) in app.units {
            status.units.insert(
                unit_id,
                UnitStatus {
                    machine: unit.machine,
                    started: agent_started(&unit.agent_status.current),
                },
            );
        }
        workloads.insert(name, status);
    }
    Ok(StatusSnapshot { workloads })
}

fn parse_space_doc(raw: &str) -> ClientResult<SpaceListing> {
    let doc: SpaceDoc = serde_json::from_str(raw).map_err(|e| ClientError::MalformedDocument {
        document: "spaces".to_string(),
        reason: e.to_string(),
    })?;
    Ok(doc.spaces)
}

fn agent_started(current: &str) -> bool {
    matches!(current, "started" | "idle" | "active" | "executing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_captures_stdout() {
        // `echo` stands in for the platform binary; arguments echo back.
        let client = CommandClient::new("echo");
        let out = client.run("3", "ip -o addr").await.expect("run failed");
        assert_eq!(out.trim(), "ssh 3 ip -o addr");
    }

    #[tokio::test]
    async fn test_exec_model_flag_prepended() {
        let client = CommandClient::new("echo").with_model("staging");
        let out = client.run("0", "hostname").await.expect("run failed");
        assert_eq!(out.trim(), "-m staging ssh 0 hostname");
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_is_error() {
        let client = CommandClient::new("false");
        let err = client.run("0", "hostname").await.unwrap_err();
        match err {
            ClientError::CommandFailed { code, .. } => assert_ne!(code, 0),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_missing_binary_is_spawn_error() {
        let client = CommandClient::new("spacecheck-no-such-binary");
        let err = client.run("0", "hostname").await.unwrap_err();
        assert!(matches!(err, ClientError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_until_running_times_out_on_pending_unit() {
        use std::os::unix::fs::PermissionsExt;

        // Stub platform binary whose status output never reaches started.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stub-cli");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"applications\": {\"mysql\": {\"units\": {\"mysql/0\": \
             {\"machine\": \"1\", \"agent-status\": {\"current\": \"pending\"}}}}}}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = CommandClient::new(script.to_string_lossy())
            .with_status_timeout(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10));
        let err = client.wait_until_running().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
    }

    #[test]
    fn test_parse_status_doc() {
        let raw = r#"{
            "applications": {
                "haproxy": {
                    "units": {
                        "haproxy/0": {
                            "machine": "1",
                            "agent-status": {"current": "started"}
                        }
                    }
                },
                "mysql": {
                    "units": {
                        "mysql/0": {
                            "machine": "2",
                            "agent-status": {"current": "pending"}
                        }
                    }
                }
            }
        }"#;
        let snapshot = parse_status_doc(raw).expect("parse failed");
        assert_eq!(snapshot.unit_count(), 2);
        assert!(!snapshot.all_started());
        assert_eq!(snapshot.workloads["haproxy"].units["haproxy/0"].machine, "1");
    }

    #[test]
    fn test_parse_status_doc_rejects_garbage() {
        let err = parse_status_doc("not json").unwrap_err();
        assert!(matches!(err, ClientError::MalformedDocument { .. }));
    }

    #[test]
    fn test_parse_space_doc() {
        let raw = r#"{"spaces": {"dmz": ["10.0.1.0/24", "10.0.5.0/24"], "apps": []}}"#;
        let spaces = parse_space_doc(raw).expect("parse failed");
        assert_eq!(spaces["dmz"], vec!["10.0.1.0/24", "10.0.5.0/24"]);
        assert!(spaces["apps"].is_empty());
    }
}
