//! spacecheck - network-space verification for cluster deployments
//!
//! The `spacecheck` command provisions network spaces and subnets, deploys
//! workloads constrained to those spaces, and verifies that every unit's
//! observed address falls inside the subnets of its declared space.
//!
//! ## Commands
//!
//! - `run`: full cycle against a live environment (bootstrap/clean, provision,
//!   collect, verify, teardown)
//! - `verify`: offline check of a topology snapshot read from a JSON file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info, warn, Level};

use spacecheck_client::{CommandClient, ProvisioningClient, RemoteExec};
use spacecheck_core::{run_check, verify_membership, Scenario, TopologySnapshot};

#[derive(Parser)]
#[command(name = "spacecheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify unit addresses against declared network spaces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the scenario against a live environment and verify it
    Run {
        /// Platform CLI binary to drive
        #[arg(long, default_value = "juju", env = "SPACECHECK_CLI")]
        cli: String,

        /// Model/environment name to target (platform default if omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// Scenario declaration JSON file (built-in reference scenario if omitted)
        #[arg(long)]
        scenario: Option<PathBuf>,

        /// Reuse and clean an existing environment instead of destroying
        /// and recreating it (falls back to recreate when cleaning fails)
        #[arg(long)]
        clean_environment: bool,

        /// Skip environment teardown at exit
        #[arg(long)]
        keep_env: bool,

        /// Directory for failure diagnostics from the bootstrap machine
        #[arg(long, default_value = "spacecheck-logs")]
        logs: PathBuf,

        /// Seconds to wait for all units to report started
        #[arg(long, default_value = "1200")]
        status_timeout_secs: u64,

        /// Maximum concurrent interface probes
        #[arg(long, default_value = "8")]
        probe_concurrency: usize,
    },

    /// Verify a topology snapshot from a JSON file, without touching a cluster
    Verify {
        /// Snapshot file: {"spaces": {..}, "units": {..}, "expected": {..}}
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    spacecheck_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            cli,
            model,
            scenario,
            clean_environment,
            keep_env,
            logs,
            status_timeout_secs,
            probe_concurrency,
        } => {
            cmd_run(
                &cli,
                model.as_deref(),
                scenario.as_deref(),
                clean_environment,
                keep_env,
                &logs,
                status_timeout_secs,
                probe_concurrency,
            )
            .await
        }
        Commands::Verify { snapshot } => cmd_verify(&snapshot),
    }
}

/// Full provision-collect-verify cycle against a live environment.
#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    cli_binary: &str,
    model: Option<&str>,
    scenario_path: Option<&Path>,
    clean_environment: bool,
    keep_env: bool,
    logs_dir: &Path,
    status_timeout_secs: u64,
    probe_concurrency: usize,
) -> Result<()> {
    let mut client = CommandClient::new(cli_binary)
        .with_status_timeout(Duration::from_secs(status_timeout_secs));
    if let Some(model) = model {
        client = client.with_model(model);
    }

    let scenario = match scenario_path {
        Some(path) => load_scenario(path)?,
        None => Scenario::reference(),
    };
    scenario
        .validate()
        .context("scenario declaration is invalid")?;

    prepare_environment(&client, clean_environment).await?;

    let outcome = run_check(&client, &client, &scenario, probe_concurrency).await;

    if let Err(err) = &outcome {
        error!(%err, "space verification failed");
        if let Err(dump_err) = dump_logs(&client, "0", logs_dir).await {
            warn!(%dump_err, "diagnostic log capture failed");
        }
    }

    teardown(&client, keep_env, clean_environment).await;

    let matched = outcome.context("space verification failed")?;
    println!("Verified {matched} unit address(es) against their declared spaces");
    Ok(())
}

/// Offline verification of a snapshot file.
fn cmd_verify(path: &Path) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    let matched = verify_membership(&snapshot).context("snapshot verification failed")?;
    println!("Verified {matched} unit address(es) against their declared spaces");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SnapshotDoc {
    spaces: BTreeMap<String, Vec<String>>,
    units: BTreeMap<String, String>,
    expected: BTreeMap<String, String>,
}

fn load_snapshot(path: &Path) -> Result<TopologySnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot file: {path:?}"))?;
    let doc: SnapshotDoc =
        serde_json::from_str(&content).with_context(|| format!("invalid snapshot in {path:?}"))?;
    Ok(TopologySnapshot::new(doc.spaces, doc.units, doc.expected))
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file: {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("invalid scenario in {path:?}"))
}

/// Bring the environment to a known-clean state before provisioning.
///
/// With `clean`, an existing environment is reused and drained; when it is
/// unusable or cleaning fails, fall back to destroy-and-bootstrap.
async fn prepare_environment(client: &dyn ProvisioningClient, clean: bool) -> Result<()> {
    if clean {
        match client.clean_environment().await {
            Ok(true) => {
                info!("reusing cleaned environment");
                return Ok(());
            }
            Ok(false) => {
                info!("no usable environment, bootstrapping");
            }
            Err(err) => {
                warn!(%err, "cleaning failed, recreating environment");
                if let Err(err) = client.destroy_environment().await {
                    warn!(%err, "destroy before recreate failed");
                }
            }
        }
        client.bootstrap().await.context("bootstrap failed")?;
        return Ok(());
    }

    if let Err(err) = client.destroy_environment().await {
        warn!(%err, "destroy before bootstrap failed");
    }
    client.bootstrap().await.context("bootstrap failed")?;
    Ok(())
}

/// Best-effort capture of diagnostics from the bootstrap machine.
async fn dump_logs(exec: &dyn RemoteExec, machine: &str, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {dir:?}"))?;

    let captures = [
        ("addresses.txt", "ip -o addr"),
        ("syslog.txt", "tail -n 500 /var/log/syslog"),
    ];
    for (file, command) in captures {
        let output = exec
            .run(machine, command)
            .await
            .with_context(|| format!("`{command}` failed on machine {machine}"))?;
        let path = dir.join(format!("machine-{machine}-{file}"));
        std::fs::write(&path, output)
            .with_context(|| format!("failed to write {path:?}"))?;
        info!(?path, "captured diagnostics");
    }
    Ok(())
}

/// Tear the environment down per the caller's flags. Failures are logged,
/// never propagated; teardown must not mask the verification outcome.
async fn teardown(client: &dyn ProvisioningClient, keep_env: bool, clean: bool) {
    if keep_env {
        info!("keeping environment as requested");
        return;
    }
    let result = if clean {
        client.clean_environment().await.map(|_| ())
    } else {
        client.destroy_environment().await
    };
    if let Err(err) = result {
        warn!(%err, "environment teardown failed");
    }
}
