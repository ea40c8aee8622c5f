//! spacecheck Core Library
//!
//! End-to-end verification of a cluster platform's network-space feature:
//! declare a topology of spaces and constrained workloads, provision it,
//! then verify every unit's observed address against the subnets of the
//! space it was pinned to.
//!
//! Data flows one way: scenario provisions, the collector observes, the
//! verifier checks, and the matched count (or a consistency error) is
//! returned to the caller.

pub mod error;
pub mod ipv4;
pub mod scenario;
pub mod telemetry;
pub mod topology;
pub mod verify;

pub use error::{Result, SpaceCheckError};
pub use ipv4::{parse_ipv4, Cidr};
pub use scenario::{run_check, NormalizedWorkload, Scenario, WorkloadSpec};
pub use telemetry::init_tracing;
pub use topology::{
    collect_spaces, collect_unit_addresses, last_global_inet, CollectedUnits, TopologySnapshot,
    PROBE_COMMAND,
};
pub use verify::verify_membership;

/// spacecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
