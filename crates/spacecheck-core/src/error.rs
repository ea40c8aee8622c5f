//! Error taxonomy for the verification core.
//!
//! Every failure here is fatal for the current run: parse errors abort
//! before verification, consistency errors abort verification itself.
//! Nothing is retried internally; the verifier is read-only and single-shot.

use spacecheck_client::ClientError;

/// spacecheck verification errors.
#[derive(Debug, thiserror::Error)]
pub enum SpaceCheckError {
    #[error("malformed IPv4 address: {0}")]
    MalformedAddress(String),

    #[error("malformed CIDR: {0}")]
    MalformedCidr(String),

    /// A unit's address landed in a space other than the one its workload
    /// was constrained to.
    #[error("found {unit} in {found}, expected {expected}")]
    MismatchedSpace {
        unit: String,
        found: String,
        expected: String,
    },

    /// A matched unit belongs to a workload with no declared space.
    #[error("unit {unit} belongs to workload {workload}, which has no declared space")]
    UnknownWorkload { unit: String, workload: String },

    /// Matched-unit count disagrees with discovered-unit count: some unit's
    /// address matched no CIDR in any space, or overlapping CIDRs inflated
    /// the count.
    #[error("could not find spaces for all units: matched {matched} of {total}")]
    IncompleteCoverage { matched: usize, total: usize },

    /// A workload declaration references a space that was never declared.
    #[error("workload {workload} references undeclared space {space}")]
    UndeclaredSpace { workload: String, space: String },

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type for spacecheck core operations.
pub type Result<T> = std::result::Result<T, SpaceCheckError>;
