//! Space-membership verification.
//!
//! Checks every observed unit address against every CIDR of every space and
//! cross-checks the owning workload's declared space. Brute force on purpose:
//! target topologies are tens of entries, not thousands. An implementation
//! for larger scale would swap in a longest-prefix index but must keep the
//! failure ordering: first mismatch aborts, completeness is checked last.

use tracing::debug;

use crate::error::{Result, SpaceCheckError};
use crate::ipv4::Cidr;
use crate::topology::TopologySnapshot;

/// Verify that every unit's address sits in a CIDR of its declared space.
///
/// Returns the number of matched (unit, space) pairs on success. Fails with
/// [`SpaceCheckError::MismatchedSpace`] on the first unit found in the wrong
/// space, and with [`SpaceCheckError::IncompleteCoverage`] when the matched
/// count disagrees with the discovered-unit count (a unit matched no CIDR,
/// or overlapping CIDRs double-counted one; avoiding overlap is the
/// caller's responsibility).
///
/// Read-only over the snapshot: running it twice yields the same result.
pub fn verify_membership(snapshot: &TopologySnapshot) -> Result<usize> {
    let total = snapshot.units_found;
    let mut matched = 0usize;

    for (space, cidrs) in &snapshot.spaces {
        for cidr_text in cidrs {
            let cidr: Cidr = cidr_text.parse()?;
            for (unit, address) in &snapshot.unit_addresses {
                if !cidr.contains(address)? {
                    continue;
                }
                matched += 1;
                let workload = unit.split('/').next().unwrap_or(unit);
                let expected = snapshot.expected_spaces.get(workload).ok_or_else(|| {
                    SpaceCheckError::UnknownWorkload {
                        unit: unit.clone(),
                        workload: workload.to_string(),
                    }
                })?;
                if expected != space {
                    return Err(SpaceCheckError::MismatchedSpace {
                        unit: unit.clone(),
                        found: space.clone(),
                        expected: expected.clone(),
                    });
                }
                debug!(%unit, %address, %space, "unit address confirmed in declared space");
            }
        }
    }

    if matched != total {
        return Err(SpaceCheckError::IncompleteCoverage { matched, total });
    }
    Ok(matched)
}
