//! IPv4 address arithmetic.
//!
//! Pure, stateless helpers: dotted-decimal parsing to a packed `u32` and
//! CIDR membership. Malformed input is a hard error, never clamped.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SpaceCheckError};

/// Parse a dotted-decimal IPv4 address into a packed big-endian `u32`.
///
/// Exactly four octets are required, each in `0..=255`.
pub fn parse_ipv4(text: &str) -> Result<u32> {
    let octets: Vec<&str> = text.split('.').collect();
    if octets.len() != 4 {
        return Err(SpaceCheckError::MalformedAddress(text.to_string()));
    }
    let mut packed: u32 = 0;
    for octet in octets {
        let value: u8 = octet
            .parse()
            .map_err(|_| SpaceCheckError::MalformedAddress(text.to_string()))?;
        packed = (packed << 8) | u32::from(value);
    }
    Ok(packed)
}

/// A CIDR block: `network/prefix_len`.
///
/// The network value is stored exactly as parsed, not pre-masked. Membership
/// masks only the address side and compares against this literal value, so a
/// network that does not sit on its prefix boundary under-matches. Callers
/// who want boundary-aligned semantics must supply aligned networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: u32,
    prefix_len: u8,
}

impl Cidr {
    /// Netmask for this block. A zero prefix yields a zero mask (matches
    /// every address); the shift is guarded because `<< 32` is undefined.
    pub fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            0xFFFF_FFFFu32 << (32 - u32::from(self.prefix_len))
        }
    }

    /// Whether `address` (dotted decimal, optionally carrying a `/prefix`
    /// suffix which is stripped, not applied) falls inside this block.
    pub fn contains(&self, address: &str) -> Result<bool> {
        let bare = match address.split_once('/') {
            Some((addr, _)) => addr,
            None => address,
        };
        let addr = parse_ipv4(bare)?;
        Ok(addr & self.mask() == self.network)
    }
}

impl FromStr for Cidr {
    type Err = SpaceCheckError;

    fn from_str(text: &str) -> Result<Self> {
        let (network_text, prefix_text) = text
            .split_once('/')
            .ok_or_else(|| SpaceCheckError::MalformedCidr(text.to_string()))?;
        let network = parse_ipv4(network_text)
            .map_err(|_| SpaceCheckError::MalformedCidr(text.to_string()))?;
        let prefix_len: u8 = prefix_text
            .parse()
            .map_err(|_| SpaceCheckError::MalformedCidr(text.to_string()))?;
        if prefix_len > 32 {
            return Err(SpaceCheckError::MalformedCidr(text.to_string()));
        }
        Ok(Cidr {
            network,
            prefix_len,
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.network;
        write!(
            f,
            "{}.{}.{}.{}/{}",
            n >> 24,
            (n >> 16) & 0xFF,
            (n >> 8) & 0xFF,
            n & 0xFF,
            self.prefix_len
        )
    }
}
