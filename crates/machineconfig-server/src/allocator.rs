//! Sequential IPv4 address allocation.
//!
//! Addresses are handed out from the network address of the CIDR upward,
//! skipping any address already used by a Machine. Network and broadcast
//! addresses are ordinary candidates. Nothing is reserved: until the new
//! Machine is stored, a concurrent allocation can return the same address.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a CIDR or allocating from it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// CIDR string is malformed or not IPv4
    #[error("invalid IPv4 CIDR {0:?}")]
    InvalidCidr(String),

    /// Every address in the CIDR is taken
    #[error("no more IPs available in {0}")]
    Exhausted(Ipv4Cidr),
}

/// An IPv4 network in CIDR notation. The host bits of the address are
/// cleared on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Builds a CIDR, masking off host bits.
    ///
    /// # Errors
    ///
    /// Fails when `prefix_len` exceeds 32.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, AllocationError> {
        if prefix_len > 32 {
            return Err(AllocationError::InvalidCidr(format!("{address}/{prefix_len}")));
        }
        Ok(Self {
            network: Ipv4Addr::from(u32::from(address) & mask(prefix_len)),
            prefix_len,
        })
    }

    /// First address of the network.
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Last address of the network.
    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    /// Number of addresses in the network.
    #[must_use]
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// True when `address` lies inside the network.
    #[must_use]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & mask(self.prefix_len) == u32::from(self.network)
    }

    /// `address/prefix_len`, the form used for interface addresses.
    #[must_use]
    pub fn with_host(&self, address: Ipv4Addr) -> String {
        format!("{address}/{}", self.prefix_len)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix_len)) }
}

impl FromStr for Ipv4Cidr {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AllocationError::InvalidCidr(s.to_string());
        let (address, prefix_len) = s.trim().split_once('/').ok_or_else(invalid)?;
        let address: Ipv4Addr = address.parse().map_err(|_e| invalid())?;
        let prefix_len: u8 = prefix_len.parse().map_err(|_e| invalid())?;
        Self::new(address, prefix_len).map_err(|_e| invalid())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Parses a Machine address, accepting `a.b.c.d` or `a.b.c.d/len`.
fn parse_machine_address(address: &str) -> Option<Ipv4Addr> {
    let address = address.trim();
    let host = address.split_once('/').map_or(address, |(host, _)| host);
    host.parse().ok()
}

/// Returns the lowest address of `cidr` not present in `existing`.
///
/// Entries of `existing` that do not parse as IPv4 addresses, or that lie
/// outside `cidr`, are ignored.
///
/// # Errors
///
/// Returns [`AllocationError::Exhausted`] when every address is taken.
pub fn allocate<I, S>(cidr: &Ipv4Cidr, existing: I) -> Result<Ipv4Addr, AllocationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<u32> = existing
        .into_iter()
        .filter_map(|address| parse_machine_address(address.as_ref()))
        .filter(|address| cidr.contains(*address))
        .map(u32::from)
        .collect();

    let mut candidate = u32::from(cidr.network());
    loop {
        if !cidr.contains(Ipv4Addr::from(candidate)) {
            return Err(AllocationError::Exhausted(*cidr));
        }
        if !taken.contains(&candidate) {
            return Ok(Ipv4Addr::from(candidate));
        }
        candidate = candidate.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv4Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_masks_host_bits() {
        let parsed = cidr("10.0.0.77/24");
        assert_eq!(parsed.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(parsed.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(parsed.size(), 256);
        assert_eq!(parsed.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["10.0.0.0", "10.0.0.0/33", "fd00::/64", "ten/8", ""] {
            assert!(bad.parse::<Ipv4Cidr>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_first_free_starts_at_network_address() {
        let got = allocate(&cidr("10.0.0.0/30"), Vec::<String>::new()).unwrap();
        assert_eq!(got, Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn test_skips_taken_addresses() {
        let got = allocate(&cidr("10.0.0.0/30"), ["10.0.0.0", "10.0.0.1"]).unwrap();
        assert_eq!(got, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_broadcast_is_allocatable() {
        let got = allocate(&cidr("10.0.0.0/30"), ["10.0.0.0", "10.0.0.1", "10.0.0.2"]).unwrap();
        assert_eq!(got, Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn test_exhausted_when_all_taken() {
        let result = allocate(&cidr("10.0.0.0/30"), ["10.0.0.3", "10.0.0.1", "10.0.0.0", "10.0.0.2"]);
        assert_eq!(result, Err(AllocationError::Exhausted(cidr("10.0.0.0/30"))));
    }

    #[test]
    fn test_ignores_unparseable_and_foreign_addresses() {
        let existing = ["", "node-1.example.com", "fd00::1", "192.168.1.0", "10.0.0.0/30"];
        let got = allocate(&cidr("10.0.0.0/30"), existing).unwrap();
        assert_eq!(got, Ipv4Addr::new(10, 0, 0, 1), "the prefixed form still counts as taken");
    }

    #[test]
    fn test_gap_in_middle_is_reused() {
        let got = allocate(&cidr("172.16.0.0/24"), ["172.16.0.0", "172.16.0.2", "172.16.0.1", "172.16.0.4"]).unwrap();
        assert_eq!(got, Ipv4Addr::new(172, 16, 0, 3));
    }

    #[test]
    fn test_top_of_address_space_exhausts_without_wrapping() {
        let got = allocate(&cidr("255.255.255.255/32"), ["255.255.255.255"]);
        assert!(matches!(got, Err(AllocationError::Exhausted(_))));
    }

    #[test]
    fn test_with_host_uses_prefix_len() {
        assert_eq!(cidr("10.1.0.0/16").with_host(Ipv4Addr::new(10, 1, 0, 9)), "10.1.0.9/16");
    }
}
