//! IPv4 range matching.
//!
//! An entry is either an exact address (`192.0.2.7`) or a CIDR block
//! (`192.0.2.0/24`). Both sides are reduced to 32-bit integers and compared
//! under the prefix mask `(0xFFFF_FFFF << (32 - prefix))`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),

    #[error("invalid prefix length {0:?} (expected 0-32)")]
    InvalidPrefix(String),
}

/// One allowed-address entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRange {
    Exact(Ipv4Addr),
    Cidr { network: u32, prefix: u8 },
}

impl IpRange {
    /// Returns the network mask for a prefix length in `0..=32`.
    pub fn mask(prefix: u8) -> u32 {
        debug_assert!(prefix <= 32);
        u32::MAX
            .checked_shl(32 - u32::from(prefix))
            .unwrap_or(0)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        match *self {
            IpRange::Exact(exact) => exact == addr,
            IpRange::Cidr { network, prefix } => {
                let mask = Self::mask(prefix);
                (u32::from(addr) & mask) == (network & mask)
            }
        }
    }
}

impl FromStr for IpRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((network, prefix)) => {
                let network = network
                    .parse::<Ipv4Addr>()
                    .map_err(|_| RangeParseError::InvalidAddress(network.to_string()))?;
                let prefix = prefix
                    .parse::<u8>()
                    .ok()
                    .filter(|p| *p <= 32)
                    .ok_or_else(|| RangeParseError::InvalidPrefix(prefix.to_string()))?;
                Ok(IpRange::Cidr {
                    network: u32::from(network),
                    prefix,
                })
            }
            None => s
                .parse::<Ipv4Addr>()
                .map(IpRange::Exact)
                .map_err(|_| RangeParseError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpRange::Exact(addr) => write!(f, "{addr}"),
            IpRange::Cidr { network, prefix } => write!(f, "{}/{prefix}", Ipv4Addr::from(*network)),
        }
    }
}

/// Parses every entry, skipping malformed ones with a warning.
pub fn parse_ranges(entries: &[String]) -> Vec<IpRange> {
    entries
        .iter()
        .filter_map(|entry| match entry.parse::<IpRange>() {
            Ok(range) => Some(range),
            Err(e) => {
                warn!(entry = %entry, error = %e, "skipping malformed IP range");
                None
            }
        })
        .collect()
}

/// Returns whether `origin` is an IPv4 address inside any of `ranges`.
///
/// A malformed or non-IPv4 origin matches nothing.
pub fn origin_in_ranges(origin: &str, ranges: &[IpRange]) -> bool {
    match origin.trim().parse::<Ipv4Addr>() {
        Ok(addr) => ranges.iter().any(|range| range.contains(addr)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("192.168.1.0/24", "192.168.1.0", true; "network address")]
    #[test_case("192.168.1.0/24", "192.168.1.255", true; "broadcast address")]
    #[test_case("192.168.1.0/24", "192.168.2.0", false; "next network")]
    #[test_case("192.168.1.0/24", "192.168.0.255", false; "previous broadcast")]
    #[test_case("10.0.0.0/8", "10.255.255.255", true; "wide block")]
    #[test_case("172.16.0.0/12", "172.31.0.1", true; "twelve bit block")]
    #[test_case("172.16.0.0/12", "172.32.0.1", false; "outside twelve bit block")]
    #[test_case("203.0.113.9/32", "203.0.113.9", true; "host route")]
    #[test_case("0.0.0.0/0", "8.8.8.8", true; "default route")]
    #[test_case("198.51.100.7", "198.51.100.7", true; "exact entry")]
    #[test_case("198.51.100.7", "198.51.100.8", false; "exact entry mismatch")]
    fn test_contains(range: &str, addr: &str, expected: bool) {
        let range: IpRange = range.parse().unwrap();
        assert_eq!(range.contains(addr.parse().unwrap()), expected);
    }

    #[test_case("10.0.0.0/33")]
    #[test_case("10.0.0.0/-1")]
    #[test_case("10.0.0.0/abc")]
    fn test_rejects_bad_prefix(entry: &str) {
        assert!(matches!(
            entry.parse::<IpRange>(),
            Err(RangeParseError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let entries = vec![
            "10.0.0.0/99".to_string(),
            "bogus".to_string(),
            "203.0.113.0/24".to_string(),
        ];
        let ranges = parse_ranges(&entries);
        assert_eq!(ranges.len(), 1);
        assert!(origin_in_ranges("203.0.113.50", &ranges));
    }

    #[test]
    fn test_malformed_origin_matches_nothing() {
        let ranges = parse_ranges(&["0.0.0.0/0".to_string()]);
        assert!(!origin_in_ranges("not-an-ip", &ranges));
        assert!(!origin_in_ranges("2001:db8::1", &ranges));
    }

    #[test]
    fn test_mask_values() {
        assert_eq!(IpRange::mask(0), 0);
        assert_eq!(IpRange::mask(8), 0xFF00_0000);
        assert_eq!(IpRange::mask(24), 0xFFFF_FF00);
        assert_eq!(IpRange::mask(32), 0xFFFF_FFFF);
    }

    proptest! {
        #[test]
        fn cidr_boundaries_are_inclusive(addr in any::<u32>(), prefix in 0u8..=32) {
            let mask = IpRange::mask(prefix);
            let network = addr & mask;
            let broadcast = network | !mask;
            let range = IpRange::Cidr { network, prefix };

            prop_assert!(range.contains(Ipv4Addr::from(network)));
            prop_assert!(range.contains(Ipv4Addr::from(broadcast)));
            if broadcast != u32::MAX {
                prop_assert!(!range.contains(Ipv4Addr::from(broadcast + 1)));
            }
            if network != 0 {
                prop_assert!(!range.contains(Ipv4Addr::from(network - 1)));
            }
        }

        #[test]
        fn display_round_trips(network in any::<u32>(), prefix in 0u8..=32) {
            let range = IpRange::Cidr { network, prefix };
            let parsed: IpRange = range.to_string().parse().unwrap();
            prop_assert_eq!(parsed, range);
        }
    }
}
