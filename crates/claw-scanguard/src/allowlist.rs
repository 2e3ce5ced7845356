//! Allow list of addresses exempt from classification.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::debug;

use crate::error::{ScanGuardError, ScanGuardResult};

/// Immutable matcher over exact addresses and CIDR ranges.
///
/// An empty matcher never matches, so nothing is exempt by default.
#[derive(Debug, Clone, Default)]
pub struct AllowListMatcher {
    /// Exact addresses.
    addresses: HashSet<IpAddr>,
    /// Address ranges.
    networks: Vec<IpNet>,
}

impl AllowListMatcher {
    /// Build a matcher from configured entries.
    ///
    /// Each entry is tried as an address first, then as a range. A single bad
    /// entry fails the whole list rather than applying part of it.
    pub fn new<I, S>(entries: I) -> ScanGuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();

        for raw in entries {
            let entry = raw.as_ref().trim();

            if let Ok(ip) = entry.parse::<IpAddr>() {
                matcher.addresses.insert(ip.to_canonical());
                continue;
            }

            match entry.parse::<IpNet>() {
                Ok(net) => matcher.networks.push(net.trunc()),
                Err(e) => {
                    return Err(ScanGuardError::InvalidAllowListEntry {
                        entry: raw.as_ref().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            addresses = matcher.addresses.len(),
            networks = matcher.networks.len(),
            "Allow list built"
        );

        Ok(matcher)
    }

    /// Check whether an address is exempt.
    #[must_use]
    pub fn matches(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.addresses.contains(&ip) || self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Number of configured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len() + self.networks.len()
    }

    /// Whether no entries are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
