//! Proxy pool handling
//!
//! Egress proxies live in the catalog store, tagged with the market they were
//! vetted against. The [`ProxyCache`] keeps a TTL-gated snapshot per tag so
//! probes never wait on the store, and rotates across the snapshot.

mod cache;

pub use cache::ProxyCache;

use std::fmt;

/// A network egress address vetted for one market
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    /// Proxy URL, e.g. `http://10.0.0.1:8080`
    pub address: String,

    /// Validator tag naming the market this proxy was vetted against
    pub validator: String,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>, validator: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            validator: validator.into(),
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.address, self.validator)
    }
}
