//! Canonical upstream node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

/// Canonical name of an upstream full node, derived from its URL.
///
/// URLs differing only in case, scheme or a trailing slash map to the same
/// identity, so `https://Node-A:8545/` and `http://node-a:8545` share one
/// pool entry and are considered the same delegate node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn from_url(url: &str) -> Self {
        let lowered = url.trim().to_lowercase();
        let mut name = lowered.as_str();
        for scheme in SCHEMES {
            if let Some(rest) = name.strip_prefix(scheme) {
                name = rest;
                break;
            }
        }
        Self(name.trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equivalent_urls_share_identity() {
        let a = NodeIdentity::from_url("https://Node-A:8545/");
        let b = NodeIdentity::from_url("http://node-a:8545");
        let c = NodeIdentity::from_url("  wss://NODE-A:8545  ");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "node-a:8545");
    }

    #[test]
    fn test_distinct_nodes_differ() {
        assert_ne!(
            NodeIdentity::from_url("http://node-a:8545"),
            NodeIdentity::from_url("http://node-b:8545")
        );
        assert_ne!(
            NodeIdentity::from_url("http://node-a:8545"),
            NodeIdentity::from_url("http://node-a:8546")
        );
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(NodeIdentity::from_url("A").as_str(), "a");
    }

    proptest! {
        #[test]
        fn prop_canonicalization_is_idempotent(host in "[a-zA-Z0-9.-]{1,24}", port in 1u16..) {
            let url = format!("https://{}:{}/", host, port);
            let once = NodeIdentity::from_url(&url);
            let twice = NodeIdentity::from_url(once.as_str());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_scheme_does_not_matter(host in "[a-z0-9.-]{1,24}") {
            let plain = NodeIdentity::from_url(&format!("http://{}", host));
            let tls = NodeIdentity::from_url(&format!("https://{}/", host));
            prop_assert_eq!(plain, tls);
        }
    }
}
