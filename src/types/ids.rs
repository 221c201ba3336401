//! Newtype wrappers for identifiers that cross module boundaries.
//!
//! These keep a delivery id from being passed where an installation id is
//! expected, and give each id a single place to define its display format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A GitHub webhook delivery ID (`X-GitHub-Delivery`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeliveryId {
    fn from(s: String) -> Self {
        DeliveryId(s)
    }
}

/// A GitHub App installation ID.
///
/// Installation ids are positive integers; zero is never issued by GitHub and
/// is rejected wherever an id enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(pub u64);

impl InstallationId {
    /// Returns the id if it is a positive integer.
    pub fn new(n: u64) -> Option<Self> {
        (n > 0).then_some(InstallationId(n))
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repository identifier in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses a `full_name` such as `acme/repo`.
    ///
    /// Returns `None` unless there is exactly one `/` with non-empty text on
    /// both sides.
    pub fn parse_full_name(full_name: &str) -> Option<Self> {
        let (owner, repo) = full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(RepoId::new(owner, repo))
    }

    /// Returns the `owner/repo` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod installation_id {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn zero_is_rejected() {
            assert_eq!(InstallationId::new(0), None);
        }

        proptest! {
            #[test]
            fn positive_values_are_accepted(n in 1u64..=u64::MAX) {
                prop_assert_eq!(InstallationId::new(n), Some(InstallationId(n)));
            }

            #[test]
            fn serde_is_transparent(n in 1u64..=u64::MAX) {
                let json = serde_json::to_string(&InstallationId(n)).unwrap();
                prop_assert_eq!(json, n.to_string());
            }
        }
    }

    mod repo_id {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn parse_full_name_rejects_malformed() {
            assert_eq!(RepoId::parse_full_name("acme"), None);
            assert_eq!(RepoId::parse_full_name("/repo"), None);
            assert_eq!(RepoId::parse_full_name("acme/"), None);
            assert_eq!(RepoId::parse_full_name("acme/repo/extra"), None);
        }

        proptest! {
            #[test]
            fn full_name_roundtrip(
                owner in "[a-zA-Z][a-zA-Z0-9-]{0,38}",
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let id = RepoId::new(&owner, &repo);
                let parsed = RepoId::parse_full_name(&id.full_name());
                prop_assert_eq!(Some(id.clone()), parsed);
                prop_assert_eq!(format!("{}", id), format!("{}/{}", owner, repo));
            }
        }
    }

    mod delivery_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serde_roundtrip(s in "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}") {
                let id = DeliveryId::new(&s);
                let json = serde_json::to_string(&id).unwrap();
                let parsed: DeliveryId = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(id, parsed);
            }
        }
    }
}
