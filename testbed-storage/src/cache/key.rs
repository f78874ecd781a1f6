//! Owner-scoped cache keys.
//!
//! `CacheKey` can only be built through its constructors, each of which
//! takes the owning user id. A cached read therefore always knows whose
//! write must invalidate it.

use std::fmt;

use serde::{Deserialize, Serialize};
use testbed_core::UserId;

/// Family of cached reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Recommendations,
    Dashboard,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Recommendations => "recommendations",
            CacheNamespace::Dashboard => "dashboard",
        }
    }
}

/// Deterministic cache key derived from request identity.
///
/// Renders as `{namespace}:user:{owner}`, e.g. `recommendations:user:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    namespace: CacheNamespace,
    owner: UserId,
}

impl CacheKey {
    fn new(namespace: CacheNamespace, owner: UserId) -> Self {
        Self {
            inner: KeyInner { namespace, owner },
        }
    }

    /// Key for a user's product recommendations.
    pub fn recommendations(user_id: UserId) -> Self {
        Self::new(CacheNamespace::Recommendations, user_id)
    }

    /// Key for a user's dashboard.
    pub fn dashboard(user_id: UserId) -> Self {
        Self::new(CacheNamespace::Dashboard, user_id)
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.inner.namespace
    }

    /// User whose writes invalidate this key.
    pub fn owner(&self) -> UserId {
        self.inner.owner
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:user:{}", self.inner.namespace.as_str(), self.inner.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        assert_eq!(
            CacheKey::recommendations(42).to_string(),
            "recommendations:user:42"
        );
        assert_eq!(CacheKey::dashboard(7).to_string(), "dashboard:user:7");
    }

    #[test]
    fn test_keys_are_deterministic_and_distinct() {
        assert_eq!(CacheKey::dashboard(1), CacheKey::dashboard(1));
        assert_ne!(CacheKey::dashboard(1), CacheKey::dashboard(2));
        assert_ne!(CacheKey::dashboard(1), CacheKey::recommendations(1));
        assert_eq!(CacheKey::recommendations(9).owner(), 9);
        assert_eq!(
            CacheKey::recommendations(9).namespace(),
            CacheNamespace::Recommendations
        );
    }
}
