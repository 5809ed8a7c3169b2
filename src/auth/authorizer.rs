//! Stream subscription entitlements.
//!
//! Stream rooms are only joinable by tenants entitled to the underlying
//! stream. The authorizer is consulted before any join is applied; a denial
//! leaves connection state untouched.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::EntitlementsConfig;

/// Decides whether a tenant may subscribe to a stream room.
///
/// Implementations may consult external systems; the shipped implementation
/// answers from statically configured grants.
#[async_trait]
pub trait StreamAuthorizer: Send + Sync {
    async fn can_subscribe(&self, tenant_id: &str, stream_id: &str) -> bool;
}

/// Config-backed entitlements: a tenant may subscribe to exactly the streams
/// granted to it, unless `open_access` is set.
pub struct StaticEntitlements {
    open_access: bool,
    grants: HashMap<String, HashSet<String>>,
}

impl StaticEntitlements {
    pub fn new(config: &EntitlementsConfig) -> Self {
        let grants = config
            .grants
            .iter()
            .map(|(tenant, streams)| (tenant.clone(), streams.iter().cloned().collect()))
            .collect();

        Self {
            open_access: config.open_access,
            grants,
        }
    }
}

#[async_trait]
impl StreamAuthorizer for StaticEntitlements {
    async fn can_subscribe(&self, tenant_id: &str, stream_id: &str) -> bool {
        if self.open_access {
            return true;
        }

        self.grants
            .get(tenant_id)
            .is_some_and(|streams| streams.contains(stream_id))
    }
}

pub fn create_authorizer(config: &EntitlementsConfig) -> Arc<dyn StreamAuthorizer> {
    if config.open_access {
        tracing::warn!("Stream entitlements disabled (open_access), all subscriptions allowed");
    }
    Arc::new(StaticEntitlements::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_grant(tenant: &str, streams: &[&str]) -> EntitlementsConfig {
        let mut grants = HashMap::new();
        grants.insert(
            tenant.to_string(),
            streams.iter().map(|s| s.to_string()).collect(),
        );
        EntitlementsConfig {
            open_access: false,
            grants,
        }
    }

    #[tokio::test]
    async fn test_granted_stream_allowed() {
        let authorizer = StaticEntitlements::new(&config_with_grant("farm-1", &["cam-a", "cam-b"]));

        assert!(authorizer.can_subscribe("farm-1", "cam-a").await);
        assert!(authorizer.can_subscribe("farm-1", "cam-b").await);
    }

    #[tokio::test]
    async fn test_ungranted_stream_denied() {
        let authorizer = StaticEntitlements::new(&config_with_grant("farm-1", &["cam-a"]));

        assert!(!authorizer.can_subscribe("farm-1", "cam-z").await);
        assert!(!authorizer.can_subscribe("farm-2", "cam-a").await);
    }

    #[tokio::test]
    async fn test_open_access_allows_everything() {
        let config = EntitlementsConfig {
            open_access: true,
            grants: HashMap::new(),
        };
        let authorizer = StaticEntitlements::new(&config);

        assert!(authorizer.can_subscribe("any-tenant", "any-stream").await);
    }
}
