//! Shared test utilities for access-control integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::access::{AccessControlManager, GroupManager, KeyContext};
use common::config::{AccessControlConfig, LocalKeyStore};
use common::name::Name;
use common::store::{ContentStore, Link, MemoryContentStore};

/// One participant: a context over the shared store and their published key
pub struct TestUser {
    pub name: String,
    pub context: Arc<KeyContext>,
    pub public_key_name: Name,
}

impl TestUser {
    /// Link to the user's newest public key, for ACLs and membership lists
    pub fn link(&self) -> Link {
        Link::new(self.public_key_name.unversioned())
    }

    pub fn groups(&self) -> GroupManager {
        GroupManager::new(self.context.clone())
    }

    pub fn manager(&self) -> AccessControlManager {
        AccessControlManager::new(self.context.clone())
    }
}

/// Log to the test output; `RUST_LOG=common=debug` shows resolution steps
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Short waits so absent names resolve quickly against the memory store
pub fn test_config(user: &str) -> AccessControlConfig {
    AccessControlConfig {
        user_name: user.to_string(),
        enumeration_timeout_ms: 100,
        quiet_period_ms: 20,
        max_update_rounds: 4,
        version_attempts: 1,
        ..Default::default()
    }
}

pub fn test_store() -> Arc<dyn ContentStore> {
    Arc::new(MemoryContentStore::new())
}

/// Create a user with a fresh identity and publish their public key
pub async fn setup_user(store: &Arc<dyn ContentStore>, name: &str) -> TestUser {
    setup_user_with_config(store, test_config(name)).await
}

pub async fn setup_user_with_config(
    store: &Arc<dyn ContentStore>,
    config: AccessControlConfig,
) -> TestUser {
    init_tracing();
    let name = config.user_name.clone();
    let context = KeyContext::new(store.clone(), config, &LocalKeyStore::generate()).unwrap();
    let public_key_name = context.publish_my_public_key().await.unwrap();
    TestUser {
        name,
        context,
        public_key_name,
    }
}
