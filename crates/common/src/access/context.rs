use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use super::key_cache::KeyCache;
use super::profile::NamingProfile;
use crate::config::{AccessControlConfig, ConfigError, LocalKeyStore};
use crate::crypto::{CipherAlgorithm, PublicKey, SecretKey, WrappedKey};
use crate::name::{Name, Version};
use crate::store::{
    latest_version, ContentObject, ContentStore, ContentType, Link, StoreError, VersionQuery,
};

/// Everything access-control operations need, passed explicitly
///
/// Holds the store, the key cache, our signing identity and the groups we
/// believe we belong to. Shared as an `Arc<KeyContext>`.
#[derive(Debug)]
pub struct KeyContext {
    store: Arc<dyn ContentStore>,
    cache: KeyCache,
    config: AccessControlConfig,
    profile: NamingProfile,
    algorithm: CipherAlgorithm,
    identity: SecretKey,
    /// Friendly names of groups we believe we are a member of
    memberships: RwLock<BTreeSet<String>>,
}

impl KeyContext {
    pub fn new(
        store: Arc<dyn ContentStore>,
        config: AccessControlConfig,
        keys: &LocalKeyStore,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let profile = NamingProfile::from_config(&config)?;
        let algorithm = config.algorithm()?;
        Ok(Arc::new(Self {
            store,
            cache: KeyCache::with_private_keys(keys.keys()),
            config,
            profile,
            algorithm,
            identity: keys.identity().clone(),
            memberships: RwLock::new(BTreeSet::new()),
        }))
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    pub fn config(&self) -> &AccessControlConfig {
        &self.config
    }

    pub fn profile(&self) -> &NamingProfile {
        &self.profile
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    pub fn identity(&self) -> &SecretKey {
        &self.identity
    }

    pub fn version_query(&self) -> VersionQuery {
        VersionQuery {
            timeout: self.config.enumeration_timeout(),
            quiet_period: self.config.quiet_period(),
            attempts: self.config.version_attempts,
        }
    }

    pub fn is_known_member(&self, group: &str) -> bool {
        self.memberships.read().contains(group)
    }

    pub fn record_membership(&self, group: &str) {
        self.memberships.write().insert(group.to_string());
    }

    pub fn forget_membership(&self, group: &str) {
        self.memberships.write().remove(group);
    }

    /// Sign and publish under our identity
    pub async fn publish(
        &self,
        name: Name,
        content_type: ContentType,
        content: Vec<u8>,
    ) -> Result<(), StoreError> {
        let object = ContentObject::new(name, content_type, content, &self.identity)?;
        self.store.publish(object).await
    }

    pub async fn publish_link(&self, name: Name, link: &Link) -> Result<(), StoreError> {
        self.publish(name, ContentType::Link, link.encode()?).await
    }

    pub async fn publish_wrapped_key(
        &self,
        name: Name,
        wrapped: &WrappedKey,
    ) -> Result<(), StoreError> {
        let encoded = wrapped.encode().map_err(anyhow::Error::from)?;
        self.publish(name, ContentType::Key, encoded).await
    }

    pub async fn publish_gone(&self, name: Name) -> Result<(), StoreError> {
        self.publish(name, ContentType::Gone, Vec::new()).await
    }

    /// Verified object under `name`, treating tombstones as absent
    pub async fn fetch_live(&self, name: &Name) -> Result<Option<ContentObject>, StoreError> {
        Ok(self
            .store
            .fetch_verified(name)
            .await?
            .filter(|object| !object.is_gone()))
    }

    pub async fn fetch_link(&self, name: &Name) -> Result<Option<Link>, StoreError> {
        match self.fetch_live(name).await? {
            Some(object) => Ok(Some(object.as_link()?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_wrapped_key(&self, name: &Name) -> Result<Option<WrappedKey>, StoreError> {
        let Some(object) = self.fetch_live(name).await? else {
            return Ok(None);
        };
        if object.content_type() != ContentType::Key {
            return Err(StoreError::UnexpectedType {
                name: name.clone(),
                expected: ContentType::Key,
                actual: object.content_type(),
            });
        }
        let wrapped = WrappedKey::decode(object.content()).map_err(anyhow::Error::from)?;
        Ok(Some(wrapped))
    }

    pub async fn fetch_public_key(&self, name: &Name) -> Result<Option<PublicKey>, StoreError> {
        match self.fetch_live(name).await? {
            Some(object) => Ok(Some(
                PublicKey::try_from(object.content()).map_err(anyhow::Error::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Newest version directly under `prefix`
    pub async fn latest_version(&self, prefix: &Name) -> Result<Option<Name>, StoreError> {
        latest_version(self.store.as_ref(), prefix, self.version_query()).await
    }

    /// Publish our identity's public key as a new version of our user
    pub async fn publish_my_public_key(&self) -> Result<Name, StoreError> {
        let name = self
            .profile
            .user_public_key_name(&self.config.user_name)
            .append_version(Version::now());
        self.publish(
            name.clone(),
            ContentType::Data,
            self.identity.public().to_bytes().to_vec(),
        )
        .await?;
        Ok(name)
    }

    /// The public key a principal link points at
    ///
    /// A versioned target names one generation; an unversioned one means
    /// the newest.
    pub async fn resolve_public_key(
        &self,
        target: &Name,
    ) -> Result<Option<(Name, PublicKey)>, StoreError> {
        let name = if target.has_terminal_version() {
            target.clone()
        } else {
            match self.latest_version(target).await? {
                Some(name) => name,
                None => return Ok(None),
            }
        };
        Ok(self.fetch_public_key(&name).await?.map(|key| (name, key)))
    }

    /// Newest published public key of a user
    pub async fn latest_user_public_key(
        &self,
        user: &str,
    ) -> Result<Option<(Name, PublicKey)>, StoreError> {
        self.resolve_public_key(&self.profile.user_public_key_name(user))
            .await
    }
}
