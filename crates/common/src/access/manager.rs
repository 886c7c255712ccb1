use std::sync::Arc;

use super::acl::{Acl, AclError, AclOperation, AclUpdateOutcome, Role};
use super::context::KeyContext;
use super::group::{GroupError, GroupManager};
use super::key_directory::{KeyDirectory, KeyDirectoryError};
use super::node_key::{NodeKey, NodeKeyError};
use super::profile::NamingProfile;
use crate::crypto::{ContentKeyError, DerivedContentKeys, KeyDigest, Secret};
use crate::name::{Name, Version};
use crate::store::{ContentType, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AccessControlError {
    #[error("access control error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("key directory error: {0}")]
    KeyDirectory(#[from] KeyDirectoryError),
    #[error("group error: {0}")]
    Group(#[from] GroupError),
    #[error("node key error: {0}")]
    NodeKey(#[from] NodeKeyError),
    #[error("acl error: {0}")]
    Acl(#[from] AclError),
    #[error("content key error: {0}")]
    ContentKey(#[from] ContentKeyError),
    #[error("access denied to the node key of {0}")]
    AccessDenied(Name),
    #[error("no acl governs {0}")]
    NoAcl(Name),
    #[error("no node key stored for {0}")]
    NoNodeKey(Name),
}

/// Ties ACLs to node keys
///
/// Each access-controlled node carries an ACL and a chain of node key
/// directories. Every reader, writer and manager on the ACL gets the node
/// key wrapped for them. Content below a node is protected by a key
/// derived from the nearest ancestor's node key.
#[derive(Debug, Clone)]
pub struct AccessControlManager {
    context: Arc<KeyContext>,
    groups: GroupManager,
}

impl AccessControlManager {
    pub fn new(context: Arc<KeyContext>) -> Self {
        Self {
            groups: GroupManager::new(context.clone()),
            context,
        }
    }

    pub fn context(&self) -> &Arc<KeyContext> {
        &self.context
    }

    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    fn profile(&self) -> &NamingProfile {
        self.context.profile()
    }

    /// Publish a new version of the ACL of `node`
    pub async fn publish_acl(&self, node: &Name, acl: &Acl) -> Result<Name, AccessControlError> {
        let name = self.profile().acl_name(node).append_version(Version::now());
        self.context
            .publish(name.clone(), ContentType::Data, acl.encode()?)
            .await?;
        tracing::debug!("published acl {} with {} entries", name, acl.len());
        Ok(name)
    }

    /// The newest ACL stored at `node` itself
    pub async fn get_acl(&self, node: &Name) -> Result<Option<Acl>, AccessControlError> {
        let Some(name) = self.context.latest_version(&self.profile().acl_name(node)).await? else {
            return Ok(None);
        };
        match self.context.fetch_live(&name).await? {
            Some(object) => Ok(Some(Acl::decode(object.content())?)),
            None => Ok(None),
        }
    }

    /// The ACL of the closest node at or above `name`, with that node
    pub async fn find_acl(&self, name: &Name) -> Result<Option<(Name, Acl)>, AccessControlError> {
        for len in (0..=name.len()).rev() {
            let node = name.prefix(len);
            if NamingProfile::is_access_name(&node) {
                continue;
            }
            if let Some(acl) = self.get_acl(&node).await? {
                return Ok(Some((node, acl)));
            }
        }
        Ok(None)
    }

    /// Put `node` under access control with `acl` and a first node key
    pub async fn initialize_node(
        &self,
        node: &Name,
        acl: &Acl,
    ) -> Result<NodeKey, AccessControlError> {
        self.publish_acl(node, acl).await?;
        self.generate_new_node_key(node, acl).await
    }

    /// Apply `operations` to the ACL of `node` and update its keys
    ///
    /// When someone lost access the node is re-keyed. Otherwise the current
    /// node key is wrapped for the newly granted principals, which needs
    /// read access to it.
    pub async fn update_acl(
        &self,
        node: &Name,
        operations: &[AclOperation],
    ) -> Result<Acl, AccessControlError> {
        let mut acl = self
            .get_acl(node)
            .await?
            .ok_or_else(|| AccessControlError::NoAcl(node.clone()))?;
        let outcome = acl.update(operations);

        match outcome {
            AclUpdateOutcome::RekeyRequired => {
                self.publish_acl(node, &acl).await?;
                self.generate_new_node_key(node, &acl).await?;
            }
            AclUpdateOutcome::Granted(granted) => {
                if !granted.is_empty() {
                    match self.get_latest_node_key_for_node(node).await? {
                        Some(node_key) => {
                            let directory = KeyDirectory::new(
                                self.context.clone(),
                                node_key.stored_node_key_name().clone(),
                            );
                            for principal in &granted {
                                directory
                                    .add_wrapped_key_block_for(node_key.node_key(), principal)
                                    .await?;
                            }
                        }
                        None => {
                            self.generate_new_node_key(node, &acl).await?;
                        }
                    }
                }
                self.publish_acl(node, &acl).await?;
            }
        }
        Ok(acl)
    }

    /// Store a fresh node key for `node`, readable by everyone on `acl`
    ///
    /// The previous generation, if we can read it, is marked superseded by
    /// the new one, and the new directory links back to it.
    pub async fn generate_new_node_key(
        &self,
        node: &Name,
        acl: &Acl,
    ) -> Result<NodeKey, AccessControlError> {
        let prefix = self.profile().node_key_directory(node);
        let previous = KeyDirectory::open_latest(self.context.clone(), &prefix).await?;
        let previous_secret = match &previous {
            Some(directory) => directory.get_unwrapped_key(None).await?,
            None => None,
        };

        let secret = Secret::generate();
        let directory = KeyDirectory::create(self.context.clone(), &prefix);
        let stored_name = directory.versioned_name().await?.clone();
        let mut wrapped_for = 0usize;
        for principal in acl.at_least(Role::Reader) {
            if directory
                .add_wrapped_key_block_for(&secret, principal)
                .await?
            {
                wrapped_for += 1;
            }
        }

        if let Some(previous) = &previous {
            let previous_name = previous.versioned_name().await?.clone();
            let previous_digest: Option<KeyDigest> = match &previous_secret {
                Some(previous_secret) => {
                    previous
                        .add_superseded_by_block(previous_secret, &stored_name, &secret)
                        .await?;
                    Some(previous_secret.digest())
                }
                None => {
                    tracing::warn!(
                        "cannot read {}, new node key will not supersede it",
                        previous_name
                    );
                    None
                }
            };
            directory
                .add_previous_key_link(&previous_name, previous_digest)
                .await?;
        }

        self.context
            .cache()
            .put(Some(&stored_name), secret.clone().into());
        tracing::info!(
            "new node key for {} at {}, wrapped for {} principals",
            node,
            stored_name,
            wrapped_for
        );
        Ok(NodeKey::new(node.clone(), stored_name, secret))
    }

    /// The newest node key stored at `node` itself
    ///
    /// # Errors
    ///
    /// [`AccessControlError::AccessDenied`] when a key exists but we have
    /// no route to it.
    pub async fn get_latest_node_key_for_node(
        &self,
        node: &Name,
    ) -> Result<Option<NodeKey>, AccessControlError> {
        let prefix = self.profile().node_key_directory(node);
        let Some(directory) = KeyDirectory::open_latest(self.context.clone(), &prefix).await?
        else {
            return Ok(None);
        };
        let stored_name = directory.versioned_name().await?.clone();
        match directory.get_unwrapped_key(None).await? {
            Some(secret) => Ok(Some(NodeKey::new(node.clone(), stored_name, secret))),
            None => Err(AccessControlError::AccessDenied(node.clone())),
        }
    }

    /// The node key protecting `name`
    ///
    /// Found at the nearest ancestor carrying an ACL and derived down to
    /// `name` under the configured node key label.
    pub async fn get_effective_node_key(&self, name: &Name) -> Result<NodeKey, AccessControlError> {
        let (node, _) = self
            .find_acl(name)
            .await?
            .ok_or_else(|| AccessControlError::NoAcl(name.clone()))?;
        let node_key = self
            .get_latest_node_key_for_node(&node)
            .await?
            .ok_or_else(|| AccessControlError::NoNodeKey(node.clone()))?;
        Ok(node_key.compute_descendant_node_key(name, &self.context.config().node_key_label)?)
    }

    /// Cipher material provider for the content object `content_name`
    pub async fn content_keys(
        &self,
        content_name: &Name,
        publisher: Option<KeyDigest>,
    ) -> Result<DerivedContentKeys, AccessControlError> {
        let node_key = self.get_effective_node_key(content_name).await?;
        Ok(DerivedContentKeys::new(
            node_key.node_key().bytes(),
            self.context.algorithm(),
            self.context.config().content_key_label.clone(),
            content_name.clone(),
            publisher,
        )?)
    }
}
