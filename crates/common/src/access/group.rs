//! Groups
//!
//! A group is a principal whose key pair the system generates and rotates.
//! For each generation `v` of the key pair:
//!
//! - the public key is published at `<group>/_PublicKey_/<v>`
//! - the private key is stored in the key directory
//!   `<group>/_PrivateKeys_/<v>`, wrapped under a fresh nonce key
//! - the nonce key is wrapped once per member in that directory
//!
//! Adding members wraps the current nonce key for them. Removing any member
//! rotates: a new generation is created for the remaining members, the old
//! directory gets a superseded-by block pointing at the new one, and the
//! new one a previous-key link back. The membership list is saved only
//! after the keys that protect it are in place.
//!
//! Concurrent modification of one group by several writers is not
//! coordinated here.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::KeyContext;
use super::key_directory::{KeyDirectory, KeyDirectoryError};
use super::profile::PrincipalInfo;
use crate::crypto::{KeyDigest, PublicKey, Secret, SecretKey};
use crate::name::{Name, Version};
use crate::store::{ContentType, Link, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("group error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("key directory error: {0}")]
    KeyDirectory(#[from] KeyDirectoryError),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("access denied to the keys of group {0}")]
    AccessDenied(String),
    #[error("group {0} not found")]
    NotFound(String),
    #[error("group {0} already exists")]
    AlreadyExists(String),
}

/// The principals in a group, as links to their public keys
///
/// A link to an unversioned public key name means the member's newest key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipList(Vec<Link>);

impl MembershipList {
    pub fn new(members: impl IntoIterator<Item = Link>) -> Self {
        let mut list = Self::default();
        for member in members {
            list.add(member);
        }
        list
    }

    /// Add a member; false if its target was already present
    pub fn add(&mut self, member: Link) -> bool {
        if self.contains(member.target()) {
            return false;
        }
        self.0.push(member);
        true
    }

    pub fn remove(&mut self, target: &Name) -> bool {
        let before = self.0.len();
        self.0.retain(|member| member.target() != target);
        self.0.len() != before
    }

    pub fn contains(&self, target: &Name) -> bool {
        self.0.iter().any(|member| member.target() == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, GroupError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, GroupError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// One generation of a group's keys, as just written
struct KeyGeneration {
    public_key_name: Name,
    public_key: PublicKey,
    nonce_key: Secret,
    directory: KeyDirectory,
}

#[derive(Debug)]
pub struct Group {
    context: Arc<KeyContext>,
    friendly_name: String,
    public_key_name: Name,
    public_key: PublicKey,
    members: MembershipList,
    /// Known once created, rotated or resolved here
    nonce_key: Option<Secret>,
}

impl Group {
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Versioned name of the current public key
    pub fn public_key_name(&self) -> &Name {
        &self.public_key_name
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> KeyDigest {
        self.public_key.digest()
    }

    pub fn members(&self) -> &MembershipList {
        &self.members
    }

    pub fn version(&self) -> Version {
        self.public_key_name.version().unwrap_or_default()
    }

    pub fn principal(&self) -> PrincipalInfo {
        PrincipalInfo {
            is_group: true,
            friendly_name: self.friendly_name.clone(),
            version: self.version(),
        }
    }

    /// Link to this group, for membership lists and ACLs
    pub fn link(&self) -> Link {
        Link::new(
            self.context
                .profile()
                .group_public_key_name(&self.friendly_name),
        )
    }

    pub fn private_key_directory_name(&self) -> Name {
        self.context
            .profile()
            .group_private_key_directory(&self.friendly_name, self.version())
    }

    pub fn private_key_directory(&self) -> KeyDirectory {
        KeyDirectory::new(self.context.clone(), self.private_key_directory_name())
    }

    /// The current generation's private key
    ///
    /// # Errors
    ///
    /// [`GroupError::AccessDenied`] if we cannot unwrap it by any route.
    pub async fn private_key(&self) -> Result<SecretKey, GroupError> {
        match self.private_key_directory().get_private_key().await {
            Ok(private) => Ok(private),
            Err(KeyDirectoryError::AccessDenied(_)) => {
                Err(GroupError::AccessDenied(self.friendly_name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn nonce_key(&mut self) -> Result<Secret, GroupError> {
        if let Some(nonce_key) = &self.nonce_key {
            return Ok(nonce_key.clone());
        }
        let directory = self.private_key_directory();
        match directory.get_unwrapped_key(None).await? {
            Some(nonce_key) => {
                self.nonce_key = Some(nonce_key.clone());
                Ok(nonce_key)
            }
            None => Err(GroupError::AccessDenied(self.friendly_name.clone())),
        }
    }

    pub async fn add_members(&mut self, members: &[Link]) -> Result<(), GroupError> {
        self.modify(members, &[]).await
    }

    pub async fn remove_members(&mut self, members: &[Link]) -> Result<(), GroupError> {
        self.modify(&[], members).await
    }

    /// Replace the membership with exactly `members`
    pub async fn set_membership_list(&mut self, members: &[Link]) -> Result<(), GroupError> {
        let wanted = MembershipList::new(members.iter().cloned());
        let to_add: Vec<Link> = wanted
            .iter()
            .filter(|member| !self.members.contains(member.target()))
            .cloned()
            .collect();
        let to_remove: Vec<Link> = self
            .members
            .iter()
            .filter(|member| !wanted.contains(member.target()))
            .cloned()
            .collect();
        self.modify(&to_add, &to_remove).await
    }

    /// Apply a membership edit
    ///
    /// Requires access to the current nonce key. Additions only are wrapped
    /// in place; any removal rotates the group's key pair.
    pub async fn modify(&mut self, to_add: &[Link], to_remove: &[Link]) -> Result<(), GroupError> {
        let nonce_key = self.nonce_key().await?;

        let mut members = self.members.clone();
        let added: Vec<Link> = to_add
            .iter()
            .filter(|member| members.add((*member).clone()))
            .cloned()
            .collect();
        let removed = to_remove
            .iter()
            .filter(|member| members.remove(member.target()))
            .count();

        if removed > 0 {
            self.new_group_public_key(&members, nonce_key).await?;
        } else if !added.is_empty() {
            let directory = self.private_key_directory();
            for member in &added {
                directory.add_wrapped_key_block_for(&nonce_key, member).await?;
            }
        } else {
            tracing::debug!("membership of {} unchanged", self.friendly_name);
            return Ok(());
        }

        save_membership_list(&self.context, &self.friendly_name, &members).await?;
        self.members = members;
        Ok(())
    }

    /// Rotate to a fresh key pair protecting `members`
    async fn new_group_public_key(
        &mut self,
        members: &MembershipList,
        old_nonce_key: Secret,
    ) -> Result<(), GroupError> {
        let old_directory = self.private_key_directory();
        let generation =
            create_group_public_key(&self.context, &self.friendly_name, members).await?;
        let new_directory = generation.directory.versioned_name().await?.clone();

        old_directory
            .add_superseded_by_block(&old_nonce_key, &new_directory, &generation.nonce_key)
            .await?;
        generation
            .directory
            .add_previous_key_link(old_directory.name(), Some(old_nonce_key.digest()))
            .await?;

        tracing::info!(
            "rotated keys of group {}: {} -> {}",
            self.friendly_name,
            self.public_key_name,
            generation.public_key_name
        );
        self.public_key_name = generation.public_key_name;
        self.public_key = generation.public_key;
        self.nonce_key = Some(generation.nonce_key);
        Ok(())
    }

    /// Tombstone the public key and membership list
    pub async fn delete(self) -> Result<(), GroupError> {
        let profile = self.context.profile();
        let version = Version::now();
        self.context
            .publish_gone(
                profile
                    .group_public_key_name(&self.friendly_name)
                    .append_version(version),
            )
            .await?;
        self.context
            .publish_gone(
                profile
                    .group_membership_list_name(&self.friendly_name)
                    .append_version(version),
            )
            .await?;
        self.context.forget_membership(&self.friendly_name);
        tracing::info!("deleted group {}", self.friendly_name);
        Ok(())
    }
}

/// Generate and publish a new generation of a group's keys
///
/// Writes the private key wrapped under a fresh nonce key and wraps the
/// nonce key for every member before publishing the public key. The new
/// keys are cached, since we just made them.
async fn create_group_public_key(
    context: &Arc<KeyContext>,
    friendly_name: &str,
    members: &MembershipList,
) -> Result<KeyGeneration, GroupError> {
    let profile = context.profile();
    let private = SecretKey::generate();
    let public_key = private.public();
    let version = Version::now();
    let public_key_name = profile
        .group_public_key_name(friendly_name)
        .append_version(version);

    let directory = KeyDirectory::new(
        context.clone(),
        profile.group_private_key_directory(friendly_name, version),
    );
    let nonce_key = Secret::generate();
    directory.add_private_key_block(&private, &nonce_key).await?;
    for member in members.iter() {
        directory.add_wrapped_key_block_for(&nonce_key, member).await?;
    }

    context
        .publish(
            public_key_name.clone(),
            ContentType::Data,
            public_key.to_bytes().to_vec(),
        )
        .await?;

    context
        .cache()
        .put(Some(directory.name()), nonce_key.clone().into());
    context.cache().put(None, private.into());

    Ok(KeyGeneration {
        public_key_name,
        public_key,
        nonce_key,
        directory,
    })
}

async fn save_membership_list(
    context: &KeyContext,
    friendly_name: &str,
    members: &MembershipList,
) -> Result<(), GroupError> {
    let name = context
        .profile()
        .group_membership_list_name(friendly_name)
        .append_version(Version::now());
    context
        .publish(name, ContentType::Data, members.encode()?)
        .await?;
    Ok(())
}

/// Create, load and delete groups
#[derive(Debug, Clone)]
pub struct GroupManager {
    context: Arc<KeyContext>,
}

impl GroupManager {
    pub fn new(context: Arc<KeyContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<KeyContext> {
        &self.context
    }

    /// Create a group with an initial key pair and membership
    pub async fn create_group(
        &self,
        friendly_name: &str,
        members: &[Link],
    ) -> Result<Group, GroupError> {
        if self.get_group(friendly_name).await?.is_some() {
            return Err(GroupError::AlreadyExists(friendly_name.to_string()));
        }
        let members = MembershipList::new(members.iter().cloned());
        let generation = create_group_public_key(&self.context, friendly_name, &members).await?;
        save_membership_list(&self.context, friendly_name, &members).await?;
        tracing::info!(
            "created group {} with {} members",
            friendly_name,
            members.len()
        );

        Ok(Group {
            context: self.context.clone(),
            friendly_name: friendly_name.to_string(),
            public_key_name: generation.public_key_name,
            public_key: generation.public_key,
            members,
            nonce_key: Some(generation.nonce_key),
        })
    }

    /// The newest generation of a group, unless it is deleted or unknown
    pub async fn get_group(&self, friendly_name: &str) -> Result<Option<Group>, GroupError> {
        let profile = self.context.profile();
        let prefix = profile.group_public_key_name(friendly_name);
        let Some(public_key_name) = self.context.latest_version(&prefix).await? else {
            return Ok(None);
        };
        let Some(public_key) = self.context.fetch_public_key(&public_key_name).await? else {
            tracing::debug!("group {} is deleted", friendly_name);
            return Ok(None);
        };
        let members = self.membership_list(friendly_name).await?.unwrap_or_default();

        let version = public_key_name.version().unwrap_or_default();
        let nonce_key = self
            .context
            .cache()
            .get_secret_by_name(&profile.group_private_key_directory(friendly_name, version));

        Ok(Some(Group {
            context: self.context.clone(),
            friendly_name: friendly_name.to_string(),
            public_key_name,
            public_key,
            members,
            nonce_key,
        }))
    }

    /// Like [`get_group`](Self::get_group), but absence is an error
    pub async fn require_group(&self, friendly_name: &str) -> Result<Group, GroupError> {
        self.get_group(friendly_name)
            .await?
            .ok_or_else(|| GroupError::NotFound(friendly_name.to_string()))
    }

    pub async fn delete_group(&self, friendly_name: &str) -> Result<(), GroupError> {
        self.require_group(friendly_name).await?.delete().await
    }

    /// The newest membership list, `None` if absent or deleted
    pub async fn membership_list(
        &self,
        friendly_name: &str,
    ) -> Result<Option<MembershipList>, GroupError> {
        let prefix = self
            .context
            .profile()
            .group_membership_list_name(friendly_name);
        let Some(name) = self.context.latest_version(&prefix).await? else {
            return Ok(None);
        };
        match self.context.fetch_live(&name).await? {
            Some(object) => Ok(Some(MembershipList::decode(object.content())?)),
            None => Ok(None),
        }
    }

    /// Whether we are a member, directly or through nested groups
    ///
    /// Nesting is followed up to the configured resolution depth. A
    /// positive answer is remembered to order later key resolution.
    pub async fn am_current_member(&self, friendly_name: &str) -> Result<bool, GroupError> {
        let profile = self.context.profile();
        let me = profile.user_public_key_name(&self.context.config().user_name);
        let my_digests: BTreeSet<KeyDigest> = self
            .context
            .cache()
            .my_public_keys()
            .iter()
            .map(PublicKey::digest)
            .collect();
        let max_depth = self.context.config().max_resolution_depth;

        let mut pending = vec![(friendly_name.to_string(), 0usize)];
        let mut visited = BTreeSet::new();
        while let Some((group, depth)) = pending.pop() {
            if depth >= max_depth || !visited.insert(group.clone()) {
                continue;
            }
            let Some(members) = self.membership_list(&group).await? else {
                continue;
            };
            for member in members.iter() {
                let is_me = member.target().unversioned() == me
                    || member
                        .target_digest()
                        .is_some_and(|digest| my_digests.contains(&digest));
                if is_me {
                    self.context.record_membership(friendly_name);
                    return Ok(true);
                }
                if let Some((true, inner)) = profile.principal_parts(member.target()) {
                    pending.push((inner, depth + 1));
                }
            }
        }
        Ok(false)
    }
}
