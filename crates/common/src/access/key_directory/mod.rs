//! Key directories
//!
//! A key directory protects one secret (a node key, or a group's nonce
//! key) by storing it wrapped many times over under one versioned name:
//!
//! ```text
//! <dir>/<v>/keyid:<digest>    the secret wrapped under the key with <digest>
//! <dir>/<v>/p:<principal>     link to the keyid entry for that principal
//! <dir>/<v>/SupersededBy      the secret wrapped under its successor
//! <dir>/<v>/PreviousKey       link to, or wrapped copy of, the predecessor
//! <dir>/<v>/PrivateKey        a group private key wrapped under the secret
//! ```
//!
//! # Population
//!
//! A directory learns its contents by enumerating its name. Opening an
//! unversioned name first resolves the newest version
//! (`Unversioned -> ResolvingVersion -> Enumerating`). A background task
//! is the single writer of the [`DirectoryIndex`]: it merges each batch
//! into a copy and swaps it in, bumping a generation counter. Readers take
//! the current snapshot.
//!
//! Because "not observed yet" and "absent" look the same, every read first
//! waits for updates: up to the enumeration timeout while nothing has ever
//! been observed, then in rounds of the quiet period until a round brings
//! nothing new. A `None` from a read means "nothing observed in time".
//!
//! # Resolution
//!
//! [`KeyDirectory::get_unwrapped_key`] walks superseded-by links and group
//! memberships to find a route to the secret. See [`resolver`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, OnceCell};

mod index;
mod resolver;

pub use index::{DirectoryIndex, Entry};

use super::context::KeyContext;
use super::profile::{
    principal_component, wrapped_key_component, PrincipalInfo, PREVIOUS_KEY_MARKER,
    PRIVATE_KEY_MARKER, SUPERSEDED_MARKER,
};
use crate::crypto::{
    Key, KeyDigest, PublicKey, Secret, SecretKey, WrapError, WrappedKey, WrappingKey,
};
use crate::name::{Name, Version};
use crate::store::{ContentType, Enumeration, Link, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum KeyDirectoryError {
    #[error("key directory error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("wrap error: {0}")]
    Wrap(#[from] WrapError),
    #[error("no version found under {0}")]
    NoVersion(Name),
    #[error("access denied: no route to the key in {0}")]
    AccessDenied(Name),
    #[error("{name} has no {marker} block")]
    MissingBlock { name: Name, marker: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Unversioned,
    ResolvingVersion,
    Enumerating,
    Stopped,
}

/// Contents of a `PreviousKey` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousKey {
    /// Link to the previous generation's directory
    Link(Link),
    /// The previous generation's secret, wrapped under this one
    Wrapped(WrappedKey),
}

#[derive(Debug)]
struct Shared {
    index: RwLock<Arc<DirectoryIndex>>,
    state: RwLock<DirectoryState>,
    /// Set once a read has waited the full enumeration timeout
    waited: AtomicBool,
}

#[derive(Debug)]
struct Started {
    name: Name,
    generation: watch::Receiver<u64>,
}

#[derive(Debug)]
pub struct KeyDirectory {
    context: Arc<KeyContext>,
    requested: Name,
    shared: Arc<Shared>,
    started: OnceCell<Started>,
    shutdown: watch::Sender<bool>,
}

impl KeyDirectory {
    /// A directory at `name`; enumeration starts on first use
    ///
    /// An unversioned name is resolved to its newest version then.
    pub fn new(context: Arc<KeyContext>, name: Name) -> Self {
        let state = if name.has_terminal_version() {
            DirectoryState::Enumerating
        } else {
            DirectoryState::Unversioned
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            context,
            requested: name,
            shared: Arc::new(Shared {
                index: RwLock::new(Arc::new(DirectoryIndex::default())),
                state: RwLock::new(state),
                waited: AtomicBool::new(false),
            }),
            started: OnceCell::new(),
            shutdown,
        }
    }

    /// A new, empty version under the unversioned `prefix`
    pub fn create(context: Arc<KeyContext>, prefix: &Name) -> Self {
        Self::new(context, prefix.append_version(Version::now()))
    }

    /// The newest version under `prefix`, or `None` if there is none
    pub async fn open_latest(
        context: Arc<KeyContext>,
        prefix: &Name,
    ) -> Result<Option<Self>, KeyDirectoryError> {
        let directory = Self::new(context, prefix.clone());
        match directory.started().await {
            Ok(_) => Ok(Some(directory)),
            Err(KeyDirectoryError::NoVersion(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn context(&self) -> &Arc<KeyContext> {
        &self.context
    }

    /// The versioned name once resolved, else the name asked for
    pub fn name(&self) -> &Name {
        self.started
            .get()
            .map(|started| &started.name)
            .unwrap_or(&self.requested)
    }

    pub async fn versioned_name(&self) -> Result<&Name, KeyDirectoryError> {
        Ok(&self.started().await?.name)
    }

    pub fn state(&self) -> DirectoryState {
        *self.shared.state.read()
    }

    /// Stop merging new batches; what has been merged stays
    pub fn stop_enumerating(&self) {
        *self.shared.state.write() = DirectoryState::Stopped;
        let _ = self.shutdown.send(true);
        tracing::trace!("stopped enumerating {}", self.name());
    }

    async fn started(&self) -> Result<&Started, KeyDirectoryError> {
        self.started.get_or_try_init(|| self.start()).await
    }

    async fn start(&self) -> Result<Started, KeyDirectoryError> {
        let name = if self.requested.has_terminal_version() {
            self.requested.clone()
        } else {
            self.set_state(DirectoryState::ResolvingVersion);
            match self.context.latest_version(&self.requested).await? {
                Some(name) => name,
                None => {
                    self.set_state(DirectoryState::Unversioned);
                    return Err(KeyDirectoryError::NoVersion(self.requested.clone()));
                }
            }
        };

        let (generation_tx, generation) = watch::channel(0u64);
        if self.state() != DirectoryState::Stopped {
            let enumeration = self.context.store().enumerate(&name).await?;
            tracing::trace!("enumerating key directory {}", name);
            self.set_state(DirectoryState::Enumerating);
            tokio::spawn(merge_batches(
                enumeration,
                self.shared.clone(),
                generation_tx,
                self.shutdown.subscribe(),
            ));
        }
        Ok(Started { name, generation })
    }

    fn set_state(&self, state: DirectoryState) {
        let mut current = self.shared.state.write();
        if *current != DirectoryState::Stopped {
            *current = state;
        }
    }

    /// Wait for new entries, then return the current snapshot
    pub async fn refresh(&self) -> Result<Arc<DirectoryIndex>, KeyDirectoryError> {
        let started = self.started().await?;
        self.wait_for_updates(started).await;
        Ok(self.snapshot())
    }

    /// The current snapshot, without waiting
    pub fn snapshot(&self) -> Arc<DirectoryIndex> {
        self.shared.index.read().clone()
    }

    async fn wait_for_updates(&self, started: &Started) {
        if self.state() == DirectoryState::Stopped {
            return;
        }
        let config = self.context.config();
        let mut generation = started.generation.clone();
        let seen = *generation.borrow_and_update();
        let mut timeout = if seen == 0 && !self.shared.waited.load(Ordering::SeqCst) {
            config.enumeration_timeout()
        } else {
            config.quiet_period()
        };

        for _ in 0..config.max_update_rounds {
            match tokio::time::timeout(timeout, generation.changed()).await {
                Ok(Ok(())) => {
                    generation.borrow_and_update();
                    timeout = config.quiet_period();
                }
                Ok(Err(_)) | Err(_) => break,
            }
        }
        self.shared.waited.store(true, Ordering::SeqCst);
    }

    fn entry_name(&self, component: &[u8]) -> Name {
        self.name().append(component)
    }

    // Reads

    pub async fn wrapping_key_ids(&self) -> Result<Vec<KeyDigest>, KeyDirectoryError> {
        Ok(self.refresh().await?.wrapping_key_ids().copied().collect())
    }

    pub async fn principals(&self) -> Result<Vec<PrincipalInfo>, KeyDirectoryError> {
        Ok(self.refresh().await?.principals().cloned().collect())
    }

    pub async fn get_wrapped_key_for_key_id(
        &self,
        digest: &KeyDigest,
    ) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        let index = self.refresh().await?;
        self.wrapped_key_in(&index, digest).await
    }

    async fn wrapped_key_in(
        &self,
        index: &DirectoryIndex,
        digest: &KeyDigest,
    ) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        let Some(component) = index.wrapped_key_component(digest) else {
            return Ok(None);
        };
        Ok(self
            .context
            .fetch_wrapped_key(&self.entry_name(component))
            .await?)
    }

    pub async fn get_wrapped_key_for_principal(
        &self,
        principal: &PrincipalInfo,
    ) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        let index = self.refresh().await?;
        self.wrapped_key_for_principal_in(&index, principal).await
    }

    async fn wrapped_key_for_principal_in(
        &self,
        index: &DirectoryIndex,
        principal: &PrincipalInfo,
    ) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        let Some(component) = index.principal_component(principal) else {
            return Ok(None);
        };
        let Some(link) = self.context.fetch_link(&self.entry_name(component)).await? else {
            return Ok(None);
        };
        Ok(self.context.fetch_wrapped_key(link.target()).await?)
    }

    pub async fn has_superseded_block(&self) -> Result<bool, KeyDirectoryError> {
        Ok(self.refresh().await?.has_superseded_block())
    }

    pub async fn has_previous_key_block(&self) -> Result<bool, KeyDirectoryError> {
        Ok(self.refresh().await?.has_previous_key_block())
    }

    pub async fn has_private_key_block(&self) -> Result<bool, KeyDirectoryError> {
        Ok(self.refresh().await?.has_private_key_block())
    }

    pub async fn get_superseded_wrapped_key(
        &self,
    ) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        if !self.refresh().await?.has_superseded_block() {
            return Ok(None);
        }
        self.fetch_marker(SUPERSEDED_MARKER).await
    }

    /// Where the key that superseded this one lives
    pub async fn get_superseding_directory_name(&self) -> Result<Option<Name>, KeyDirectoryError> {
        Ok(self
            .get_superseded_wrapped_key()
            .await?
            .and_then(|wrapped| wrapped.wrapping_key_name().cloned()))
    }

    pub async fn get_previous_key(&self) -> Result<Option<PreviousKey>, KeyDirectoryError> {
        if !self.refresh().await?.has_previous_key_block() {
            return Ok(None);
        }
        let name = self.entry_name(PREVIOUS_KEY_MARKER.as_bytes());
        let Some(object) = self.context.fetch_live(&name).await? else {
            return Ok(None);
        };
        match object.content_type() {
            ContentType::Link => Ok(Some(PreviousKey::Link(object.as_link()?))),
            ContentType::Key => Ok(Some(PreviousKey::Wrapped(WrappedKey::decode(
                object.content(),
            )?))),
            actual => Err(StoreError::UnexpectedType {
                name,
                expected: ContentType::Link,
                actual,
            }
            .into()),
        }
    }

    pub async fn get_private_key_block(&self) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        if !self.refresh().await?.has_private_key_block() {
            return Ok(None);
        }
        self.fetch_marker(PRIVATE_KEY_MARKER).await
    }

    async fn fetch_marker(&self, marker: &str) -> Result<Option<WrappedKey>, KeyDirectoryError> {
        Ok(self
            .context
            .fetch_wrapped_key(&self.entry_name(marker.as_bytes()))
            .await?)
    }

    /// Recover the secret this directory protects
    ///
    /// `None` means no route to the key was found, not that access is
    /// impossible. A result whose digest differs from `expected` is logged
    /// and still returned.
    pub async fn get_unwrapped_key(
        &self,
        expected: Option<KeyDigest>,
    ) -> Result<Option<Secret>, KeyDirectoryError> {
        let secret = match resolver::resolve(self).await {
            Ok(secret) => secret,
            Err(KeyDirectoryError::NoVersion(name)) => {
                tracing::debug!("no version of {} to unwrap", name);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if let (Some(secret), Some(expected)) = (&secret, expected) {
            if secret.digest() != expected {
                tracing::warn!(
                    "key recovered from {} has digest {}, expected {}",
                    self.name(),
                    secret.digest(),
                    expected
                );
            }
        }
        Ok(secret)
    }

    /// Recover the private key stored in this directory
    ///
    /// # Errors
    ///
    /// [`KeyDirectoryError::AccessDenied`] when the directory's secret
    /// cannot be recovered by any route.
    pub async fn get_private_key(&self) -> Result<SecretKey, KeyDirectoryError> {
        let secret = self
            .get_unwrapped_key(None)
            .await?
            .ok_or_else(|| KeyDirectoryError::AccessDenied(self.name().clone()))?;
        let block = self
            .get_private_key_block()
            .await?
            .ok_or_else(|| KeyDirectoryError::MissingBlock {
                name: self.name().clone(),
                marker: PRIVATE_KEY_MARKER,
            })?;
        let private = block
            .unwrap(&Key::Symmetric(secret))?
            .into_private()
            .ok_or_else(|| anyhow::anyhow!("private key block holds a symmetric key"))?;
        self.context.cache().put(None, private.clone().into());
        Ok(private)
    }

    // Writes

    /// Wrap `secret` for a principal and link the principal to it
    ///
    /// The wrapped entry is named by the public key's digest, so several
    /// generations of one principal sharing a key share one entry.
    pub async fn add_wrapped_key_block(
        &self,
        secret: &Secret,
        principal_public_key_name: &Name,
        public_key: &PublicKey,
    ) -> Result<WrappedKey, KeyDirectoryError> {
        let directory = self.versioned_name().await?.clone();
        let wrapped = WrappedKey::wrap(
            &Key::Symmetric(secret.clone()),
            WrappingKey::Public(public_key),
            Some(principal_public_key_name.clone()),
        )?
        .with_wrapped_key_name(directory.clone());

        let entry = directory.append(wrapped_key_component(&public_key.digest()));
        self.context
            .publish_wrapped_key(entry.clone(), &wrapped)
            .await?;

        match self.context.profile().principal_for(principal_public_key_name) {
            Some(principal) => {
                let link = Link::new(entry).with_digest(public_key.digest());
                self.context
                    .publish_link(directory.append(principal_component(&principal)), &link)
                    .await?;
            }
            None => tracing::debug!(
                "{} is not a principal public key name, no principal link written",
                principal_public_key_name
            ),
        }
        Ok(wrapped)
    }

    /// Wrap `secret` for the principal a link points at
    ///
    /// Returns false when the principal has no published public key.
    pub async fn add_wrapped_key_block_for(
        &self,
        secret: &Secret,
        principal: &Link,
    ) -> Result<bool, KeyDirectoryError> {
        let Some((public_key_name, public_key)) =
            self.context.resolve_public_key(principal.target()).await?
        else {
            tracing::warn!("no public key for {}, not wrapping", principal.target());
            return Ok(false);
        };
        self.add_wrapped_key_block(secret, &public_key_name, &public_key)
            .await?;
        Ok(true)
    }

    /// Store a private key wrapped under this directory's secret
    pub async fn add_private_key_block(
        &self,
        private: &SecretKey,
        secret: &Secret,
    ) -> Result<(), KeyDirectoryError> {
        let directory = self.versioned_name().await?.clone();
        let wrapped = WrappedKey::wrap(
            &Key::Private(private.clone()),
            WrappingKey::Symmetric(secret),
            Some(directory.clone()),
        )?;
        self.context
            .publish_wrapped_key(directory.append(PRIVATE_KEY_MARKER), &wrapped)
            .await?;
        Ok(())
    }

    /// Mark this directory's secret as superseded by the one in
    ///  `superseding_directory`
    pub async fn add_superseded_by_block(
        &self,
        old_secret: &Secret,
        superseding_directory: &Name,
        new_secret: &Secret,
    ) -> Result<(), KeyDirectoryError> {
        let directory = self.versioned_name().await?.clone();
        let wrapped = WrappedKey::wrap(
            &Key::Symmetric(old_secret.clone()),
            WrappingKey::Symmetric(new_secret),
            Some(superseding_directory.clone()),
        )?
        .with_wrapped_key_name(directory.clone());
        self.context
            .publish_wrapped_key(directory.append(SUPERSEDED_MARKER), &wrapped)
            .await?;
        Ok(())
    }

    pub async fn add_previous_key_link(
        &self,
        previous_directory: &Name,
        previous_digest: Option<KeyDigest>,
    ) -> Result<(), KeyDirectoryError> {
        let directory = self.versioned_name().await?.clone();
        let mut link = Link::new(previous_directory.clone());
        if let Some(digest) = previous_digest {
            link = link.with_digest(digest);
        }
        self.context
            .publish_link(directory.append(PREVIOUS_KEY_MARKER), &link)
            .await?;
        Ok(())
    }

    /// Store the previous generation's secret wrapped under this one
    pub async fn add_previous_key_block(
        &self,
        previous_secret: &Secret,
        previous_directory: &Name,
        secret: &Secret,
    ) -> Result<(), KeyDirectoryError> {
        let directory = self.versioned_name().await?.clone();
        let wrapped = WrappedKey::wrap(
            &Key::Symmetric(previous_secret.clone()),
            WrappingKey::Symmetric(secret),
            Some(directory.clone()),
        )?
        .with_wrapped_key_name(previous_directory.clone());
        self.context
            .publish_wrapped_key(directory.append(PREVIOUS_KEY_MARKER), &wrapped)
            .await?;
        Ok(())
    }
}

impl Drop for KeyDirectory {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Single writer of a directory's index
async fn merge_batches(
    enumeration: Enumeration,
    shared: Arc<Shared>,
    generation: watch::Sender<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let batch = tokio::select! {
            _ = shutdown.changed() => break,
            batch = enumeration.next_batch() => batch,
        };
        let Some(batch) = batch else {
            break;
        };

        let current = shared.index.read().clone();
        let mut next = DirectoryIndex::clone(&current);
        let mut changed = false;
        for component in batch {
            changed |= next.insert(component);
        }
        if changed {
            *shared.index.write() = Arc::new(next);
            generation.send_modify(|g| *g += 1);
        }
    }
    tracing::trace!("merge task for {} finished", enumeration.prefix());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{AccessControlConfig, LocalKeyStore};
    use crate::store::MemoryContentStore;

    fn context() -> Arc<KeyContext> {
        let config = AccessControlConfig {
            enumeration_timeout_ms: 100,
            quiet_period_ms: 20,
            ..Default::default()
        };
        KeyContext::new(
            Arc::new(MemoryContentStore::new()),
            config,
            &LocalKeyStore::generate(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unversioned_directory_resolves_latest() {
        let context = context();
        let prefix: Name = "/a/_access_/_NK_".parse().unwrap();

        let missing = KeyDirectory::new(context.clone(), prefix.clone());
        assert_eq!(missing.state(), DirectoryState::Unversioned);
        assert!(matches!(
            missing.refresh().await,
            Err(KeyDirectoryError::NoVersion(_))
        ));
        assert_eq!(missing.state(), DirectoryState::Unversioned);

        let created = KeyDirectory::create(context.clone(), &prefix);
        let secret = Secret::generate();
        let kek = Secret::generate();
        created
            .add_previous_key_block(&kek, &prefix, &secret)
            .await
            .unwrap();

        let opened = KeyDirectory::open_latest(context.clone(), &prefix)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opened.name(), created.name());
        assert_eq!(opened.state(), DirectoryState::Enumerating);
        assert!(opened.has_previous_key_block().await.unwrap());
    }

    #[tokio::test]
    async fn test_reads_see_writes() {
        let context = context();
        let directory = KeyDirectory::create(context.clone(), &"/a/_access_/_NK_".parse().unwrap());
        let secret = Secret::generate();
        let alice = SecretKey::generate();
        let alice_name = context
            .profile()
            .user_public_key_name("alice")
            .append_version(Version::new(5));

        assert!(directory.wrapping_key_ids().await.unwrap().is_empty());
        directory
            .add_wrapped_key_block(&secret, &alice_name, &alice.public())
            .await
            .unwrap();

        assert_eq!(
            directory.wrapping_key_ids().await.unwrap(),
            vec![alice.digest()]
        );
        let principal = context.profile().principal_for(&alice_name).unwrap();
        assert_eq!(directory.principals().await.unwrap(), vec![principal.clone()]);

        let by_id = directory
            .get_wrapped_key_for_key_id(&alice.digest())
            .await
            .unwrap()
            .unwrap();
        let by_principal = directory
            .get_wrapped_key_for_principal(&principal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, by_principal);
        assert_eq!(by_id.wrapping_key_name(), Some(&alice_name));
        assert_eq!(
            by_id.unwrap(&alice.into()).unwrap(),
            Key::Symmetric(secret)
        );
        assert!(!directory.has_superseded_block().await.unwrap());
    }

    #[tokio::test]
    async fn test_marker_blocks() {
        let context = context();
        let prefix: Name = "/groups/eng/_PrivateKeys_".parse().unwrap();
        let old = KeyDirectory::create(context.clone(), &prefix);
        let new = KeyDirectory::create(context.clone(), &prefix);
        let old_secret = Secret::generate();
        let new_secret = Secret::generate();
        let group_private = SecretKey::generate();

        old.add_superseded_by_block(&old_secret, new.name(), &new_secret)
            .await
            .unwrap();
        new.add_previous_key_link(old.name(), Some(old_secret.digest()))
            .await
            .unwrap();
        new.add_private_key_block(&group_private, &new_secret)
            .await
            .unwrap();

        assert_eq!(
            old.get_superseding_directory_name().await.unwrap(),
            Some(new.name().clone())
        );
        let superseded = old.get_superseded_wrapped_key().await.unwrap().unwrap();
        assert_eq!(
            superseded.unwrap(&new_secret.clone().into()).unwrap(),
            Key::Symmetric(old_secret.clone())
        );

        match new.get_previous_key().await.unwrap() {
            Some(PreviousKey::Link(link)) => {
                assert_eq!(link.target(), old.name());
                assert_eq!(link.target_digest(), Some(old_secret.digest()));
            }
            other => panic!("unexpected previous key: {:?}", other),
        }
        assert!(new.has_private_key_block().await.unwrap());
        assert!(!old.has_private_key_block().await.unwrap());

        // The directory's own secret is cached, so the private key is readable
        context
            .cache()
            .put(Some(new.name()), new_secret.clone().into());
        assert_eq!(new.get_private_key().await.unwrap(), group_private);
    }

    #[tokio::test]
    async fn test_stop_enumerating_keeps_state() {
        let context = context();
        let directory = KeyDirectory::create(context.clone(), &"/a/_access_/_NK_".parse().unwrap());
        let secret = Secret::generate();
        let alice = SecretKey::generate();
        let alice_name = context
            .profile()
            .user_public_key_name("alice")
            .append_version(Version::new(1));
        directory
            .add_wrapped_key_block(&secret, &alice_name, &alice.public())
            .await
            .unwrap();
        assert_eq!(directory.wrapping_key_ids().await.unwrap().len(), 1);

        directory.stop_enumerating();
        assert_eq!(directory.state(), DirectoryState::Stopped);

        let bob = SecretKey::generate();
        let bob_name = context
            .profile()
            .user_public_key_name("bob")
            .append_version(Version::new(1));
        directory
            .add_wrapped_key_block(&secret, &bob_name, &bob.public())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(directory.wrapping_key_ids().await.unwrap(), vec![alice.digest()]);
    }
}
