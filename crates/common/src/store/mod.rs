//! Named content store
//!
//! The access-control layer never talks to a network directly. It reads and
//! writes named objects through a [`ContentStore`]:
//!
//! - `fetch` retrieves the object published under an exact name
//! - `publish` persists an object; it is durable once the call returns
//! - `enumerate` subscribes to the child components observed under a
//!   prefix, delivered as an [`Enumeration`] of batches
//!
//! Enumeration is push-based and duplicate-tolerant, and carries no
//! completion signal. "No more for now" is inferred from a timeout, so
//! [`latest_version`] retries and then reports absence rather than failing.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

mod memory;
mod object;

pub use memory::MemoryContentStore;
pub use object::{ContentObject, ContentType, Link};

use crate::name::{Component, Name, Version};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid signature on {0}")]
    InvalidSignature(Name),
    #[error("{name}: expected {expected:?} content, found {actual:?}")]
    UnexpectedType {
        name: Name,
        expected: ContentType,
        actual: ContentType,
    },
}

/// A subscription to the children of a prefix
///
/// Dropping the enumeration releases the subscription.
#[derive(Debug)]
pub struct Enumeration {
    prefix: Name,
    batches: flume::Receiver<Vec<Component>>,
}

impl Enumeration {
    pub fn new(prefix: Name, batches: flume::Receiver<Vec<Component>>) -> Self {
        Self { prefix, batches }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Everything that has already arrived, without waiting
    pub fn try_batch(&self) -> Option<Vec<Component>> {
        let mut out = Vec::new();
        while let Ok(batch) = self.batches.try_recv() {
            out.extend(batch);
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Wait for the next batch; `None` once the store has hung up
    pub async fn next_batch(&self) -> Option<Vec<Component>> {
        self.batches.recv_async().await.ok()
    }

    /// Wait up to `timeout` for new children
    ///
    /// Returns `None` when the timeout elapses or the store has hung up.
    pub async fn wait_for_new_batch(&self, timeout: Duration) -> Option<Vec<Component>> {
        if let Some(batch) = self.try_batch() {
            return Some(batch);
        }
        match tokio::time::timeout(timeout, self.batches.recv_async()).await {
            Ok(Ok(mut batch)) => {
                if let Some(more) = self.try_batch() {
                    batch.extend(more);
                }
                Some(batch)
            }
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync + Debug + 'static {
    /// The object published under exactly `name`, if any
    async fn fetch(&self, name: &Name) -> Result<Option<ContentObject>, StoreError>;

    /// Persist an object under its own name
    async fn publish(&self, object: ContentObject) -> Result<(), StoreError>;

    /// Subscribe to child components of `prefix`, starting with those
    ///  already known
    async fn enumerate(&self, prefix: &Name) -> Result<Enumeration, StoreError>;

    /// Fetch and check the object's signature
    async fn fetch_verified(&self, name: &Name) -> Result<Option<ContentObject>, StoreError> {
        match self.fetch(name).await? {
            Some(object) => {
                object.verify()?;
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }
}

/// How long to look for versions under a prefix
#[derive(Debug, Clone, Copy)]
pub struct VersionQuery {
    /// Wait for the first version to appear, per attempt
    pub timeout: Duration,
    /// Once versions appear, stop after this long with nothing new
    pub quiet_period: Duration,
    /// Attempts before reporting that there is no version
    pub attempts: usize,
}

/// Find the newest version published directly under `prefix`
///
/// Returns the versioned name, or `None` if no version appeared within
/// the allotted attempts.
pub async fn latest_version(
    store: &dyn ContentStore,
    prefix: &Name,
    query: VersionQuery,
) -> Result<Option<Name>, StoreError> {
    let enumeration = store.enumerate(prefix).await?;
    let mut versions = BTreeSet::new();

    for attempt in 0..query.attempts.max(1) {
        if let Some(batch) = enumeration.wait_for_new_batch(query.timeout).await {
            versions.extend(batch.iter().filter_map(|c| Version::from_component(c)));
        }
        if !versions.is_empty() {
            break;
        }
        tracing::debug!(
            "no version under {} yet (attempt {} of {})",
            prefix,
            attempt + 1,
            query.attempts
        );
    }

    if versions.is_empty() {
        return Ok(None);
    }

    // Drain anything still arriving so a burst of rotations resolves to the newest
    while let Some(batch) = enumeration.wait_for_new_batch(query.quiet_period).await {
        versions.extend(batch.iter().filter_map(|c| Version::from_component(c)));
    }

    Ok(versions
        .last()
        .map(|version| prefix.append_version(*version)))
}
