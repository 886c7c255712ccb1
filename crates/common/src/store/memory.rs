use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ContentObject, ContentStore, Enumeration, StoreError};
use crate::name::{Component, Name};

/// In-memory content store
///
/// Clones share the same underlying objects. Enumeration batches can be
/// delayed to simulate a slow network.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<RwLock<MemoryContentStoreInner>>,
    delivery_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryContentStoreInner {
    /// Every published object by exact name
    objects: BTreeMap<Name, ContentObject>,
    /// Live enumerations
    subscribers: Vec<Subscriber>,
}

#[derive(Debug)]
struct Subscriber {
    prefix: Name,
    batches: flume::Sender<Vec<Component>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver enumeration batches only after `delay`
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = Some(delay);
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of every object stored under `prefix`
    pub fn names_under(&self, prefix: &Name) -> Vec<Name> {
        let inner = self.inner.read();
        inner
            .objects
            .range(prefix.clone()..)
            .take_while(|(name, _)| prefix.is_prefix_of(name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn deliver(&self, sender: flume::Sender<Vec<Component>>, batch: Vec<Component>) {
        match self.delivery_delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sender.send(batch);
                });
            }
            None => {
                let _ = sender.send(batch);
            }
        }
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, name: &Name) -> Result<Option<ContentObject>, StoreError> {
        Ok(self.inner.read().objects.get(name).cloned())
    }

    async fn publish(&self, object: ContentObject) -> Result<(), StoreError> {
        let name = object.name().clone();
        let notify = {
            let mut inner = self.inner.write();
            if inner.objects.insert(name.clone(), object).is_some() {
                tracing::debug!("replaced existing object at {}", name);
            }
            inner.subscribers.retain(|s| !s.batches.is_disconnected());
            inner
                .subscribers
                .iter()
                .filter(|s| s.prefix.is_strict_prefix_of(&name))
                .filter_map(|s| {
                    name.component(s.prefix.len())
                        .map(|child| (s.batches.clone(), vec![child.to_vec()]))
                })
                .collect::<Vec<_>>()
        };

        for (sender, batch) in notify {
            self.deliver(sender, batch);
        }
        Ok(())
    }

    async fn enumerate(&self, prefix: &Name) -> Result<Enumeration, StoreError> {
        let (sender, receiver) = flume::unbounded();
        let existing = {
            let mut inner = self.inner.write();
            let children: BTreeSet<Component> = inner
                .objects
                .range(prefix.clone()..)
                .take_while(|(name, _)| prefix.is_prefix_of(name))
                .filter_map(|(name, _)| name.component(prefix.len()).map(|c| c.to_vec()))
                .collect();
            inner.subscribers.push(Subscriber {
                prefix: prefix.clone(),
                batches: sender.clone(),
            });
            children
        };

        tracing::trace!("enumerating {} ({} known children)", prefix, existing.len());
        if !existing.is_empty() {
            self.deliver(sender, existing.into_iter().collect());
        }
        Ok(Enumeration::new(prefix.clone(), receiver))
    }
}
