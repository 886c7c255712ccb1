use std::collections::HashMap;

use parking_lot::RwLock;

use crate::crypto::{Key, KeyDigest, PublicKey, Secret, SecretKey};
use crate::name::Name;

/// Process-wide lookup from key digest to known key material
///
/// Three indices are consulted in order: keys put by resolution, our own
/// private keys (seeded from the local key store), and private keys of
/// other principals we have recovered (group keys). Entries are never
/// evicted.
#[derive(Debug, Default)]
pub struct KeyCache {
    inner: RwLock<KeyCacheInner>,
}

#[derive(Debug, Default)]
struct KeyCacheInner {
    keys: HashMap<KeyDigest, Key>,
    my_private_keys: HashMap<KeyDigest, SecretKey>,
    others_private_keys: HashMap<KeyDigest, SecretKey>,
    names: HashMap<KeyDigest, Name>,
    by_name: HashMap<Name, KeyDigest>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_private_keys<'a>(keys: impl IntoIterator<Item = &'a SecretKey>) -> Self {
        let cache = Self::new();
        for key in keys {
            cache.add_my_private_key(key.clone());
        }
        cache
    }

    pub fn add_my_private_key(&self, key: SecretKey) {
        let mut inner = self.inner.write();
        inner.my_private_keys.insert(key.digest(), key);
    }

    /// Remember `key`, optionally under the name it was stored at
    pub fn put(&self, name: Option<&Name>, key: Key) -> KeyDigest {
        let digest = key.digest();
        let mut inner = self.inner.write();
        if let Some(name) = name {
            inner.names.insert(digest, name.clone());
            inner.by_name.insert(name.clone(), digest);
        }
        match key {
            Key::Private(private) => {
                if !inner.my_private_keys.contains_key(&digest) {
                    inner.others_private_keys.insert(digest, private);
                }
            }
            symmetric => {
                inner.keys.insert(digest, symmetric);
            }
        }
        digest
    }

    pub fn get(&self, digest: &KeyDigest) -> Option<Key> {
        let inner = self.inner.read();
        if let Some(key) = inner.keys.get(digest) {
            return Some(key.clone());
        }
        if let Some(key) = inner.my_private_keys.get(digest) {
            return Some(Key::Private(key.clone()));
        }
        inner
            .others_private_keys
            .get(digest)
            .map(|key| Key::Private(key.clone()))
    }

    pub fn contains_key(&self, digest: &KeyDigest) -> bool {
        let inner = self.inner.read();
        inner.keys.contains_key(digest)
            || inner.my_private_keys.contains_key(digest)
            || inner.others_private_keys.contains_key(digest)
    }

    pub fn get_secret(&self, digest: &KeyDigest) -> Option<Secret> {
        self.get(digest).and_then(Key::into_secret)
    }

    pub fn get_private_key(&self, digest: &KeyDigest) -> Option<SecretKey> {
        self.get(digest).and_then(Key::into_private)
    }

    /// The key last stored under `name`
    pub fn get_by_name(&self, name: &Name) -> Option<Key> {
        let digest = *self.inner.read().by_name.get(name)?;
        self.get(&digest)
    }

    pub fn get_secret_by_name(&self, name: &Name) -> Option<Secret> {
        self.get_by_name(name).and_then(Key::into_secret)
    }

    pub fn name_for(&self, digest: &KeyDigest) -> Option<Name> {
        self.inner.read().names.get(digest).cloned()
    }

    pub fn is_my_private_key(&self, digest: &KeyDigest) -> bool {
        self.inner.read().my_private_keys.contains_key(digest)
    }

    /// Public halves of our own private keys
    pub fn my_public_keys(&self) -> Vec<PublicKey> {
        self.inner
            .read()
            .my_private_keys
            .values()
            .map(SecretKey::public)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup_across_indices() {
        let mine = SecretKey::generate();
        let cache = KeyCache::with_private_keys([&mine]);
        assert!(cache.contains_key(&mine.digest()));
        assert!(cache.is_my_private_key(&mine.digest()));
        assert_eq!(cache.get_private_key(&mine.digest()), Some(mine.clone()));

        let group_private = SecretKey::generate();
        let secret = Secret::generate();
        let node: Name = "/a/_access_/_NK_".parse().unwrap();
        cache.put(None, group_private.clone().into());
        cache.put(Some(&node), secret.clone().into());

        assert_eq!(cache.get_private_key(&group_private.digest()), Some(group_private.clone()));
        assert!(!cache.is_my_private_key(&group_private.digest()));
        assert_eq!(cache.get_secret(&secret.digest()), Some(secret.clone()));
        assert_eq!(cache.get_by_name(&node), Some(Key::Symmetric(secret.clone())));
        assert_eq!(cache.name_for(&secret.digest()), Some(node));
        assert!(cache.get(&KeyDigest::of(b"unknown")).is_none());
    }

    #[test]
    fn test_own_key_stays_in_own_index() {
        let mine = SecretKey::generate();
        let cache = KeyCache::with_private_keys([&mine]);
        cache.put(None, mine.clone().into());
        assert!(cache.is_my_private_key(&mine.digest()));
        assert_eq!(cache.my_public_keys(), vec![mine.public()]);
    }
}
