use std::collections::{BTreeMap, BTreeSet};

use crate::access::profile::{
    parse_principal_component, parse_wrapped_key_component, PrincipalInfo,
    PREVIOUS_KEY_MARKER, PRIVATE_KEY_MARKER, SUPERSEDED_MARKER,
};
use crate::crypto::KeyDigest;
use crate::name::Component;

/// What a directory child name denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A wrapped key, under the key with this digest
    WrappedKey(KeyDigest),
    /// A principal link to one of the wrapped keys
    Principal(PrincipalInfo),
    /// A marker block or an unrecognised name
    Other,
}

impl Entry {
    /// Classify by name syntax alone
    pub fn classify(component: &[u8]) -> Self {
        if let Some(digest) = parse_wrapped_key_component(component) {
            return Entry::WrappedKey(digest);
        }
        if let Some(principal) = parse_principal_component(component) {
            return Entry::Principal(principal);
        }
        Entry::Other
    }
}

/// Point-in-time view of a directory's observed children
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    wrapping_keys: BTreeMap<KeyDigest, Component>,
    principals: BTreeMap<PrincipalInfo, Component>,
    other_names: BTreeSet<Component>,
}

impl DirectoryIndex {
    /// Merge one child; returns false if it was already known
    pub fn insert(&mut self, component: Component) -> bool {
        match Entry::classify(&component) {
            Entry::WrappedKey(digest) => self.wrapping_keys.insert(digest, component).is_none(),
            Entry::Principal(principal) => self.principals.insert(principal, component).is_none(),
            Entry::Other => self.other_names.insert(component),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wrapping_keys.is_empty() && self.principals.is_empty() && self.other_names.is_empty()
    }

    pub fn wrapping_key_ids(&self) -> impl Iterator<Item = &KeyDigest> {
        self.wrapping_keys.keys()
    }

    pub fn wrapped_key_component(&self, digest: &KeyDigest) -> Option<&Component> {
        self.wrapping_keys.get(digest)
    }

    pub fn principals(&self) -> impl Iterator<Item = &PrincipalInfo> {
        self.principals.keys()
    }

    pub fn principal_component(&self, principal: &PrincipalInfo) -> Option<&Component> {
        self.principals.get(principal)
    }

    pub fn has_other(&self, marker: &str) -> bool {
        self.other_names.contains(marker.as_bytes())
    }

    pub fn has_superseded_block(&self) -> bool {
        self.has_other(SUPERSEDED_MARKER)
    }

    pub fn has_previous_key_block(&self) -> bool {
        self.has_other(PREVIOUS_KEY_MARKER)
    }

    pub fn has_private_key_block(&self) -> bool {
        self.has_other(PRIVATE_KEY_MARKER)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access::profile::{principal_component, wrapped_key_component};
    use crate::name::Version;

    #[test]
    fn test_classification_is_idempotent() {
        let digest = KeyDigest::of(b"k");
        let principal = PrincipalInfo {
            is_group: false,
            friendly_name: "bob".to_string(),
            version: Version::new(3),
        };
        let children = vec![
            wrapped_key_component(&digest),
            principal_component(&principal),
            SUPERSEDED_MARKER.as_bytes().to_vec(),
            b"unrecognised".to_vec(),
        ];

        let mut index = DirectoryIndex::default();
        for child in children.clone() {
            assert!(index.insert(child));
        }
        for child in children {
            assert!(!index.insert(child));
        }

        assert_eq!(index.wrapping_key_ids().collect::<Vec<_>>(), vec![&digest]);
        assert_eq!(index.principals().collect::<Vec<_>>(), vec![&principal]);
        assert!(index.has_superseded_block());
        assert!(!index.has_private_key_block());
        assert!(index.has_other("unrecognised"));
    }

    #[test]
    fn test_entry_classification() {
        let digest = KeyDigest::of(b"k");
        assert_eq!(
            Entry::classify(&wrapped_key_component(&digest)),
            Entry::WrappedKey(digest)
        );
        assert_eq!(Entry::classify(PRIVATE_KEY_MARKER.as_bytes()), Entry::Other);
        assert_eq!(Entry::classify(b""), Entry::Other);
    }
}
