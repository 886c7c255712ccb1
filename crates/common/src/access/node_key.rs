use std::fmt;

use crate::crypto::{derive_key, KdfError, KeyDigest, Secret, SECRET_SIZE};
use crate::name::Name;

#[derive(Debug, thiserror::Error)]
pub enum NodeKeyError {
    #[error("node key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("{descendant} is not under {node}")]
    NotDescendant { node: Name, descendant: Name },
    #[error("kdf error: {0}")]
    Kdf(#[from] KdfError),
}

/// A symmetric key bound to a node of the name tree
///
/// A native node key is stored in the key directory at
/// `stored_node_key_name`. A derived one is computed from an ancestor's
/// native key and keeps pointing at that ancestor's directory.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeKey {
    node_name: Name,
    stored_node_key_name: Name,
    stored_node_key_id: KeyDigest,
    key: Secret,
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("node_name", &self.node_name)
            .field("stored_node_key_name", &self.stored_node_key_name)
            .field("key", &self.key)
            .finish()
    }
}

impl NodeKey {
    /// A native node key stored at `stored_node_key_name`
    pub fn new(node_name: Name, stored_node_key_name: Name, key: Secret) -> Self {
        Self {
            node_name,
            stored_node_key_id: key.digest(),
            stored_node_key_name,
            key,
        }
    }

    pub fn node_name(&self) -> &Name {
        &self.node_name
    }

    /// Versioned name of the key directory holding the stored key
    pub fn stored_node_key_name(&self) -> &Name {
        &self.stored_node_key_name
    }

    pub fn stored_node_key_id(&self) -> KeyDigest {
        self.stored_node_key_id
    }

    pub fn node_key(&self) -> &Secret {
        &self.key
    }

    pub fn key_id(&self) -> KeyDigest {
        self.key.digest()
    }

    /// True when this key was computed rather than stored
    pub fn is_derived(&self) -> bool {
        self.stored_node_key_id != self.key.digest()
    }

    /// The key for `descendant`, derived under `label`
    ///
    /// Returns a copy of this key when `descendant` is this node.
    pub fn compute_descendant_node_key(
        &self,
        descendant: &Name,
        label: &str,
    ) -> Result<NodeKey, NodeKeyError> {
        if !self.node_name.is_prefix_of(descendant) {
            return Err(NodeKeyError::NotDescendant {
                node: self.node_name.clone(),
                descendant: descendant.clone(),
            });
        }
        if self.node_name == *descendant {
            return Ok(self.clone());
        }
        let derived = derive_key(self.key.bytes(), label, &[descendant], SECRET_SIZE * 8)?;
        Ok(NodeKey {
            node_name: descendant.clone(),
            stored_node_key_name: self.stored_node_key_name.clone(),
            stored_node_key_id: self.stored_node_key_id,
            key: Secret::from_slice(&derived).map_err(anyhow::Error::from)?,
        })
    }
}
