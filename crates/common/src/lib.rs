/**
 * Access control over named content.
 *  Node keys, key directories, groups
 *  and ACLs, built on a content store.
 */
pub mod access;
/**
 * Configuration and the local key store
 *  holding our identity.
 */
pub mod config;
/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - Key derivation and content keys
 *  - Key-to-key key wrapping
 */
pub mod crypto;
/**
 * Hierarchical names and version
 *  components.
 */
pub mod name;
/**
 * Content store interface.
 *  Signed objects, enumeration and an
 *  in-memory implementation
 */
pub mod store;

pub mod prelude {
    pub use crate::access::{
        Acl, AclOperation, AccessControlManager, GroupManager, KeyContext, KeyDirectory, NodeKey,
        Role,
    };
    pub use crate::config::{AccessControlConfig, LocalKeyStore};
    pub use crate::crypto::{ContentKeys, PublicKey, Secret, SecretKey};
    pub use crate::name::{Name, Version};
    pub use crate::store::{ContentStore, Link, MemoryContentStore};
}
