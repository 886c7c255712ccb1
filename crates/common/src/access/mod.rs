//! Key distribution for access-controlled content
//!
//! Symmetric node keys protect subtrees of the name space. They are stored
//! in [`key_directory::KeyDirectory`]s, wrapped once per principal allowed
//! to read them, and found again by walking superseded-by chains and group
//! memberships until a key we hold opens one of the wrapped entries.
//!
//! - [`profile`]: where users, groups, ACLs and node keys are named
//! - [`key_cache`]: keys we already know, by digest and by name
//! - [`context`]: the store, cache and identity every operation runs with
//! - [`key_directory`]: reading, resolving and writing key directories
//! - [`node_key`]: node keys and their derivation down the name tree
//! - [`group`]: groups and the rotation of their key pairs
//! - [`acl`]: roles and ACL updates
//! - [`manager`]: ACL-driven node key management

pub mod acl;
pub mod context;
pub mod group;
pub mod key_cache;
pub mod key_directory;
pub mod manager;
pub mod node_key;
pub mod profile;

pub use acl::{Acl, AclError, AclOperation, AclUpdateOutcome, Role};
pub use context::KeyContext;
pub use group::{Group, GroupError, GroupManager, MembershipList};
pub use key_cache::KeyCache;
pub use key_directory::{DirectoryState, KeyDirectory, KeyDirectoryError, PreviousKey};
pub use manager::{AccessControlError, AccessControlManager};
pub use node_key::{NodeKey, NodeKeyError};
pub use profile::{NamingProfile, PrincipalInfo};
