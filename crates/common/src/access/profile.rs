//! Naming conventions for access-control objects
//!
//! ```text
//! <user_root>/<user>/_PublicKey_/<v>             user public key
//! <group_root>/<group>/_PublicKey_/<v>           group public key
//! <group_root>/<group>/_MembershipList_/<v>      group membership list
//! <group_root>/<group>/_PrivateKeys_/<v>         group private key directory,
//!                                                  versioned like the public key
//! <node>/_access_/_NK_/<v>                       node key directory
//! <node>/_access_/_ACL_/<v>                      node ACL
//! ```
//!
//! Inside a key directory, entries are named by a single component:
//!
//! - `keyid:` + 32-byte digest: a wrapped key, under the key with that digest
//! - `p:` + `G`|`U` + 8-byte version + friendly name: a principal link
//!   pointing at one of the wrapped-key entries
//! - `SupersededBy`, `PreviousKey`, `PrivateKey`: the marker blocks

use std::fmt;

use crate::config::{AccessControlConfig, ConfigError};
use crate::crypto::KeyDigest;
use crate::name::{Component, Name, Version};

pub const ACCESS_COMPONENT: &str = "_access_";
pub const NODE_KEY_COMPONENT: &str = "_NK_";
pub const ACL_COMPONENT: &str = "_ACL_";
pub const PUBLIC_KEY_COMPONENT: &str = "_PublicKey_";
pub const MEMBERSHIP_LIST_COMPONENT: &str = "_MembershipList_";
pub const PRIVATE_KEYS_COMPONENT: &str = "_PrivateKeys_";

pub const SUPERSEDED_MARKER: &str = "SupersededBy";
pub const PREVIOUS_KEY_MARKER: &str = "PreviousKey";
pub const PRIVATE_KEY_MARKER: &str = "PrivateKey";

const WRAPPED_KEY_PREFIX: &[u8] = b"keyid:";
const PRINCIPAL_PREFIX: &[u8] = b"p:";
const GROUP_TAG: u8 = b'G';
const USER_TAG: u8 = b'U';

/// A specific generation of a user or group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrincipalInfo {
    pub is_group: bool,
    pub friendly_name: String,
    pub version: Version,
}

impl fmt::Display for PrincipalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_group { "group" } else { "user" };
        write!(f, "{} {} ({})", kind, self.friendly_name, self.version)
    }
}

/// Entry component for a wrapped key under `digest`
pub fn wrapped_key_component(digest: &KeyDigest) -> Component {
    let mut component = WRAPPED_KEY_PREFIX.to_vec();
    component.extend_from_slice(digest.as_bytes());
    component
}

pub fn parse_wrapped_key_component(component: &[u8]) -> Option<KeyDigest> {
    component
        .strip_prefix(WRAPPED_KEY_PREFIX)
        .and_then(KeyDigest::from_slice)
}

/// Entry component for a principal link
pub fn principal_component(principal: &PrincipalInfo) -> Component {
    let mut component = PRINCIPAL_PREFIX.to_vec();
    component.push(if principal.is_group { GROUP_TAG } else { USER_TAG });
    component.extend_from_slice(&principal.version.micros().to_be_bytes());
    component.extend_from_slice(principal.friendly_name.as_bytes());
    component
}

pub fn parse_principal_component(component: &[u8]) -> Option<PrincipalInfo> {
    let rest = component.strip_prefix(PRINCIPAL_PREFIX)?;
    let (tag, rest) = rest.split_first()?;
    let is_group = match *tag {
        GROUP_TAG => true,
        USER_TAG => false,
        _ => return None,
    };
    if rest.len() <= 8 {
        return None;
    }
    let (version, friendly_name) = rest.split_at(8);
    let mut buff = [0u8; 8];
    buff.copy_from_slice(version);
    Some(PrincipalInfo {
        is_group,
        friendly_name: String::from_utf8(friendly_name.to_vec()).ok()?,
        version: Version::new(u64::from_be_bytes(buff)),
    })
}

/// Where users and groups live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingProfile {
    user_root: Name,
    group_root: Name,
}

impl NamingProfile {
    pub fn new(user_root: Name, group_root: Name) -> Self {
        Self {
            user_root,
            group_root,
        }
    }

    pub fn from_config(config: &AccessControlConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.user_root()?, config.group_root()?))
    }

    pub fn user_root(&self) -> &Name {
        &self.user_root
    }

    pub fn group_root(&self) -> &Name {
        &self.group_root
    }

    pub fn user_public_key_name(&self, user: &str) -> Name {
        self.user_root.append(user).append(PUBLIC_KEY_COMPONENT)
    }

    pub fn group_public_key_name(&self, group: &str) -> Name {
        self.group_root.append(group).append(PUBLIC_KEY_COMPONENT)
    }

    pub fn group_membership_list_name(&self, group: &str) -> Name {
        self.group_root.append(group).append(MEMBERSHIP_LIST_COMPONENT)
    }

    /// Private key directory for one generation of a group's key pair
    pub fn group_private_key_directory(&self, group: &str, version: Version) -> Name {
        self.group_root
            .append(group)
            .append(PRIVATE_KEYS_COMPONENT)
            .append_version(version)
    }

    /// Unversioned node key directory for `node`
    pub fn node_key_directory(&self, node: &Name) -> Name {
        node.append(ACCESS_COMPONENT).append(NODE_KEY_COMPONENT)
    }

    /// Unversioned ACL name for `node`
    pub fn acl_name(&self, node: &Name) -> Name {
        node.append(ACCESS_COMPONENT).append(ACL_COMPONENT)
    }

    /// Public key name of a principal generation
    pub fn principal_public_key_name(&self, principal: &PrincipalInfo) -> Name {
        let base = if principal.is_group {
            self.group_public_key_name(&principal.friendly_name)
        } else {
            self.user_public_key_name(&principal.friendly_name)
        };
        base.append_version(principal.version)
    }

    /// Identify the principal owning a versioned public key name
    pub fn principal_for(&self, public_key_name: &Name) -> Option<PrincipalInfo> {
        let version = public_key_name.version()?;
        let (is_group, friendly_name) = self.principal_parts(public_key_name)?;
        Some(PrincipalInfo {
            is_group,
            friendly_name,
            version,
        })
    }

    /// Whether a public key name, versioned or not, belongs to a group,
    ///  and the principal's friendly name
    pub fn principal_parts(&self, public_key_name: &Name) -> Option<(bool, String)> {
        let (root, is_group) = if self.group_root.is_strict_prefix_of(public_key_name) {
            (&self.group_root, true)
        } else if self.user_root.is_strict_prefix_of(public_key_name) {
            (&self.user_root, false)
        } else {
            return None;
        };
        let friendly = public_key_name.component(root.len())?;
        if public_key_name.component(root.len() + 1) != Some(PUBLIC_KEY_COMPONENT.as_bytes()) {
            return None;
        }
        Some((is_group, String::from_utf8(friendly.to_vec()).ok()?))
    }

    /// True for names inside any node's access-control namespace
    pub fn is_access_name(name: &Name) -> bool {
        name.components()
            .iter()
            .any(|c| c.as_slice() == ACCESS_COMPONENT.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn profile() -> NamingProfile {
        NamingProfile::new("/users".parse().unwrap(), "/groups".parse().unwrap())
    }

    #[test]
    fn test_entry_components() {
        let digest = KeyDigest::of(b"wrapping");
        let component = wrapped_key_component(&digest);
        assert_eq!(parse_wrapped_key_component(&component), Some(digest));
        assert_eq!(parse_wrapped_key_component(b"keyid:short"), None);

        let principal = PrincipalInfo {
            is_group: true,
            friendly_name: "engineering".to_string(),
            version: Version::new(1234),
        };
        let component = principal_component(&principal);
        assert_eq!(parse_principal_component(&component), Some(principal));
        assert_eq!(parse_principal_component(&component[..10]), None);
        assert_eq!(parse_principal_component(SUPERSEDED_MARKER.as_bytes()), None);
    }

    #[test]
    fn test_principal_for_public_key_names() {
        let profile = profile();
        let user = PrincipalInfo {
            is_group: false,
            friendly_name: "alice".to_string(),
            version: Version::new(7),
        };
        let name = profile.principal_public_key_name(&user);
        assert_eq!(name.to_string(), "/users/alice/_PublicKey_/%FD%07");
        assert_eq!(profile.principal_for(&name), Some(user));

        let group = PrincipalInfo {
            is_group: true,
            friendly_name: "eng".to_string(),
            version: Version::new(9),
        };
        assert_eq!(
            profile.principal_for(&profile.principal_public_key_name(&group)),
            Some(group)
        );

        // Unversioned, or not a public key
        assert_eq!(
            profile.principal_for(&profile.user_public_key_name("alice")),
            None
        );
        let list = profile
            .group_membership_list_name("eng")
            .append_version(Version::new(1));
        assert_eq!(profile.principal_for(&list), None);
    }

    #[test]
    fn test_access_names() {
        let profile = profile();
        let node: Name = "/parc/docs".parse().unwrap();
        assert!(NamingProfile::is_access_name(&profile.acl_name(&node)));
        assert!(NamingProfile::is_access_name(
            &profile.node_key_directory(&node)
        ));
        assert!(!NamingProfile::is_access_name(&node));
    }
}
