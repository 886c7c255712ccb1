//! Access control lists
//!
//! An ACL classifies principals, given as links to their public keys, into
//! three roles: reader < writer < manager. A principal holds at most one
//! role. Entries are keyed by the unversioned target name plus the target
//! key digest, so two links to different versions of one key are the same
//! principal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::KeyDigest;
use crate::name::Name;
use crate::store::Link;

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("acl error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("acl entry for {0} has no valid role label")]
    InvalidLabel(Name),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Reader,
    Writer,
    Manager,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Reader, Role::Writer, Role::Manager];

    /// Label carried by an ACL entry of this role
    pub fn label(&self) -> &'static str {
        match self {
            Role::Reader => "r",
            Role::Writer => "rw",
            Role::Manager => "rw+",
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Role::Reader => 1,
            Role::Writer => 2,
            Role::Manager => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Role::Reader),
            "rw" => Ok(Role::Writer),
            "rw+" => Ok(Role::Manager),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclOperation {
    Add(Role, Link),
    Remove(Role, Link),
}

impl AclOperation {
    pub fn link(&self) -> &Link {
        match self {
            AclOperation::Add(_, link) | AclOperation::Remove(_, link) => link,
        }
    }
}

/// What an ACL update means for the node's keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclUpdateOutcome {
    /// Someone lost all access; existing key material must be replaced
    RekeyRequired,
    /// Principals that had no role before the batch and have one now
    Granted(Vec<Link>),
}

type EntryKey = (Name, Option<KeyDigest>);

fn entry_key(link: &Link) -> EntryKey {
    (link.target().unversioned(), link.target_digest())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    readers: BTreeMap<EntryKey, Link>,
    writers: BTreeMap<EntryKey, Link>,
    managers: BTreeMap<EntryKey, Link>,
}

/// Wire form: one labelled link per entry
#[derive(Serialize, Deserialize)]
struct EncodedAcl(Vec<Link>);

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an ACL from labelled links
    ///
    /// A later entry for the same principal replaces an earlier one.
    pub fn from_links(links: impl IntoIterator<Item = Link>) -> Result<Self, AclError> {
        let mut acl = Self::new();
        for link in links {
            let role = link
                .label()
                .and_then(|label| label.parse::<Role>().ok())
                .ok_or_else(|| AclError::InvalidLabel(link.target().clone()))?;
            acl.add(role, &link);
        }
        Ok(acl)
    }

    fn set(&self, role: Role) -> &BTreeMap<EntryKey, Link> {
        match role {
            Role::Reader => &self.readers,
            Role::Writer => &self.writers,
            Role::Manager => &self.managers,
        }
    }

    fn set_mut(&mut self, role: Role) -> &mut BTreeMap<EntryKey, Link> {
        match role {
            Role::Reader => &mut self.readers,
            Role::Writer => &mut self.writers,
            Role::Manager => &mut self.managers,
        }
    }

    fn role_for_key(&self, key: &EntryKey) -> Option<Role> {
        Role::ALL
            .into_iter()
            .rev()
            .find(|role| self.set(*role).contains_key(key))
    }

    fn level_for_key(&self, key: &EntryKey) -> u8 {
        self.role_for_key(key).map_or(0, |role| role.level())
    }

    /// Give a principal exactly `role`, dropping any other role it held
    pub fn add(&mut self, role: Role, link: &Link) {
        let key = entry_key(link);
        for other in Role::ALL {
            self.set_mut(other).remove(&key);
        }
        let entry = link.clone().with_label(role.label());
        self.set_mut(role).insert(key, entry);
    }

    /// Take `role` from a principal; a no-op unless it holds exactly that
    pub fn remove(&mut self, role: Role, link: &Link) -> bool {
        let key = entry_key(link);
        if self.set_mut(role).remove(&key).is_some() {
            return true;
        }
        tracing::debug!(
            "{} does not hold role {}, nothing to remove",
            link.target(),
            role
        );
        false
    }

    pub fn role_of(&self, link: &Link) -> Option<Role> {
        self.role_for_key(&entry_key(link))
    }

    pub fn readers(&self) -> impl Iterator<Item = &Link> {
        self.readers.values()
    }

    pub fn writers(&self) -> impl Iterator<Item = &Link> {
        self.writers.values()
    }

    pub fn managers(&self) -> impl Iterator<Item = &Link> {
        self.managers.values()
    }

    /// Every principal holding `role` or a higher one
    pub fn at_least(&self, role: Role) -> impl Iterator<Item = &Link> {
        Role::ALL
            .into_iter()
            .filter(move |other| *other >= role)
            .flat_map(|other| self.set(other).values())
    }

    /// All entries, readers first
    pub fn entries(&self) -> impl Iterator<Item = &Link> {
        self.at_least(Role::Reader)
    }

    pub fn len(&self) -> usize {
        self.readers.len() + self.writers.len() + self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a batch of operations in order
    ///
    /// Compares each touched principal's level after the batch with its
    /// level before it. If anyone went from some role to none the result is
    /// [`AclUpdateOutcome::RekeyRequired`]; otherwise it lists the
    /// principals that had no role before and have one now.
    pub fn update(&mut self, operations: &[AclOperation]) -> AclUpdateOutcome {
        let mut previous: BTreeMap<EntryKey, u8> = BTreeMap::new();
        for operation in operations {
            let key = entry_key(operation.link());
            let level = self.level_for_key(&key);
            previous.entry(key).or_insert(level);
            match operation {
                AclOperation::Add(role, link) => self.add(*role, link),
                AclOperation::Remove(role, link) => {
                    self.remove(*role, link);
                }
            }
        }

        let mut granted = Vec::new();
        for (key, before) in previous {
            let after = self.level_for_key(&key);
            if before > 0 && after == 0 {
                tracing::debug!("{} lost all access", key.0);
                return AclUpdateOutcome::RekeyRequired;
            }
            if before == 0 && after > 0 {
                if let Some(link) = self
                    .role_for_key(&key)
                    .and_then(|role| self.set(role).get(&key))
                {
                    granted.push(link.clone());
                }
            }
        }
        AclUpdateOutcome::Granted(granted)
    }

    pub fn encode(&self) -> Result<Vec<u8>, AclError> {
        Ok(bincode::serialize(&EncodedAcl(
            self.entries().cloned().collect(),
        ))?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AclError> {
        let EncodedAcl(links) = bincode::deserialize(bytes)?;
        Self::from_links(links)
    }
}
