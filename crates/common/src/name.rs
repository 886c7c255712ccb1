//! Hierarchical binary names
//!
//! Content and key-bearing objects are addressed by a [`Name`]: an ordered
//! sequence of opaque binary components. Names compare lexicographically,
//! component by component, so every name sorts directly after its prefixes.
//!
//! A component beginning with [`VERSION_MARKER`] is a version component.
//! Versions are microsecond timestamps, and [`Version::now`] never issues
//! the same value twice within one process.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// First byte of every version component
pub const VERSION_MARKER: u8 = 0xFD;

/// A single opaque name component
pub type Component = Vec<u8>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name must start with '/': {0}")]
    NotAbsolute(String),
    #[error("invalid escape sequence in name: {0}")]
    InvalidEscape(String),
}

/// A version timestamp, in microseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Version(u64);

static LAST_ISSUED_VERSION: AtomicU64 = AtomicU64::new(0);

impl Version {
    pub fn new(micros: u64) -> Self {
        Version(micros)
    }

    /// Current wall-clock time as a version, strictly greater than any
    /// version previously issued by this process
    pub fn now() -> Self {
        let now = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as u64;
        let mut last = LAST_ISSUED_VERSION.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match LAST_ISSUED_VERSION.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Version(next),
                Err(observed) => last = observed,
            }
        }
    }

    pub fn micros(&self) -> u64 {
        self.0
    }

    /// Encode as a name component: marker byte followed by the minimal
    /// big-endian encoding of the timestamp
    pub fn to_component(&self) -> Component {
        let bytes = self.0.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let mut component = Vec::with_capacity(1 + bytes.len() - skip);
        component.push(VERSION_MARKER);
        component.extend_from_slice(&bytes[skip..]);
        component
    }

    pub fn from_component(component: &[u8]) -> Option<Self> {
        match component.split_first() {
            Some((&VERSION_MARKER, rest)) if rest.len() <= 8 => {
                let mut buff = [0u8; 8];
                buff[8 - rest.len()..].copy_from_slice(rest);
                Some(Version(u64::from_be_bytes(buff)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An immutable hierarchical name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty (root) name, `/`
    pub fn root() -> Self {
        Name(Vec::new())
    }

    pub fn from_components<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        Name(components.into_iter().map(Into::into).collect())
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn component(&self, index: usize) -> Option<&[u8]> {
        self.0.get(index).map(Vec::as_slice)
    }

    pub fn last_component(&self) -> Option<&[u8]> {
        self.0.last().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new name with `component` appended
    pub fn append(&self, component: impl AsRef<[u8]>) -> Self {
        let mut components = self.0.clone();
        components.push(component.as_ref().to_vec());
        Name(components)
    }

    pub fn append_name(&self, other: &Name) -> Self {
        let mut components = self.0.clone();
        components.extend(other.0.iter().cloned());
        Name(components)
    }

    pub fn append_version(&self, version: Version) -> Self {
        self.append(version.to_component())
    }

    /// The first `count` components of this name
    pub fn prefix(&self, count: usize) -> Self {
        Name(self.0[..count.min(self.0.len())].to_vec())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.prefix(self.0.len() - 1))
        }
    }

    /// True when `self` is a (non-strict) prefix of `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    pub fn is_strict_prefix_of(&self, other: &Name) -> bool {
        other.0.len() > self.0.len() && self.is_prefix_of(other)
    }

    /// Index of the last version component, if any
    fn last_version_index(&self) -> Option<usize> {
        self.0
            .iter()
            .rposition(|c| Version::from_component(c).is_some())
    }

    pub fn is_versioned(&self) -> bool {
        self.last_version_index().is_some()
    }

    /// Whether the last component is a version
    pub fn has_terminal_version(&self) -> bool {
        self.last_component()
            .is_some_and(|c| Version::from_component(c).is_some())
    }

    /// The version of the last version component
    pub fn version(&self) -> Option<Version> {
        self.last_version_index()
            .and_then(|i| Version::from_component(&self.0[i]))
    }

    /// Strip the last version component and everything after it
    pub fn unversioned(&self) -> Self {
        match self.last_version_index() {
            Some(i) => self.prefix(i),
            None => self.clone(),
        }
    }

    /// Canonical binary encoding: component count followed by each
    /// length-prefixed component, all lengths 4-byte big-endian
    pub fn encode(&self) -> Vec<u8> {
        let size = 4 + self.0.iter().map(|c| 4 + c.len()).sum::<usize>();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        for component in &self.0 {
            out.extend_from_slice(&(component.len() as u32).to_be_bytes());
            out.extend_from_slice(component);
        }
        out
    }
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~' | b'+' | b'=' | b':')
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for component in &self.0 {
            write!(f, "/")?;
            for byte in component {
                if is_plain(*byte) {
                    write!(f, "{}", *byte as char)?;
                } else {
                    write!(f, "%{:02X}", byte)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| NameError::NotAbsolute(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Name::root());
        }
        let mut components = Vec::new();
        for part in rest.split('/') {
            let bytes = part.as_bytes();
            let mut component = Vec::with_capacity(bytes.len());
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'%' {
                    let hex = bytes
                        .get(i + 1..i + 3)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| NameError::InvalidEscape(s.to_string()))?;
                    component.push(hex);
                    i += 3;
                } else {
                    component.push(bytes[i]);
                    i += 1;
                }
            }
            components.push(component);
        }
        Ok(Name(components))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let n = name("/parc/home/alice");
        assert_eq!(n.len(), 3);
        assert_eq!(n.component(1).unwrap(), b"home");
        assert_eq!(n.to_string(), "/parc/home/alice");

        let binary = Name::root().append([0x00u8, 0xFF, b'a']);
        assert_eq!(binary.to_string(), "/%00%FFa");
        assert_eq!(name(&binary.to_string()), binary);
        assert_eq!(Name::root().to_string(), "/");
        assert!("relative/name".parse::<Name>().is_err());
        assert!("/bad%Z1".parse::<Name>().is_err());
    }

    #[test]
    fn test_prefix_relations() {
        let a = name("/a/b");
        let ab_c = name("/a/b/c");
        assert!(a.is_prefix_of(&ab_c));
        assert!(a.is_prefix_of(&a));
        assert!(a.is_strict_prefix_of(&ab_c));
        assert!(!a.is_strict_prefix_of(&a));
        assert!(!name("/a/x").is_prefix_of(&ab_c));
        assert_eq!(ab_c.parent().unwrap(), a);
        assert!(Name::root().parent().is_none());
    }

    #[test]
    fn test_ordering_places_prefix_first() {
        let mut names = vec![name("/a/c"), name("/a/b/z"), name("/a/b"), name("/a")];
        names.sort();
        assert_eq!(
            names,
            vec![name("/a"), name("/a/b"), name("/a/b/z"), name("/a/c")]
        );
    }

    #[test]
    fn test_version_components() {
        let version = Version::new(0x0102_0304);
        let component = version.to_component();
        assert_eq!(component, vec![VERSION_MARKER, 1, 2, 3, 4]);
        assert_eq!(Version::from_component(&component), Some(version));
        assert_eq!(Version::from_component(b"plain"), None);

        let versioned = name("/a/b").append_version(version).append("seg");
        assert!(versioned.is_versioned());
        assert_eq!(versioned.version(), Some(version));
        assert_eq!(versioned.unversioned(), name("/a/b"));
        assert!(!name("/a/b").is_versioned());

        // A version further up does not make the name itself versioned
        assert!(!versioned.has_terminal_version());
        assert!(name("/a/b").append_version(version).has_terminal_version());
        assert!(!name("/a/b").has_terminal_version());
    }

    #[test]
    fn test_versions_are_monotonic() {
        let mut previous = Version::now();
        for _ in 0..1000 {
            let next = Version::now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_encoding_is_unambiguous() {
        let one = Name::from_components(vec![b"ab".to_vec(), b"c".to_vec()]);
        let two = Name::from_components(vec![b"a".to_vec(), b"bc".to_vec()]);
        assert_ne!(one.encode(), two.encode());
    }
}
