use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::crypto::{KeyDigest, PublicKey, SecretKey, Signature};
use crate::name::Name;

/// What a content object carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Opaque application bytes (public keys, membership lists, ...)
    Data,
    /// An encoded wrapped key
    Key,
    /// An encoded [`Link`]
    Link,
    /// Tombstone; the object under this name is deleted
    Gone,
}

/// A pointer to another named object
///
/// Principal entries, ACL entries, membership entries and previous-key
/// links are all links. The optional digest pins which key the target
/// is expected to hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    target: Name,
    label: Option<String>,
    target_digest: Option<KeyDigest>,
}

impl Link {
    pub fn new(target: Name) -> Self {
        Self {
            target,
            label: None,
            target_digest: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_digest(mut self, digest: KeyDigest) -> Self {
        self.target_digest = Some(digest);
        self
    }

    pub fn target(&self) -> &Name {
        &self.target
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn target_digest(&self) -> Option<KeyDigest> {
        self.target_digest
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// A named, signed unit of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentObject {
    name: Name,
    content_type: ContentType,
    content: Vec<u8>,
    publisher: PublicKey,
    signature: Signature,
}

#[derive(Serialize)]
struct SignedPortion<'a> {
    name: &'a Name,
    content_type: ContentType,
    content: &'a [u8],
    publisher: &'a PublicKey,
}

impl ContentObject {
    /// Build and sign a content object
    pub fn new(
        name: Name,
        content_type: ContentType,
        content: Vec<u8>,
        signer: &SecretKey,
    ) -> Result<Self, StoreError> {
        let publisher = signer.public();
        let signature = signer.sign(&signed_bytes(&name, content_type, &content, &publisher)?);
        Ok(Self {
            name,
            content_type,
            content,
            publisher,
            signature,
        })
    }

    pub fn link(name: Name, link: &Link, signer: &SecretKey) -> Result<Self, StoreError> {
        Self::new(name, ContentType::Link, link.encode()?, signer)
    }

    pub fn gone(name: Name, signer: &SecretKey) -> Result<Self, StoreError> {
        Self::new(name, ContentType::Gone, Vec::new(), signer)
    }

    /// Check the signature against the embedded publisher key
    pub fn verify(&self) -> Result<(), StoreError> {
        let bytes = signed_bytes(&self.name, self.content_type, &self.content, &self.publisher)?;
        self.publisher
            .verify(&bytes, &self.signature)
            .map_err(|_| StoreError::InvalidSignature(self.name.clone()))
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn publisher(&self) -> &PublicKey {
        &self.publisher
    }

    pub fn is_gone(&self) -> bool {
        self.content_type == ContentType::Gone
    }

    /// Decode the content as a link
    pub fn as_link(&self) -> Result<Link, StoreError> {
        if self.content_type != ContentType::Link {
            return Err(StoreError::UnexpectedType {
                name: self.name.clone(),
                expected: ContentType::Link,
                actual: self.content_type,
            });
        }
        Link::decode(&self.content)
    }
}

fn signed_bytes(
    name: &Name,
    content_type: ContentType,
    content: &[u8],
    publisher: &PublicKey,
) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(&SignedPortion {
        name,
        content_type,
        content,
        publisher,
    })?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signed_object_verifies() {
        let signer = SecretKey::generate();
        let object = ContentObject::new(
            "/a/b".parse().unwrap(),
            ContentType::Data,
            b"hello".to_vec(),
            &signer,
        )
        .unwrap();
        assert!(object.verify().is_ok());
        assert_eq!(object.publisher(), &signer.public());

        let mut tampered = object.clone();
        tampered.content = b"hullo".to_vec();
        assert!(matches!(
            tampered.verify(),
            Err(StoreError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_link_object() {
        let signer = SecretKey::generate();
        let link = Link::new("/users/alice".parse().unwrap())
            .with_label("rw")
            .with_digest(signer.digest());
        let object = ContentObject::link("/a/_access_/_ACL_".parse().unwrap(), &link, &signer)
            .unwrap();
        assert_eq!(object.as_link().unwrap(), link);

        let data = ContentObject::new(Name::root(), ContentType::Data, vec![1], &signer).unwrap();
        assert!(matches!(
            data.as_link(),
            Err(StoreError::UnexpectedType { .. })
        ));
    }
}
