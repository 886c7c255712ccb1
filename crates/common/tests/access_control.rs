//! Integration tests for ACL-driven node keys

mod common;

use ::common::access::{AccessControlError, Acl, AclOperation, KeyDirectory, PreviousKey, Role};
use ::common::crypto::{ContentKeys, KeyDigest};
use ::common::name::{Name, Version};

fn docs() -> Name {
    "/parc/docs".parse().unwrap()
}

#[tokio::test]
async fn test_initialized_node_is_readable_by_acl() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;
    let carol = common::setup_user(&store, "carol").await;

    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &bob.link());
    let node_key = alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();
    assert!(!node_key.is_derived());

    let stored = bob.manager().get_acl(&docs()).await.unwrap().unwrap();
    assert_eq!(stored, acl);

    let as_bob = bob
        .manager()
        .get_latest_node_key_for_node(&docs())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(as_bob, node_key);

    assert!(matches!(
        carol.manager().get_latest_node_key_for_node(&docs()).await,
        Err(AccessControlError::AccessDenied(_))
    ));
    assert!(bob
        .manager()
        .get_latest_node_key_for_node(&"/elsewhere".parse().unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_effective_node_key_is_derived_from_nearest_acl() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &bob.link());
    let node_key = alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();

    let report: Name = "/parc/docs/report".parse().unwrap();
    let (node, found) = bob.manager().find_acl(&report).await.unwrap().unwrap();
    assert_eq!(node, docs());
    assert_eq!(found, acl);

    let effective = bob.manager().get_effective_node_key(&report).await.unwrap();
    assert!(effective.is_derived());
    assert_eq!(effective.node_name(), &report);
    assert_eq!(
        effective.stored_node_key_name(),
        node_key.stored_node_key_name()
    );
    assert_ne!(effective.node_key(), node_key.node_key());
    assert_eq!(
        alice.manager().get_effective_node_key(&report).await.unwrap(),
        effective
    );

    assert!(matches!(
        bob.manager()
            .get_effective_node_key(&"/elsewhere/file".parse().unwrap())
            .await,
        Err(AccessControlError::NoAcl(_))
    ));
}

#[tokio::test]
async fn test_content_keys_agree_between_readers() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    let mut acl = Acl::new();
    acl.add(Role::Writer, &alice.link());
    acl.add(Role::Reader, &bob.link());
    alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();

    let content: Name = "/parc/docs/report.pdf".parse().unwrap();
    let publisher = Some(alice.context.identity().public().digest());
    let writer = alice
        .manager()
        .content_keys(&content, publisher)
        .await
        .unwrap();
    let reader = bob
        .manager()
        .content_keys(&content, publisher)
        .await
        .unwrap();

    let encrypt = writer.segment_cipher_material(3, true).unwrap();
    let decrypt = reader.segment_cipher_material(3, false).unwrap();
    assert_eq!(encrypt.key(), decrypt.key());
    assert_eq!(encrypt.nonce(), decrypt.nonce());

    // Another publisher gets different keys for the same name
    let other = bob
        .manager()
        .content_keys(&content, Some(KeyDigest::of(b"someone else")))
        .await
        .unwrap()
        .segment_cipher_material(3, false)
        .unwrap();
    assert_ne!(other.key(), decrypt.key());
}

#[tokio::test]
async fn test_new_reader_is_granted_without_rekey() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;
    let carol = common::setup_user(&store, "carol").await;

    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &bob.link());
    let node_key = alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();

    let updated = alice
        .manager()
        .update_acl(&docs(), &[AclOperation::Add(Role::Reader, carol.link())])
        .await
        .unwrap();
    assert_eq!(updated.role_of(&carol.link()), Some(Role::Reader));

    let as_carol = carol
        .manager()
        .get_latest_node_key_for_node(&docs())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(as_carol, node_key);
    assert_eq!(
        carol.manager().get_acl(&docs()).await.unwrap().unwrap(),
        updated
    );
}

#[tokio::test]
async fn test_revocation_rekeys_node() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;
    let carol = common::setup_user(&store, "carol").await;

    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &bob.link());
    let old_key = alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();
    assert!(bob
        .manager()
        .get_latest_node_key_for_node(&docs())
        .await
        .unwrap()
        .is_some());

    alice
        .manager()
        .update_acl(&docs(), &[AclOperation::Remove(Role::Reader, bob.link())])
        .await
        .unwrap();

    let new_key = alice
        .manager()
        .get_latest_node_key_for_node(&docs())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(new_key.node_key(), old_key.node_key());
    assert_ne!(
        new_key.stored_node_key_name(),
        old_key.stored_node_key_name()
    );
    assert!(matches!(
        bob.manager().get_latest_node_key_for_node(&docs()).await,
        Err(AccessControlError::AccessDenied(_))
    ));

    // A reader granted after the rekey reaches the old key through the
    // superseded-by block
    alice
        .manager()
        .update_acl(&docs(), &[AclOperation::Add(Role::Reader, carol.link())])
        .await
        .unwrap();
    let old_directory = KeyDirectory::new(
        carol.context.clone(),
        old_key.stored_node_key_name().clone(),
    );
    assert_eq!(
        old_directory.get_unwrapped_key(None).await.unwrap().as_ref(),
        Some(old_key.node_key())
    );
}

#[tokio::test]
async fn test_group_on_acl_grants_members() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    let group = alice
        .groups()
        .create_group("readers", &[bob.link()])
        .await
        .unwrap();
    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &group.link());
    let node_key = alice
        .manager()
        .initialize_node(&docs(), &acl)
        .await
        .unwrap();

    let as_bob = bob
        .manager()
        .get_latest_node_key_for_node(&docs())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(as_bob, node_key);
}

#[tokio::test]
async fn test_node_under_versioned_ancestor() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    let node = Name::root()
        .append("parc")
        .append_version(Version::new(1))
        .append("docs");
    let mut acl = Acl::new();
    acl.add(Role::Manager, &alice.link());
    acl.add(Role::Reader, &bob.link());
    let old_key = alice.manager().initialize_node(&node, &acl).await.unwrap();
    assert!(old_key.stored_node_key_name().has_terminal_version());

    let as_alice = alice
        .manager()
        .get_latest_node_key_for_node(&node)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(as_alice, old_key);
    let as_bob = bob
        .manager()
        .get_latest_node_key_for_node(&node)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(as_bob, old_key);

    alice
        .manager()
        .update_acl(&node, &[AclOperation::Remove(Role::Reader, bob.link())])
        .await
        .unwrap();
    let new_key = alice
        .manager()
        .get_latest_node_key_for_node(&node)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(new_key.stored_node_key_name(), old_key.stored_node_key_name());

    // The new generation links back to the stored old one, not the bare prefix
    let directory = KeyDirectory::new(
        alice.context.clone(),
        new_key.stored_node_key_name().clone(),
    );
    let Some(PreviousKey::Link(previous)) = directory.get_previous_key().await.unwrap() else {
        panic!("expected a previous-key link");
    };
    assert_eq!(previous.target(), old_key.stored_node_key_name());
}
