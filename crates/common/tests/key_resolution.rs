//! Integration tests for key directory resolution across users

mod common;

use ::common::access::KeyDirectory;
use ::common::crypto::Secret;
use ::common::name::Name;
use ::common::store::Link;

fn node_key_prefix() -> Name {
    "/parc/docs/_access_/_NK_".parse().unwrap()
}

#[tokio::test]
async fn test_direct_wrap_resolves() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;
    let carol = common::setup_user(&store, "carol").await;

    let secret = Secret::generate();
    let directory = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
    assert!(directory
        .add_wrapped_key_block_for(&secret, &bob.link())
        .await
        .unwrap());
    let name = directory.versioned_name().await.unwrap().clone();

    let as_bob = KeyDirectory::new(bob.context.clone(), node_key_prefix());
    assert_eq!(
        as_bob.get_unwrapped_key(Some(secret.digest())).await.unwrap(),
        Some(secret.clone())
    );
    assert_eq!(as_bob.name(), &name);
    assert_eq!(
        bob.context.cache().get_secret_by_name(&name),
        Some(secret.clone())
    );

    let as_carol = KeyDirectory::new(carol.context.clone(), name);
    assert_eq!(as_carol.get_unwrapped_key(None).await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_principal_is_skipped() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;

    let directory = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
    let nobody = Link::new("/users/nobody/_PublicKey_".parse().unwrap());
    assert!(!directory
        .add_wrapped_key_block_for(&Secret::generate(), &nobody)
        .await
        .unwrap());
    assert!(directory.wrapping_key_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_superseded_chain_resolves() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    // Three generations; only the newest is wrapped for bob
    let secrets: Vec<Secret> = (0..3).map(|_| Secret::generate()).collect();
    let mut names = Vec::new();
    for (i, secret) in secrets.iter().enumerate() {
        let directory = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
        let principal = if i == secrets.len() - 1 {
            bob.link()
        } else {
            alice.link()
        };
        directory
            .add_wrapped_key_block_for(secret, &principal)
            .await
            .unwrap();
        names.push(directory.versioned_name().await.unwrap().clone());
    }
    for i in 0..2 {
        let older = KeyDirectory::new(alice.context.clone(), names[i].clone());
        older
            .add_superseded_by_block(&secrets[i], &names[i + 1], &secrets[i + 1])
            .await
            .unwrap();
    }

    let oldest = KeyDirectory::new(bob.context.clone(), names[0].clone());
    assert_eq!(
        oldest.get_superseding_directory_name().await.unwrap(),
        Some(names[1].clone())
    );
    assert_eq!(
        oldest.get_unwrapped_key(None).await.unwrap(),
        Some(secrets[0].clone())
    );
    // Every hop on the way is cached
    assert_eq!(
        bob.context.cache().get_secret_by_name(&names[1]),
        Some(secrets[1].clone())
    );
    assert_eq!(
        bob.context.cache().get_secret_by_name(&names[2]),
        Some(secrets[2].clone())
    );
}

#[tokio::test]
async fn test_superseded_generation_ignores_group_entries() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let bob = common::setup_user(&store, "bob").await;

    let group = alice
        .groups()
        .create_group("eng", &[alice.link(), bob.link()])
        .await
        .unwrap();

    let old_secret = Secret::generate();
    let old = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
    old.add_wrapped_key_block_for(&old_secret, &group.link())
        .await
        .unwrap();
    let old_name = old.versioned_name().await.unwrap().clone();

    // Readable through the group while it is the current generation
    let as_bob = KeyDirectory::new(bob.context.clone(), old_name.clone());
    assert_eq!(
        as_bob.get_unwrapped_key(None).await.unwrap(),
        Some(old_secret.clone())
    );

    let new_secret = Secret::generate();
    let new = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
    new.add_wrapped_key_block_for(&new_secret, &alice.link())
        .await
        .unwrap();
    let new_name = new.versioned_name().await.unwrap().clone();
    old.add_superseded_by_block(&old_secret, &new_name, &new_secret)
        .await
        .unwrap();

    // Once superseded, only the successor opens it
    let carol = common::setup_user(&store, "carol").await;
    let mut eng = alice.groups().require_group("eng").await.unwrap();
    eng.add_members(&[carol.link()]).await.unwrap();
    let old_as_carol = KeyDirectory::new(carol.context.clone(), old_name.clone());
    assert!(old_as_carol.has_superseded_block().await.unwrap());
    assert_eq!(old_as_carol.get_unwrapped_key(None).await.unwrap(), None);

    let old_as_alice = KeyDirectory::new(alice.context.clone(), old_name);
    assert_eq!(
        old_as_alice.get_unwrapped_key(None).await.unwrap(),
        Some(old_secret)
    );
}

#[tokio::test]
async fn test_resolution_depth_is_bounded() {
    let store = common::test_store();
    let alice = common::setup_user(&store, "alice").await;
    let mut config = common::test_config("bob");
    config.max_resolution_depth = 2;
    let bob = common::setup_user_with_config(&store, config).await;

    let secrets: Vec<Secret> = (0..3).map(|_| Secret::generate()).collect();
    let mut names = Vec::new();
    for (i, secret) in secrets.iter().enumerate() {
        let directory = KeyDirectory::create(alice.context.clone(), &node_key_prefix());
        if i == secrets.len() - 1 {
            directory
                .add_wrapped_key_block_for(secret, &bob.link())
                .await
                .unwrap();
        }
        names.push(directory.versioned_name().await.unwrap().clone());
    }
    for i in 0..2 {
        KeyDirectory::new(alice.context.clone(), names[i].clone())
            .add_superseded_by_block(&secrets[i], &names[i + 1], &secrets[i + 1])
            .await
            .unwrap();
    }

    // Two hops exceed the bound
    let oldest = KeyDirectory::new(bob.context.clone(), names[0].clone());
    assert_eq!(oldest.get_unwrapped_key(None).await.unwrap(), None);

    // One hop fits
    let middle = KeyDirectory::new(bob.context.clone(), names[1].clone());
    assert_eq!(
        middle.get_unwrapped_key(None).await.unwrap(),
        Some(secrets[1].clone())
    );

    // With the middle secret cached the oldest is one step away
    let oldest = KeyDirectory::new(bob.context.clone(), names[0].clone());
    assert_eq!(
        oldest.get_unwrapped_key(None).await.unwrap(),
        Some(secrets[0].clone())
    );
}
