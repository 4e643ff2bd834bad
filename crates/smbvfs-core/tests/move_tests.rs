//! Moving resources: native rename within one provider, copy-then-delete otherwise.

mod common;

use common::{ShareBuilder, key, read_string, share_url};
use smbvfs_core::client::memory::Operation;
use smbvfs_core::transfer::{self, MoveStrategy};
use smbvfs_core::{MemoryClient, ResourceError, ResourceProvider};

#[test]
fn test_same_provider_uses_native_rename() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"content").build();
    let src = provider.resource(&share_url("a.txt"));
    let dest = provider.resource(&share_url("b.txt"));

    assert_eq!(
        transfer::strategy(src.as_ref(), dest.as_ref()),
        MoveStrategy::NativeRename
    );
    src.move_to(dest.as_ref()).unwrap();

    assert_eq!(client.stats().renames, 1);
    assert!(!client.contains(&key("a.txt")));
    assert_eq!(client.read_file(&key("b.txt")).unwrap(), b"content");
}

#[test]
fn test_native_rename_moves_directories() {
    let (client, provider) = ShareBuilder::new()
        .add_file("src/a.txt", b"a")
        .add_file("src/sub/b.txt", b"b")
        .add_directory("archive")
        .build();
    let src = provider.resource(&share_url("src"));
    let dest = provider.resource(&share_url("archive/src"));

    let strategy = transfer::move_resource(src.as_ref(), dest.as_ref()).unwrap();
    assert_eq!(strategy, MoveStrategy::NativeRename);
    assert_eq!(client.read_file(&key("archive/src/sub/b.txt")).unwrap(), b"b");
    assert!(!client.contains(&key("src")));
}

#[test]
fn test_native_rename_failure_does_not_fall_back() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"content").build();
    client.fail_on(Operation::Rename);
    let src = provider.resource(&share_url("a.txt"));
    let dest = provider.resource(&share_url("b.txt"));

    let err = src.move_to(dest.as_ref()).unwrap_err();
    assert!(matches!(err, ResourceError::Smb { .. }), "got {err:?}");
    assert!(client.contains(&key("a.txt")));
    assert!(!client.contains(&key("b.txt")));
}

#[test]
fn test_native_rename_onto_existing_fails() {
    let (client, provider) = ShareBuilder::new()
        .add_file("a.txt", b"a")
        .add_file("b.txt", b"b")
        .build();
    let src = provider.resource(&share_url("a.txt"));
    let dest = provider.resource(&share_url("b.txt"));

    assert!(src.move_to(dest.as_ref()).is_err());
    assert_eq!(client.read_file(&key("b.txt")).unwrap(), b"b");
}

#[test]
fn test_other_provider_copies_then_deletes() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"payload").build();
    let (_same_client, other) = ShareBuilder::with_client(client.clone()).build();
    let src = provider.resource(&share_url("a.txt"));
    let dest = other.resource(&share_url("b.txt"));

    assert_eq!(
        transfer::strategy(src.as_ref(), dest.as_ref()),
        MoveStrategy::CopyThenDelete
    );
    src.move_to(dest.as_ref()).unwrap();

    assert_eq!(client.stats().renames, 0);
    assert!(!client.contains(&key("a.txt")));
    assert_eq!(read_string(dest.as_ref()), "payload");
}

#[test]
fn test_copy_overwrites_existing_destination() {
    let (src_client, src_provider) = ShareBuilder::new().add_file("a.txt", b"new").build();
    let (dest_client, dest_provider) = ShareBuilder::new().add_file("a.txt", b"old content").build();
    let src = src_provider.resource(&share_url("a.txt"));
    let dest = dest_provider.resource(&share_url("a.txt"));

    let strategy = transfer::move_resource(src.as_ref(), dest.as_ref()).unwrap();
    assert_eq!(strategy, MoveStrategy::CopyThenDelete);
    assert_eq!(dest_client.read_file(&key("a.txt")).unwrap(), b"new");
    assert!(!src_client.contains(&key("a.txt")));
    assert_eq!(src_client.stats().renames + dest_client.stats().renames, 0);
}

#[test]
fn test_copy_needs_destination_parent() {
    let (_src_client, src_provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    let (_dest_client, dest_provider) = ShareBuilder::new().build();
    let src = src_provider.resource(&share_url("a.txt"));
    let dest = dest_provider.resource(&share_url("missing/a.txt"));

    assert!(matches!(
        src.move_to(dest.as_ref()),
        Err(ResourceError::ParentMissing { .. })
    ));
    assert!(src.exists());
}

#[test]
fn test_failed_source_delete_leaves_both_copies() {
    let src_client = MemoryClient::new();
    let (src_client, src_provider) = ShareBuilder::with_client(src_client)
        .add_file("a.txt", b"twice")
        .build();
    let (dest_client, dest_provider) = ShareBuilder::new().build();
    src_client.fail_on(Operation::Delete);

    let src = src_provider.resource(&share_url("a.txt"));
    let dest = dest_provider.resource(&share_url("a.txt"));
    assert!(src.move_to(dest.as_ref()).is_err());

    assert_eq!(src_client.read_file(&key("a.txt")).unwrap(), b"twice");
    assert_eq!(dest_client.read_file(&key("a.txt")).unwrap(), b"twice");
    assert_eq!(src_provider.lock_service().held_count(), 0);
    assert_eq!(dest_provider.lock_service().held_count(), 0);
}
