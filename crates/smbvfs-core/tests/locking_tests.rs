//! Mutation lock discipline.
//!
//! Every mutating operation takes the provider lock for the resource identity
//! and releases it on every exit path. An output stream keeps the lock until it
//! is closed.

mod common;

use std::io::{self, Write};
use std::time::{Duration, Instant, SystemTime};

use common::{ShareBuilder, TEST_LOCK_TIMEOUT_MS, key, share_url};
use smbvfs_core::client::memory::Operation;
use smbvfs_core::config::LOCK_TIMEOUT_KEY;
use smbvfs_core::{ResourceError, ResourceProvider};

/// Assert that no identity is locked on `provider`.
fn assert_no_locks(provider: &smbvfs_core::SmbResourceProvider) {
    assert_eq!(
        provider.lock_service().held_count(),
        0,
        "Expected every lock to be released"
    );
}

#[test]
fn test_lock_released_after_failed_attribute_set() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    client.fail_on(Operation::SetAttributes);
    let file = provider.resource(&share_url("a.txt"));

    assert!(matches!(file.set_hidden(true), Err(ResourceError::Smb { .. })));
    assert!(!file.set_writable(false));
    assert_no_locks(&provider);
}

#[test]
fn test_lock_released_after_failed_delete() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    client.fail_on(Operation::Delete);
    let file = provider.resource(&share_url("a.txt"));

    assert!(file.remove(false).is_err());
    assert_no_locks(&provider);

    client.clear_faults();
    file.remove(false).unwrap();
    assert!(!client.contains(&key("a.txt")));
}

#[test]
fn test_lock_released_after_failed_mkdir() {
    let (client, provider) = ShareBuilder::new().build();
    client.fail_on(Operation::Mkdir);
    let dir = provider.resource(&share_url("new"));

    assert!(matches!(
        dir.create_directory(false),
        Err(ResourceError::Smb { .. })
    ));
    assert_no_locks(&provider);
}

#[test]
fn test_lock_released_after_failed_set_last_modified() {
    let (client, provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    client.fail_on(Operation::SetLastModified);
    let file = provider.resource(&share_url("a.txt"));

    assert!(!file.set_last_modified(SystemTime::now()));
    assert_no_locks(&provider);
}

#[test]
fn test_lock_released_when_output_open_fails() {
    let (client, provider) = ShareBuilder::new().build();
    client.fail_on(Operation::OpenOutput);
    let file = provider.resource(&share_url("a.txt"));

    assert!(file.output_stream(false).is_err());
    assert!(file.create_file(false).is_err());
    assert_no_locks(&provider);
}

#[test]
fn test_lock_released_when_stream_flush_fails() {
    let (client, provider) = ShareBuilder::new().build();
    let file = provider.resource(&share_url("a.txt"));

    let mut out = file.output_stream(false).unwrap();
    client.fail_on(Operation::Write);
    out.write_all(b"buffered until close").unwrap();
    assert!(provider.lock_service().is_locked(&file.identity()));

    let err = out.close().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    assert_no_locks(&provider);
}

#[test]
fn test_stream_holds_lock_until_closed() {
    let (_client, provider) = ShareBuilder::new().build();
    let file = provider.resource(&share_url("a.txt"));
    let locks = provider.lock_service();

    let mut out = file.output_stream(false).unwrap();
    out.write_all(b"data").unwrap();
    assert!(locks.is_locked(&file.identity()));

    out.close().unwrap();
    assert!(!locks.is_locked(&file.identity()));
    file.remove(false).unwrap();
}

#[test]
fn test_dropped_stream_releases_lock() {
    let (client, provider) = ShareBuilder::new().build();
    let file = provider.resource(&share_url("a.txt"));

    {
        let mut out = file.output_stream(false).unwrap();
        out.write_all(b"dropped").unwrap();
    }
    assert_no_locks(&provider);
    assert_eq!(client.read_file(&key("a.txt")).unwrap(), b"dropped");
}

#[test]
fn test_mutation_times_out_while_stream_is_open() {
    let (_client, provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    let file = provider.resource(&share_url("a.txt"));
    let out = file.output_stream(true).unwrap();

    let started = Instant::now();
    let err = file.remove(false).unwrap_err();
    assert!(
        started.elapsed() >= Duration::from_millis(TEST_LOCK_TIMEOUT_MS),
        "Gave up after {:?}",
        started.elapsed()
    );
    match &err {
        ResourceError::LockTimeout { key, timeout } => {
            assert_eq!(key, &file.identity());
            assert_eq!(*timeout, Duration::from_millis(TEST_LOCK_TIMEOUT_MS));
        }
        other => panic!("Expected a lock timeout, got {other:?}"),
    }
    assert_eq!(io::Error::from(err).kind(), io::ErrorKind::TimedOut);

    out.close().unwrap();
    file.remove(false).unwrap();
}

#[test]
fn test_identity_ignores_case_and_credentials() {
    let (_client, provider) = ShareBuilder::new().add_file("a.txt", b"a").build();
    let plain = provider.resource(&share_url("a.txt"));
    let other = provider.resource("smb://bob:pw@FILESERVER/Public/A.TXT");
    assert_eq!(plain.identity(), other.identity());
    assert!(!plain.identity().contains("bob"));

    let out = plain.output_stream(true).unwrap();
    assert!(matches!(
        provider.lock(other.as_ref()),
        Err(ResourceError::LockTimeout { .. })
    ));
    out.close().unwrap();
    assert!(provider.lock(other.as_ref()).is_ok());
}

#[test]
fn test_reads_do_not_wait_for_the_lock() {
    let (_client, provider) = ShareBuilder::new()
        .argument(LOCK_TIMEOUT_KEY, "5000")
        .add_file("a.txt", b"before")
        .build();
    let file = provider.resource(&share_url("a.txt"));
    let out = file.output_stream(true).unwrap();

    let started = Instant::now();
    assert!(file.exists());
    assert_eq!(file.length(), 6);
    assert_eq!(common::read_string(file.as_ref()), "before");
    assert!(file.list().is_none());
    assert!(started.elapsed() < Duration::from_secs(5));

    out.close().unwrap();
}

#[test]
fn test_different_resources_lock_independently() {
    let (_client, provider) = ShareBuilder::new()
        .add_file("a.txt", b"a")
        .add_file("b.txt", b"b")
        .build();
    let a = provider.resource(&share_url("a.txt"));
    let b = provider.resource(&share_url("b.txt"));

    let out = a.output_stream(true).unwrap();
    b.set_hidden(true).unwrap();
    b.remove(false).unwrap();
    assert!(provider.lock_service().is_locked(&a.identity()));
    out.close().unwrap();
}
