//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::Arc;

use smbvfs_core::config::LOCK_TIMEOUT_KEY;
use smbvfs_core::{MemoryClient, ProviderArguments, Resource, SmbResourceProvider};

pub const HOST: &str = "fileserver";
pub const SHARE: &str = "public";

/// Lock timeout used by providers built here, in milliseconds.
pub const TEST_LOCK_TIMEOUT_MS: u64 = 200;

/// Install a test-writer tracing subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds an in-memory share with files and directories, plus a provider over it.
pub struct ShareBuilder {
    client: MemoryClient,
    arguments: ProviderArguments,
    scheme: String,
}

impl ShareBuilder {
    pub fn new() -> Self {
        Self::with_client(MemoryClient::new())
    }

    /// Build on top of an existing client instead of a fresh one.
    pub fn with_client(client: MemoryClient) -> Self {
        client.add_share(HOST, SHARE);
        let arguments = [(LOCK_TIMEOUT_KEY.to_string(), TEST_LOCK_TIMEOUT_MS.to_string())]
            .into_iter()
            .collect();
        Self {
            client,
            arguments,
            scheme: "smb".to_string(),
        }
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn argument(mut self, key: &str, value: &str) -> Self {
        self.arguments.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a file at `path`, relative to the share root.
    pub fn add_file(self, path: &str, content: &[u8]) -> Self {
        self.client
            .put_file(&format!("{HOST}/{SHARE}/{path}"), content.to_vec());
        self
    }

    /// Add a directory at `path`, relative to the share root.
    pub fn add_directory(self, path: &str) -> Self {
        self.client.mkdir_all(&format!("{HOST}/{SHARE}/{path}"));
        self
    }

    pub fn build(self) -> (MemoryClient, SmbResourceProvider) {
        init_tracing();
        let provider = SmbResourceProvider::with_port_override(
            &self.scheme,
            self.arguments,
            Arc::new(self.client.clone()),
            None,
        )
        .expect("Failed to build provider");
        (self.client, provider)
    }
}

/// `smb://fileserver/public/<path>`
pub fn share_url(path: &str) -> String {
    format!("smb://{HOST}/{SHARE}/{path}")
}

/// Client key of `path`, relative to the share root.
pub fn key(path: &str) -> String {
    format!("{HOST}/{SHARE}/{path}")
}

/// Assert that `resource` lists exactly `expected`, in any order.
pub fn assert_children(resource: &dyn Resource, expected: &[&str]) {
    let mut actual = resource
        .list()
        .unwrap_or_else(|| panic!("Expected {} to be listable", resource.display_path()));
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    expected.sort();
    assert_eq!(
        actual,
        expected,
        "Children mismatch for {}",
        resource.display_path()
    );
}

/// Read all of `resource` as UTF-8.
pub fn read_string(resource: &dyn Resource) -> String {
    let mut text = String::new();
    resource
        .input_stream()
        .unwrap_or_else(|e| panic!("Failed to open {}: {e}", resource.display_path()))
        .read_to_string(&mut text)
        .expect("Failed to read stream");
    text
}

/// Replace the content of `resource` with `content`.
pub fn write_bytes(resource: &dyn Resource, content: &[u8]) {
    let mut out = resource
        .output_stream(false)
        .unwrap_or_else(|e| panic!("Failed to open {} for writing: {e}", resource.display_path()));
    out.write_all(content).expect("Failed to write");
    out.close().expect("Failed to close output stream");
}
