//! Per-resource remote handle cache.
//!
//! SMB tells files and directories apart by a trailing `/` on the URL, so one
//! logical path has two possible handles. Each resource keeps one lazily
//! resolved slot per interpretation.
//!
//! A slot is resolved at most once and is never refreshed: handles stay bound
//! for the lifetime of the resource instance, and a resource does not notice a
//! remote object being replaced through some other instance. A failed
//! resolution is cached too, as `None`, which every caller treats as
//! "inaccessible".

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::client::RemoteHandle;

/// Which interpretation of a path to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSlot {
    File,
    /// The same path with a trailing `/`.
    Directory,
}

/// Resolved-once file and directory handles for one resource.
#[derive(Default)]
pub struct HandleCache {
    file: OnceLock<Option<Arc<dyn RemoteHandle>>>,
    directory: OnceLock<Option<Arc<dyn RemoteHandle>>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose file slot is already bound to `file`.
    pub fn primed(file: Arc<dyn RemoteHandle>) -> Self {
        let cache = Self::default();
        let _ = cache.file.set(Some(file));
        cache
    }

    /// The handle in `slot`, running `resolve` on first access only.
    pub fn get_or_resolve(
        &self,
        slot: HandleSlot,
        resolve: impl FnOnce() -> Option<Arc<dyn RemoteHandle>>,
    ) -> Option<Arc<dyn RemoteHandle>> {
        let cell = match slot {
            HandleSlot::File => &self.file,
            HandleSlot::Directory => &self.directory,
        };
        cell.get_or_init(resolve).clone()
    }

    /// Whether `slot` has been resolved (successfully or not).
    pub fn is_resolved(&self, slot: HandleSlot) -> bool {
        match slot {
            HandleSlot::File => self.file.get().is_some(),
            HandleSlot::Directory => self.directory.get().is_some(),
        }
    }
}

impl fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = |cell: &OnceLock<Option<Arc<dyn RemoteHandle>>>| match cell.get() {
            None => "unresolved".to_string(),
            Some(None) => "inaccessible".to_string(),
            Some(Some(handle)) => handle.url().to_string(),
        };
        f.debug_struct("HandleCache")
            .field("file", &url(&self.file))
            .field("directory", &url(&self.directory))
            .finish()
    }
}

/// Append a trailing `/` for the directory interpretation.
pub fn slot_path(path: &str, slot: HandleSlot) -> String {
    match slot {
        HandleSlot::Directory if !path.ends_with('/') => format!("{path}/"),
        _ => path.to_string(),
    }
}
