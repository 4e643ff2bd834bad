//! SMB-backed resources.
//!
//! An [`SmbResource`] stores its path in inner form (`/host/share/path`, no
//! scheme, no credentials) and its credential as a separate value. The
//! obfuscated credential is put back into the path only when the qualified
//! path is asked for.
//!
//! Remote handles are resolved lazily through the provider and cached per
//! instance (see [`HandleCache`]). Probes degrade to `false`/`0`/empty when the
//! handle is missing or the remote call fails. Mutations hold the provider
//! lock for the resource and report every failure.

use std::any::Any;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, instrument, trace};

use crate::attributes::{self, ResourceAttribute};
use crate::client::{RemoteHandle, RemoteKind};
use crate::credential::Credential;
use crate::error::{ResourceError, SmbError};
use crate::handle::{HandleCache, HandleSlot, slot_path};
use crate::locks::ResourceLockGuard;
use crate::path::{merge, parent_of};
use crate::provider::SmbResourceProvider;
use crate::resource::{
    Resource, ResourceFilter, ResourceNameFilter, ResourceOutput, ResourceProvider,
};
use crate::stream::SmbOutputStream;
use crate::{support, transfer};

/// Name stem of the file used to probe share writability.
const WRITE_PROBE_STEM: &str = "write-test-file.unknown.";

/// Probe names tried before giving up on finding an unused one.
const WRITE_PROBE_ATTEMPTS: usize = 8;

/// A file or directory on an SMB share.
#[derive(Debug)]
pub struct SmbResource {
    provider: SmbResourceProvider,
    /// `/host/share/path`
    inner: String,
    credential: Option<Credential>,
    handles: HandleCache,
}

impl SmbResource {
    /// Resource for `path`, taking the credential embedded in the path.
    pub fn new(provider: SmbResourceProvider, path: &str) -> Self {
        let credential = provider.codec().extract_credential(path);
        Self::with_credential(provider, path, Some(credential))
    }

    /// Resource for `path` authenticating as `credential`.
    ///
    /// A credential segment inside `path` is dropped.
    pub fn with_credential(
        provider: SmbResourceProvider,
        path: &str,
        credential: Option<Credential>,
    ) -> Self {
        let codec = provider.codec();
        let inner = codec.strip_scheme(&codec.strip_credential(path));
        Self::from_inner(provider, inner, credential, HandleCache::new())
    }

    fn from_inner(
        provider: SmbResourceProvider,
        inner: String,
        credential: Option<Credential>,
        handles: HandleCache,
    ) -> Self {
        let inner = if inner.is_empty() { "/".to_string() } else { inner };
        Self {
            provider,
            inner,
            credential: credential.filter(|c| !c.is_anonymous()),
            handles,
        }
    }

    /// Resource for `child` merged onto this resource's path, same credential.
    pub fn child(&self, child: &str) -> SmbResource {
        self.sibling(merge(&self.inner, child))
    }

    fn sibling(&self, inner: String) -> SmbResource {
        Self::from_inner(
            self.provider.clone(),
            inner,
            self.credential.clone(),
            HandleCache::new(),
        )
    }

    /// Child built from a listed handle; its file slot is the listed handle.
    fn listed_child(&self, handle: Arc<dyn RemoteHandle>) -> SmbResource {
        let codec = self.provider.codec();
        let inner = codec.strip_scheme(&codec.strip_credential(handle.url()));
        Self::from_inner(
            self.provider.clone(),
            inner.trim_end_matches('/').to_string(),
            self.credential.clone(),
            HandleCache::primed(handle),
        )
    }

    pub fn provider_handle(&self) -> &SmbResourceProvider {
        &self.provider
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// `/host/share/path`
    pub fn inner_path(&self) -> &str {
        &self.inner
    }

    fn qualified(&self) -> String {
        self.provider.codec().qualify(&self.inner, None)
    }

    fn handle(&self, slot: HandleSlot) -> Option<Arc<dyn RemoteHandle>> {
        self.handles.get_or_resolve(slot, || {
            let path = slot_path(&self.qualified(), slot);
            trace!(path = %path, slot = ?slot, "Resolving remote handle");
            self.provider.get_file(&path, self.credential.as_ref())
        })
    }

    fn file(&self) -> Option<Arc<dyn RemoteHandle>> {
        self.handle(HandleSlot::File)
    }

    fn directory(&self) -> Option<Arc<dyn RemoteHandle>> {
        self.handle(HandleSlot::Directory)
    }

    /// Run a probe on the file handle, degrading to `T::default()`.
    fn probe<T: Default>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn RemoteHandle) -> Result<T, SmbError>,
    ) -> T {
        let Some(file) = self.file() else {
            return T::default();
        };
        match f(file.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                debug!(path = %self.qualified(), operation, error = %e, "SMB probe failed");
                T::default()
            }
        }
    }

    fn lock(&self) -> Result<ResourceLockGuard, ResourceError> {
        self.provider.lock(self)
    }

    fn smb_error(&self, operation: &'static str) -> impl FnOnce(SmbError) -> ResourceError {
        move |source| ResourceError::smb(source, operation, self.qualified())
    }

    fn require_file(&self, operation: &'static str) -> Result<Arc<dyn RemoteHandle>, ResourceError> {
        self.file()
            .ok_or_else(|| ResourceError::inaccessible(operation, self.qualified()))
    }

    /// Rename onto `dest` on the server. No lock is taken.
    #[instrument(level = "debug", skip_all, fields(src = %self.qualified(), dest = %dest.qualified()))]
    pub fn rename_native(&self, dest: &SmbResource) -> Result<(), ResourceError> {
        let src_handle = self.require_file("rename")?;
        let dest_handle = dest.require_file("rename to")?;
        src_handle
            .rename_to(dest_handle.as_ref())
            .map_err(self.smb_error("rename"))?;
        debug!("Renamed resource");
        Ok(())
    }

    /// Shares report themselves read-only; try creating a file on one instead.
    fn probe_share_writable(&self, share: &dyn RemoteHandle) -> bool {
        if !share.is_directory().unwrap_or(false) {
            return false;
        }
        let base = slot_path(share.url(), HandleSlot::Directory);
        let Some(probe) = (0..WRITE_PROBE_ATTEMPTS).find_map(|_| {
            let candidate = format!("{base}{WRITE_PROBE_STEM}{}", rand::random::<u32>());
            let handle = self.provider.get_file(&candidate, self.credential.as_ref())?;
            (!handle.exists().unwrap_or(true)).then_some(handle)
        }) else {
            debug!(path = %self.qualified(), "No unused write probe name found");
            return false;
        };

        if probe.can_write().unwrap_or(false) {
            return true;
        }
        let writable = match probe.open_output(false) {
            Ok(writer) => {
                drop(writer);
                true
            }
            Err(e) => {
                debug!(path = %self.qualified(), error = %e, "Share write probe failed");
                false
            }
        };
        if let Err(e) = probe.delete() {
            debug!(probe = %probe.url(), error = %e, "Failed to delete write probe");
        }
        writable
    }

    fn native_bits_set(&self, attribute: ResourceAttribute) -> bool {
        self.probe("attributes", |file| {
            Ok(attributes::is_set(file.attributes()?, attribute))
        })
    }
}

impl Resource for SmbResource {
    fn name(&self) -> String {
        self.file().map_or_else(String::new, |file| {
            let name = file.name();
            name.strip_suffix('/').map(str::to_string).unwrap_or(name)
        })
    }

    fn path(&self) -> String {
        self.provider
            .codec()
            .qualify(&self.inner, self.credential.as_ref())
    }

    /// Qualified path without the credential.
    fn display_path(&self) -> String {
        self.qualified()
    }

    fn parent(&self) -> Option<String> {
        let parent = parent_of(&self.inner);
        if parent.is_empty() {
            return None;
        }
        Some(self.provider.codec().qualify(parent, self.credential.as_ref()))
    }

    fn parent_resource(&self) -> Option<Box<dyn Resource>> {
        let parent = parent_of(&self.inner);
        if parent.is_empty() {
            return None;
        }
        Some(Box::new(self.sibling(parent.to_string())))
    }

    fn real_resource(&self, relative: &str) -> Option<Box<dyn Resource>> {
        let merged = merge(&format!("{}/", self.inner), relative);
        if merged == ".." || merged.starts_with("../") {
            return None;
        }
        Some(Box::new(self.sibling(merged)))
    }

    fn is_absolute(&self) -> bool {
        self.file().is_some()
    }

    fn exists(&self) -> bool {
        self.probe("exists", |file| file.exists())
    }

    fn is_readable(&self) -> bool {
        self.probe("can read", |file| file.can_read())
    }

    fn is_writable(&self) -> bool {
        let Some(file) = self.file() else {
            return false;
        };
        match file.can_write() {
            Ok(true) => true,
            Ok(false) => matches!(file.kind(), Ok(RemoteKind::Share)) && self.probe_share_writable(file.as_ref()),
            Err(e) => {
                debug!(path = %self.qualified(), error = %e, "SMB probe failed");
                false
            }
        }
    }

    fn is_directory(&self) -> bool {
        self.probe("is directory", |file| file.is_directory())
    }

    fn is_file(&self) -> bool {
        self.probe("is file", |file| file.is_file())
    }

    fn is_hidden(&self) -> bool {
        self.native_bits_set(ResourceAttribute::HIDDEN)
    }

    fn is_system(&self) -> bool {
        self.native_bits_set(ResourceAttribute::SYSTEM)
    }

    fn is_archive(&self) -> bool {
        self.native_bits_set(ResourceAttribute::ARCHIVE)
    }

    fn last_modified(&self) -> SystemTime {
        let Some(file) = self.file() else {
            return SystemTime::UNIX_EPOCH;
        };
        file.last_modified().unwrap_or_else(|e| {
            debug!(path = %self.qualified(), error = %e, "SMB probe failed");
            SystemTime::UNIX_EPOCH
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn set_last_modified(&self, time: SystemTime) -> bool {
        let Some(file) = self.file() else {
            return false;
        };
        let _guard = match self.lock() {
            Ok(guard) => guard,
            Err(e) => {
                debug!(error = %e, "Failed to lock before setting last-modified time");
                return false;
            }
        };
        match file.set_last_modified(time) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Failed to set last-modified time");
                false
            }
        }
    }

    fn length(&self) -> u64 {
        self.probe("length", |file| file.length())
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.qualified()))]
    fn list_resources(
        &self,
        name_filter: Option<&dyn ResourceNameFilter>,
        filter: Option<&dyn ResourceFilter>,
    ) -> Option<Vec<Box<dyn Resource>>> {
        if self.is_file() {
            return None;
        }
        let Some(directory) = self.directory() else {
            return Some(Vec::new());
        };
        let cursor = match directory.children() {
            Ok(cursor) => cursor,
            Err(e) => {
                debug!(error = %e, "Failed to open directory listing");
                return Some(Vec::new());
            }
        };

        let mut children: Vec<Box<dyn Resource>> = Vec::new();
        for entry in cursor {
            let handle = match entry {
                Ok(handle) => handle,
                Err(e) => {
                    debug!(error = %e, "Directory listing failed partway");
                    return Some(Vec::new());
                }
            };
            let child = self.listed_child(handle);
            if let Some(name_filter) = name_filter
                && !name_filter.accept(self, &child.name())
            {
                continue;
            }
            if let Some(filter) = filter
                && !filter.accept(&child)
            {
                continue;
            }
            children.push(Box::new(child));
        }
        debug!(count = children.len(), "Listed directory");
        Some(children)
    }

    fn input_stream(&self) -> Result<Box<dyn Read + Send>, ResourceError> {
        self.require_file("read")?
            .open_input()
            .map_err(self.smb_error("read"))
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn output_stream(&self, append: bool) -> Result<Box<dyn ResourceOutput>, ResourceError> {
        support::check_output_stream_ok(self)?;
        let guard = self.lock()?;
        let file = self.require_file("write")?;
        let writer = file.open_output(append).map_err(self.smb_error("write"))?;
        debug!("Opened output stream");
        Ok(Box::new(SmbOutputStream::new(writer, guard)))
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn create_file(&self, create_parent: bool) -> Result<(), ResourceError> {
        support::check_create_file_ok(self, create_parent)?;
        self.output_stream(false)?
            .close()
            .map_err(|e| ResourceError::io(e, "create", self.qualified()))?;
        debug!("Created file");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn create_directory(&self, create_parent: bool) -> Result<(), ResourceError> {
        let directory = self
            .directory()
            .ok_or_else(|| ResourceError::inaccessible("create directory", self.qualified()))?;
        support::check_create_directory_ok(self, create_parent)?;
        let _guard = self.lock()?;
        directory.mkdir().map_err(self.smb_error("create directory"))?;
        debug!("Created directory");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn remove(&self, recursive: bool) -> Result<(), ResourceError> {
        if recursive {
            support::remove_children(self)?;
        }
        let _guard = self.lock()?;
        let file = self.require_file("delete")?;
        let target = if file.is_directory().map_err(self.smb_error("delete"))? {
            self.directory()
                .ok_or_else(|| ResourceError::inaccessible("delete", self.qualified()))?
        } else {
            file
        };
        target.delete().map_err(self.smb_error("delete"))?;
        debug!("Deleted resource");
        Ok(())
    }

    fn move_to(&self, dest: &dyn Resource) -> Result<(), ResourceError> {
        transfer::move_resource(self, dest).map(|_| ())
    }

    fn set_writable(&self, writable: bool) -> bool {
        if self.file().is_none() {
            return false;
        }
        self.set_attribute(ResourceAttribute::READONLY, !writable)
            .is_ok()
    }

    fn set_readable(&self, readable: bool) -> bool {
        self.set_writable(!readable)
    }

    fn attribute(&self, attribute: ResourceAttribute) -> bool {
        self.native_bits_set(attribute)
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.qualified()))]
    fn set_attribute(&self, attribute: ResourceAttribute, value: bool) -> Result<(), ResourceError> {
        let file = self.require_file("set attributes of")?;
        let _guard = self.lock()?;
        let bits = file.attributes().map_err(self.smb_error("set attributes of"))?;
        file.set_attributes(attributes::apply(bits, attribute, value))
            .map_err(self.smb_error("set attributes of"))?;
        debug!("Updated attributes");
        Ok(())
    }

    fn mode(&self) -> u32 {
        0
    }

    fn set_mode(&self, _mode: u32) -> Result<(), ResourceError> {
        Ok(())
    }

    fn identity(&self) -> String {
        let qualified = self.qualified();
        let trimmed = qualified.trim_end_matches('/');
        if trimmed.len() < self.provider.codec().prefix().len() {
            qualified.to_lowercase()
        } else {
            trimmed.to_lowercase()
        }
    }

    fn provider(&self) -> Arc<dyn ResourceProvider> {
        Arc::new(self.provider.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
