//! Generic virtual-filesystem resource contract.
//!
//! A [`Resource`] is a file-or-directory-like object addressed by a path
//! string. A [`ResourceProvider`] is the per-scheme factory that creates
//! resources and owns their shared state (configuration, locks).
//!
//! Query methods (`exists`, `length`, `list`, ...) never fail: an unreachable
//! or unknown state reads as `false`, `0` or empty. Mutating methods return
//! [`ResourceError`] whenever the requested change did not happen.

pub mod smb;

use std::any::Any;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use crate::attributes::ResourceAttribute;
use crate::config::ProviderArguments;
use crate::error::ResourceError;
use crate::locks::ResourceLockGuard;

pub use smb::SmbResource;

/// Accepts or rejects a child by name during listing.
pub trait ResourceNameFilter {
    fn accept(&self, parent: &dyn Resource, name: &str) -> bool;
}

impl<F> ResourceNameFilter for F
where
    F: Fn(&dyn Resource, &str) -> bool,
{
    fn accept(&self, parent: &dyn Resource, name: &str) -> bool {
        self(parent, name)
    }
}

/// Accepts or rejects a built child resource during listing.
pub trait ResourceFilter {
    fn accept(&self, resource: &dyn Resource) -> bool;
}

impl<F> ResourceFilter for F
where
    F: Fn(&dyn Resource) -> bool,
{
    fn accept(&self, resource: &dyn Resource) -> bool {
        self(resource)
    }
}

/// Byte sink returned by [`Resource::output_stream`].
///
/// Dropping the stream closes it, but only [`ResourceOutput::close`] reports
/// errors from the final flush.
pub trait ResourceOutput: Write + Send {
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The resource contract.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Last path component, without a trailing `/`.
    fn name(&self) -> String;

    /// Qualified path, including any (obfuscated) credential.
    fn path(&self) -> String;

    /// Path safe for logs and error messages.
    fn display_path(&self) -> String {
        self.path()
    }

    /// Qualified path of the parent, `None` at the root.
    fn parent(&self) -> Option<String>;

    fn parent_resource(&self) -> Option<Box<dyn Resource>>;

    /// Resolve `relative` against this resource as a directory.
    ///
    /// `None` when the result would climb above the root.
    fn real_resource(&self, relative: &str) -> Option<Box<dyn Resource>>;

    fn is_absolute(&self) -> bool;

    fn exists(&self) -> bool;

    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    fn is_directory(&self) -> bool;

    fn is_file(&self) -> bool;

    fn is_hidden(&self) -> bool;

    fn is_system(&self) -> bool;

    fn is_archive(&self) -> bool;

    /// `UNIX_EPOCH` when unknown.
    fn last_modified(&self) -> SystemTime;

    /// Returns whether the time was changed.
    fn set_last_modified(&self, time: SystemTime) -> bool;

    /// `0` when unknown.
    fn length(&self) -> u64;

    /// Children passing both filters, name filter first.
    ///
    /// `None` for a plain file. An unreadable directory lists as empty.
    fn list_resources(
        &self,
        name_filter: Option<&dyn ResourceNameFilter>,
        filter: Option<&dyn ResourceFilter>,
    ) -> Option<Vec<Box<dyn Resource>>>;

    /// Names of the children.
    fn list(&self) -> Option<Vec<String>> {
        self.list_resources(None, None)
            .map(|children| children.iter().map(|child| child.name()).collect())
    }

    fn input_stream(&self) -> Result<Box<dyn Read + Send>, ResourceError>;

    /// Open for writing. The resource stays locked until the stream is closed.
    fn output_stream(&self, append: bool) -> Result<Box<dyn ResourceOutput>, ResourceError>;

    fn create_file(&self, create_parent: bool) -> Result<(), ResourceError>;

    fn create_directory(&self, create_parent: bool) -> Result<(), ResourceError>;

    /// Remove this resource, and first its children when `recursive`.
    fn remove(&self, recursive: bool) -> Result<(), ResourceError>;

    fn move_to(&self, dest: &dyn Resource) -> Result<(), ResourceError>;

    /// Returns whether the change was applied.
    fn set_writable(&self, writable: bool) -> bool;

    /// Returns whether the change was applied.
    fn set_readable(&self, readable: bool) -> bool;

    fn set_hidden(&self, value: bool) -> Result<(), ResourceError> {
        self.set_attribute(ResourceAttribute::HIDDEN, value)
    }

    fn set_system(&self, value: bool) -> Result<(), ResourceError> {
        self.set_attribute(ResourceAttribute::SYSTEM, value)
    }

    fn set_archive(&self, value: bool) -> Result<(), ResourceError> {
        self.set_attribute(ResourceAttribute::ARCHIVE, value)
    }

    fn attribute(&self, attribute: ResourceAttribute) -> bool;

    fn set_attribute(&self, attribute: ResourceAttribute, value: bool) -> Result<(), ResourceError>;

    fn mode(&self) -> u32;

    fn set_mode(&self, mode: u32) -> Result<(), ResourceError>;

    /// Key this resource is locked under.
    fn identity(&self) -> String;

    fn provider(&self) -> Arc<dyn ResourceProvider>;

    fn as_any(&self) -> &dyn Any;
}

/// Per-scheme resource factory.
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    fn scheme(&self) -> &str;

    fn arguments(&self) -> &ProviderArguments;

    fn resource(&self, path: &str) -> Box<dyn Resource>;

    fn is_case_sensitive(&self) -> bool;

    fn is_mode_supported(&self) -> bool;

    fn is_attributes_supported(&self) -> bool;

    /// Exclusive lock on `resource`, held until the guard drops.
    fn lock(&self, resource: &dyn Resource) -> Result<ResourceLockGuard, ResourceError>;
}
