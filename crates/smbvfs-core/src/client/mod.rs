//! Protocol client seam.
//!
//! The resource layer never speaks SMB itself. It asks an [`SmbClient`] to
//! bind a fully qualified URL plus an [`AuthContext`] to a [`RemoteHandle`],
//! and then drives that handle. Connection management, the wire protocol and
//! the authentication handshake all live behind these traits.
//!
//! [`memory::MemoryClient`] implements the seam over an in-process share tree.

pub mod memory;

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use url::Url;

use crate::context::AuthContext;
use crate::error::SmbError;

pub use memory::MemoryClient;

/// What kind of remote object a handle is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKind {
    /// A file or directory inside a share.
    Filesystem,
    Workgroup,
    Server,
    Share,
}

/// Resolves URLs to live remote handles.
pub trait SmbClient: Send + Sync + fmt::Debug {
    /// Bind `url` to a handle authenticating with `context`.
    ///
    /// Resolution is cheap and does not require the object to exist.
    fn resolve(&self, url: &Url, context: &AuthContext) -> Result<Arc<dyn RemoteHandle>, SmbError>;
}

/// A live binding to one remote path.
///
/// A URL ending in `/` is interpreted as a directory.
pub trait RemoteHandle: Send + Sync + fmt::Debug {
    /// Canonical URL of the object. Directories end with `/`.
    fn url(&self) -> &str;

    /// Last path component. Directories, shares and servers carry a trailing `/`.
    fn name(&self) -> String;

    fn kind(&self) -> Result<RemoteKind, SmbError>;

    fn exists(&self) -> Result<bool, SmbError>;

    fn is_directory(&self) -> Result<bool, SmbError>;

    fn is_file(&self) -> Result<bool, SmbError>;

    fn can_read(&self) -> Result<bool, SmbError>;

    fn can_write(&self) -> Result<bool, SmbError>;

    /// Raw SMB attribute bits.
    fn attributes(&self) -> Result<u32, SmbError>;

    fn set_attributes(&self, bits: u32) -> Result<(), SmbError>;

    fn last_modified(&self) -> Result<SystemTime, SmbError>;

    fn set_last_modified(&self, time: SystemTime) -> Result<(), SmbError>;

    fn length(&self) -> Result<u64, SmbError>;

    /// Open a cursor over the direct children of this directory.
    fn children(&self) -> Result<Box<dyn DirCursor>, SmbError>;

    fn open_input(&self) -> Result<Box<dyn Read + Send>, SmbError>;

    /// Open for writing, creating the file if needed.
    fn open_output(&self, append: bool) -> Result<Box<dyn Write + Send>, SmbError>;

    /// Delete the object. Directories are deleted with their contents.
    fn delete(&self) -> Result<(), SmbError>;

    fn mkdir(&self) -> Result<(), SmbError>;

    /// Rename this object to `dest` on the same server.
    fn rename_to(&self, dest: &dyn RemoteHandle) -> Result<(), SmbError>;
}

/// Remote directory cursor. The remote side is closed when the cursor drops.
pub trait DirCursor: Iterator<Item = Result<Arc<dyn RemoteHandle>, SmbError>> + Send {}

impl<T> DirCursor for T where T: Iterator<Item = Result<Arc<dyn RemoteHandle>, SmbError>> + Send {}
