//! Error types for SMB resources.
//!
//! Two layers are kept apart:
//!
//! - [`SmbError`] is what the protocol client reports about a remote object.
//! - [`ResourceError`] is what the resource layer surfaces to callers when a
//!   requested change (or a stream) could not be obtained.
//!
//! Query operations (`exists`, `length`, ...) never produce either of these;
//! they degrade to `false`/`0`/empty instead.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the protocol client for a remote object.
#[derive(Error, Debug)]
pub enum SmbError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid SMB path: {0}")]
    InvalidPath(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SmbError {
    /// Map this protocol error onto the closest `io::ErrorKind`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            SmbError::NotFound(_) => io::ErrorKind::NotFound,
            SmbError::AccessDenied(_) => io::ErrorKind::PermissionDenied,
            SmbError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            SmbError::InvalidPath(_) => io::ErrorKind::InvalidInput,
            SmbError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            SmbError::Transport(_) => io::ErrorKind::ConnectionAborted,
            SmbError::Io(e) => e.kind(),
        }
    }
}

/// Context attached to resource errors.
///
/// The path recorded here is always the credential-free display path.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    /// The operation that failed
    pub operation: Option<&'static str>,
    /// The resource path (without credentials)
    pub path: Option<String>,
}

impl ResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.operation, &self.path) {
            (Some(op), Some(path)) => write!(f, "{op} '{path}'"),
            (Some(op), None) => write!(f, "{op}"),
            (None, Some(path)) => write!(f, "'{path}'"),
            (None, None) => write!(f, "(no context)"),
        }
    }
}

/// Errors surfaced by resource operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("SMB error for {context}: {source}")]
    Smb {
        #[source]
        source: SmbError,
        context: ResourceContext,
    },

    #[error("can't {context}, SMB path is invalid or inaccessible")]
    Inaccessible { context: ResourceContext },

    #[error("timed out after {timeout:?} waiting for the lock on '{key}'")]
    LockTimeout { key: String, timeout: Duration },

    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: ResourceContext,
    },

    #[error("can't create '{path}', it already exists")]
    AlreadyExists { path: String },

    #[error("parent directory of '{path}' doesn't exist")]
    ParentMissing { path: String },

    #[error("parent of '{path}' is a file")]
    ParentIsFile { path: String },

    #[error("can't write '{path}', it is a directory")]
    IsADirectory { path: String },

    #[error("can't write '{path}', it is read-only")]
    ReadOnly { path: String },
}

impl ResourceError {
    pub(crate) fn smb(source: SmbError, operation: &'static str, path: impl Into<String>) -> Self {
        ResourceError::Smb {
            source,
            context: ResourceContext::new()
                .with_operation(operation)
                .with_path(path),
        }
    }

    pub(crate) fn inaccessible(operation: &'static str, path: impl Into<String>) -> Self {
        ResourceError::Inaccessible {
            context: ResourceContext::new()
                .with_operation(operation)
                .with_path(path),
        }
    }

    pub(crate) fn io(source: io::Error, operation: &'static str, path: impl Into<String>) -> Self {
        ResourceError::Io {
            source,
            context: ResourceContext::new()
                .with_operation(operation)
                .with_path(path),
        }
    }
}

impl From<io::Error> for ResourceError {
    fn from(source: io::Error) -> Self {
        ResourceError::Io {
            source,
            context: ResourceContext::new(),
        }
    }
}

/// Convert ResourceError to std::io::Error for callers that speak `io`.
impl From<ResourceError> for io::Error {
    fn from(e: ResourceError) -> Self {
        let kind = match &e {
            ResourceError::Smb { source, .. } => source.kind(),
            ResourceError::Inaccessible { .. } => io::ErrorKind::NotFound,
            ResourceError::LockTimeout { .. } => io::ErrorKind::TimedOut,
            ResourceError::Io { source, .. } => source.kind(),
            ResourceError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            ResourceError::ParentMissing { .. } => io::ErrorKind::NotFound,
            ResourceError::ParentIsFile { .. } => io::ErrorKind::NotADirectory,
            ResourceError::IsADirectory { .. } => io::ErrorKind::IsADirectory,
            ResourceError::ReadOnly { .. } => io::ErrorKind::PermissionDenied,
        };
        io::Error::new(kind, e)
    }
}
