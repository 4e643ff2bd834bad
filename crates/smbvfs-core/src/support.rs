//! Generic helpers shared by resource implementations.
//!
//! These work on `dyn Resource` only and so apply to any provider. They cover
//! the precondition checks run before creating or writing a resource, the
//! recursive removal of children, and stream copies between resources.

use std::io;

use tracing::debug;

use crate::error::ResourceError;
use crate::resource::{Resource, ResourceOutput};

/// Fail unless `resource` can be created as a file.
///
/// A missing parent directory is created when `create_parent` is set.
pub fn check_create_file_ok(resource: &dyn Resource, create_parent: bool) -> Result<(), ResourceError> {
    if resource.is_file() || resource.is_directory() {
        return Err(ResourceError::AlreadyExists {
            path: resource.display_path(),
        });
    }
    check_parent(resource, create_parent)
}

/// Fail unless `resource` can be created as a directory.
///
/// A missing parent directory is created when `create_parent` is set.
pub fn check_create_directory_ok(
    resource: &dyn Resource,
    create_parent: bool,
) -> Result<(), ResourceError> {
    if resource.is_directory() || resource.is_file() {
        return Err(ResourceError::AlreadyExists {
            path: resource.display_path(),
        });
    }
    check_parent(resource, create_parent)
}

/// Fail unless an output stream can be opened on `resource`.
pub fn check_output_stream_ok(resource: &dyn Resource) -> Result<(), ResourceError> {
    if resource.exists() && !resource.is_writable() {
        return Err(ResourceError::ReadOnly {
            path: resource.display_path(),
        });
    }
    if resource.is_directory() {
        return Err(ResourceError::IsADirectory {
            path: resource.display_path(),
        });
    }
    if let Some(parent) = resource.parent_resource()
        && !parent.exists()
    {
        return Err(ResourceError::ParentMissing {
            path: resource.display_path(),
        });
    }
    Ok(())
}

fn check_parent(resource: &dyn Resource, create_parent: bool) -> Result<(), ResourceError> {
    let Some(parent) = resource.parent_resource() else {
        return Ok(());
    };
    if !parent.exists() {
        if !create_parent {
            return Err(ResourceError::ParentMissing {
                path: resource.display_path(),
            });
        }
        debug!(path = %parent.display_path(), "Creating missing parent directory");
        parent.create_directory(true)?;
    } else if parent.is_file() {
        return Err(ResourceError::ParentIsFile {
            path: resource.display_path(),
        });
    }
    Ok(())
}

/// Remove every child of `resource`, recursively. Plain files have none.
pub fn remove_children(resource: &dyn Resource) -> Result<(), ResourceError> {
    let Some(children) = resource.list_resources(None, None) else {
        return Ok(());
    };
    for child in children {
        child.remove(true)?;
    }
    Ok(())
}

/// Copy the content of `src` into `dest`, closing both streams.
///
/// Returns the number of bytes copied.
pub fn copy_resource(src: &dyn Resource, dest: &dyn Resource) -> Result<u64, ResourceError> {
    let mut input = src.input_stream()?;
    let mut output = dest.output_stream(false)?;
    let copied = io::copy(&mut input, &mut output)
        .map_err(|e| ResourceError::io(e, "copy to", dest.display_path()))?;
    drop(input);
    close_output(output, dest)?;
    Ok(copied)
}

fn close_output(output: Box<dyn ResourceOutput>, dest: &dyn Resource) -> Result<(), ResourceError> {
    output
        .close()
        .map_err(|e| ResourceError::io(e, "close", dest.display_path()))
}
