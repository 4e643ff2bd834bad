//! Moving resources.
//!
//! Two SMB resources of the same provider instance are moved with a native
//! server-side rename. Any other pair falls back to copy-then-delete through
//! the generic resource contract.
//!
//! The fallback isn't atomic: if the copy succeeds and removing the source
//! fails, both copies are left in place and the error is returned.

use tracing::{debug, instrument};

use crate::error::ResourceError;
use crate::resource::{Resource, SmbResource};
use crate::support;

/// How a move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStrategy {
    NativeRename,
    CopyThenDelete,
}

/// Both endpoints as SMB resources, when they share one provider instance.
fn same_provider<'a>(
    src: &'a dyn Resource,
    dest: &'a dyn Resource,
) -> Option<(&'a SmbResource, &'a SmbResource)> {
    let src = src.as_any().downcast_ref::<SmbResource>()?;
    let dest = dest.as_any().downcast_ref::<SmbResource>()?;
    src.provider_handle()
        .same_instance(dest.provider_handle())
        .then_some((src, dest))
}

/// Pick the strategy for moving `src` to `dest`.
pub fn strategy(src: &dyn Resource, dest: &dyn Resource) -> MoveStrategy {
    if same_provider(src, dest).is_some() {
        MoveStrategy::NativeRename
    } else {
        MoveStrategy::CopyThenDelete
    }
}

/// Move `src` to `dest`.
///
/// A failed native rename is returned as is; it never falls back to copying.
#[instrument(level = "debug", skip_all, fields(src = %src.display_path(), dest = %dest.display_path()))]
pub fn move_resource(src: &dyn Resource, dest: &dyn Resource) -> Result<MoveStrategy, ResourceError> {
    if let Some((smb_src, smb_dest)) = same_provider(src, dest) {
        smb_src.rename_native(smb_dest)?;
        debug!("Moved resource with native rename");
        return Ok(MoveStrategy::NativeRename);
    }

    if !dest.exists() {
        dest.create_file(false)?;
    }
    let copied = support::copy_resource(src, dest)?;
    debug!(bytes = copied, "Copied resource content");
    src.remove(false)?;
    debug!("Moved resource with copy and delete");
    Ok(MoveStrategy::CopyThenDelete)
}
