//! Best-effort attribute propagation.
//!
//! Attribute failures never fail an item; they are logged at debug level.

use crate::vfs::{BackendHandle, FileTimes, Stat, VfsError, VfsFile};
use std::path::Path;
use tracing::debug;

/// Which path-level attributes to apply.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub(super) struct AttributeSet {
    pub(super) flags: bool,
    pub(super) times: bool,
    pub(super) owner: bool,
    pub(super) permissions: bool,
}

fn log_failure(what: &str, path: &Path, error: &VfsError) {
    match error {
        VfsError::Unsupported(_) => {}
        _ => debug!(path = %path.display(), %error, "failed to set {what}"),
    }
}

/// Remove every extended attribute of an open file.
pub(super) fn erase_xattrs(file: &mut dyn VfsFile) {
    let names = match file.xattr_names() {
        Ok(names) => names,
        Err(e) => {
            log_failure("xattrs", file.path(), &e);
            return;
        }
    };
    for name in names {
        if let Err(e) = file.xattr_remove(&name) {
            log_failure("xattrs", file.path(), &e);
        }
    }
}

/// Copy every extended attribute from `from` onto `to`.
pub(super) fn copy_xattrs(from: &dyn VfsFile, to: &mut dyn VfsFile) {
    let names = match from.xattr_names() {
        Ok(names) => names,
        Err(e) => {
            log_failure("xattrs", from.path(), &e);
            return;
        }
    };
    for name in names {
        // Zero-length values are legal tags.
        let value = match from.xattr_get(&name) {
            Ok(value) => value,
            Err(e) => {
                log_failure("xattrs", from.path(), &e);
                continue;
            }
        };
        if let Err(e) = to.xattr_set(&name, &value) {
            log_failure("xattrs", to.path(), &e);
        }
    }
}

/// Apply flags, times, ownership and permissions from `source` to `path`,
/// in that order.
pub(super) fn apply_path_attributes(
    backend: &BackendHandle,
    path: &Path,
    source: &Stat,
    set: &AttributeSet,
) {
    if set.flags && source.flags != 0 {
        if let Err(e) = backend.set_flags(path, source.flags) {
            log_failure("flags", path, &e);
        }
    }
    if set.times {
        if let Err(e) = backend.set_times(path, &FileTimes::from(source)) {
            log_failure("times", path, &e);
        }
    }
    if set.owner {
        if let Err(e) = backend.set_owner(path, source.uid, source.gid) {
            log_failure("owner", path, &e);
        }
    }
    if set.permissions {
        if let Err(e) = backend.set_permissions(path, source.permissions()) {
            log_failure("permissions", path, &e);
        }
    }
}
