use std::path::{Component, Path};

use crate::TransferError;

/// Validates the name sent with a merge request.
///
/// The store joins this name onto its own output directory, so it must be
/// a single plain component. Rejects:
/// - Empty or whitespace-only names
/// - Absolute paths and Windows prefixes (`C:`, `\\server`)
/// - `.` and `..`
/// - Anything containing a path separator
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidFileName("empty name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidFileName(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir | Component::CurDir), _) => Err(
            TransferError::InvalidFileName(format!("relative component not allowed: {name}")),
        ),
        (Some(Component::Prefix(_) | Component::RootDir), _) => Err(
            TransferError::InvalidFileName(format!("absolute path not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidFileName(format!(
            "expected a single file name: {name}"
        ))),
    }
}
