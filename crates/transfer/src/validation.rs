use std::path::{Component, Path};

use crate::TransferError;

/// Rejects remote paths the control channel cannot carry.
pub fn validate_remote_path(path: &str) -> Result<(), TransferError> {
    if path.trim().is_empty() {
        return Err(TransferError::InvalidPath("empty remote path".into()));
    }
    if path.contains(['\r', '\n', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "control characters in remote path: {path:?}"
        )));
    }
    Ok(())
}

/// Last segment of a remote path.
pub fn remote_file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Directory holding `path`, or `None` for entries in the root or the
/// working directory.
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    if parent.is_empty() { None } else { Some(parent) }
}

/// Validates that `name` is a single plain file name, safe to join onto a
/// destination directory.
///
/// Rejects:
/// - Empty names
/// - Separators, which would reach into subdirectories
/// - `.` and `..`
/// - Windows prefix components (`C:`)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }
    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidPath(format!(
            "separator in file name: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {name}"
        ))),
        _ => Err(TransferError::InvalidPath(format!("not a file name: {name}"))),
    }
}

/// Ensures a destination directory ends with a separator. Blank input is an
/// argument error.
pub fn normalize_directory(dir: &str, separator: char) -> Result<String, TransferError> {
    if dir.trim().is_empty() {
        return Err(TransferError::Argument("destination directory is blank".into()));
    }
    let mut normalized = dir.to_string();
    if !normalized.ends_with(['/', '\\']) {
        normalized.push(separator);
    }
    Ok(normalized)
}
