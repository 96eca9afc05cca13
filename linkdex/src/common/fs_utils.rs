use crate::errors::{ErrorKind, IndexError, IndexResult};
use itertools::Itertools;
use std::fs;
use std::io;
use std::path::Path;

/// Creates a symbolic link at `link` pointing to `target`.
///
/// Fails with `io::ErrorKind::AlreadyExists` when anything is already at
/// `link`; this is what makes unique entries race-free.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Checks what is at `path` without following links.
///
/// Returns `Ok(true)` for a symbolic link, `Ok(false)` when nothing is
/// there and a `Corruption` error when something else is.
pub fn symlink_exists(path: &Path) -> IndexResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(true),
        Ok(_) => {
            log::error!("{} is not a valid symlink (bug/corruption?)", path.display());
            Err(IndexError::corruption(&format!(
                "{} is not a valid symlink (bug/corruption?)",
                path.display()
            )))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Like [`symlink_exists`] but for directories.
pub fn dir_exists(path: &Path) -> IndexResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(true),
        Ok(_) => {
            log::error!("{} is supposed to be a directory (bug/corruption?)", path.display());
            Err(IndexError::corruption(&format!(
                "{} is supposed to be a directory (bug/corruption?)",
                path.display()
            )))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Creates `path` and its parents unless present; fails with `Corruption`
/// when something other than a directory is in the way.
pub fn ensure_dir(path: &Path) -> IndexResult<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) => match dir_exists(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(err.into()),
            Err(corrupt) => Err(corrupt),
        },
    }
}

/// Lists the entry names of a directory in lexicographic order.
pub fn sorted_entry_names(path: &Path) -> IndexResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let name = entry?.file_name();
        match name.into_string() {
            Ok(name) => names.push(name),
            Err(raw) => {
                return Err(IndexError::new(
                    &format!("Entry {:?} in {} is not valid UTF-8", raw, path.display()),
                    ErrorKind::EncodingError,
                ))
            }
        }
    }
    Ok(names.into_iter().sorted().collect())
}

/// Removes `path` when it is an empty directory.
///
/// Returns whether the directory was removed. A directory that gained an
/// entry or vanished concurrently is left alone and reported as not removed.
pub fn remove_dir_if_empty(path: &Path) -> IndexResult<bool> {
    let is_empty = match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    if !is_empty {
        return Ok(false);
    }

    match fs::remove_dir(path) {
        Ok(()) => Ok(true),
        Err(err) => match fs::read_dir(path) {
            Err(gone) if gone.kind() == io::ErrorKind::NotFound => Ok(false),
            Ok(mut entries) => {
                // refilled between the check and the removal
                if entries.next().is_some() {
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
            Err(_) => Err(err.into()),
        },
    }
}

/// Final path segment as an owned string.
pub fn base_name(path: &Path) -> IndexResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            IndexError::new(
                &format!("{} has no valid file name", path.display()),
                ErrorKind::EncodingError,
            )
        })
}

/// Rejects strings that cannot be used as a single path component.
///
/// `what` names the rejected input in the error message, e.g. "value".
pub fn validate_component(what: &str, component: &str) -> IndexResult<()> {
    let reason = if component.is_empty() {
        Some("must not be empty")
    } else if component == "." || component == ".." {
        Some("must not be a relative directory reference")
    } else if component.contains('/') || component.contains('\\') {
        Some("must not contain a path separator")
    } else if component.contains('\0') {
        Some("must not contain NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(IndexError::invalid_value(&format!(
            "{} '{}' {}",
            what,
            component.escape_debug(),
            reason
        ))),
        None => Ok(()),
    }
}
