//! Directory-tree helpers shared by the backup manager and the install swap.
//!
//! All functions are blocking; async callers run them under
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::io;
use std::path::Path;

/// Recursively copy the contents of `src` into `dst`, creating `dst` and
/// overwriting files that already exist there.
///
/// # Errors
///
/// Returns an error if `src` is not a directory or any entry fails to copy.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory does not exist: {}", src.display()),
        ));
    }

    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!(
                        "failed to copy '{}' -> '{}': {e}",
                        src_path.display(),
                        dst_path.display()
                    ),
                )
            })?;
        }
    }
    Ok(())
}

/// Whether `path` is an existing directory with at least one entry.
pub fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Remove a directory tree, treating an already-missing directory as success.
///
/// # Errors
///
/// Returns any error other than `NotFound`.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Move every entry of `src` into `dst`, leaving `src` empty.
///
/// Each entry is renamed when possible and copied then removed otherwise
/// (e.g. when `src` and `dst` are on different volumes).
///
/// # Errors
///
/// Returns the first entry that could be neither renamed nor copied.
pub fn move_dir_contents(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if fs::rename(&from, &to).is_ok() {
            continue;
        }

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from, &to)?;
            fs::remove_dir_all(&from)?;
        } else {
            fs::copy(&from, &to)?;
            fs::remove_file(&from)?;
        }
    }
    Ok(())
}
