//! File system operations and I/O functions.
//!
//! This module contains all functions that interact with the filesystem:
//! probing destination folders for free names, moving files, and walking
//! the source tree for candidates.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::naming::{has_allowed_extension, versioned_stem, with_extension};

/// Collects the stems of every entry in `folder`.
///
/// A missing folder has no stems.
fn occupied_stems(folder: &Path) -> io::Result<HashSet<OsString>> {
    let read_dir = match fs::read_dir(folder) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e),
    };

    let mut stems = HashSet::new();
    for entry in read_dir {
        let path = entry?.path();
        if let Some(stem) = path.file_stem() {
            stems.insert(stem.to_os_string());
        }
    }
    Ok(stems)
}

/// Outcome of probing a folder for a free name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The canonical name is free.
    Canonical(PathBuf),
    /// The canonical name is taken; this version is the first free one.
    Versioned { path: PathBuf, version: usize },
    /// No free version up to the cap.
    Exhausted,
}

/// Finds the first free name for `stem` inside `folder`.
///
/// A stem counts as taken when any entry in the folder shares it, whatever
/// its extension. When the canonical stem is taken, versions are probed from
/// `ver2` upwards until a free one is found or `max_version` is passed.
///
/// # Errors
///
/// Returns an error if the folder exists but cannot be read.
pub fn next_available(
    folder: &Path,
    stem: &str,
    extension: &str,
    max_version: usize,
) -> io::Result<Slot> {
    let taken = occupied_stems(folder)?;

    if !taken.contains(&OsString::from(stem)) {
        return Ok(Slot::Canonical(folder.join(with_extension(stem, extension))));
    }

    for version in 2..=max_version {
        let candidate = versioned_stem(stem, version);
        if !taken.contains(&OsString::from(&candidate)) {
            return Ok(Slot::Versioned {
                path: folder.join(with_extension(&candidate, extension)),
                version,
            });
        }
    }

    Ok(Slot::Exhausted)
}

/// Moves a single file without ever replacing an existing destination.
///
/// The destination is checked immediately before the rename. Only a rename
/// across filesystems falls back to copy+delete; any other rename error is
/// returned as is.
///
/// # Errors
///
/// Returns `AlreadyExists` if `to` appeared since it was resolved, or any
/// I/O error from the rename or the copy. On error the source is intact and
/// `to` does not exist.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination already exists: {}", to.display()),
        ));
    }

    match fs::rename(from, to) {
        Err(rename_err) if rename_err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "Rename {} crosses filesystems ({rename_err}), copying instead",
                from.display()
            );
            move_cross_filesystem(from, to, &rename_err)
        }
        result => result,
    }
}

/// Copy+delete fallback for `move_file`.
///
/// The destination is created with `create_new`, so a file that shows up in
/// the meantime is never overwritten. A failed copy removes the partial
/// destination and leaves the source alone. If the source cannot be removed
/// after the copy, the copy is removed again so the file exists only once.
///
/// # Errors
///
/// Returns the copy error, or the error from removing the source.
pub fn move_cross_filesystem(from: &Path, to: &Path, rename_err: &io::Error) -> io::Result<()> {
    if let Err(copy_err) = copy_new(from, to) {
        warn!(
            "Failed to move file {} (rename: {rename_err}, copy: {copy_err})",
            from.display()
        );
        return Err(copy_err);
    }

    if let Err(remove_err) = fs::remove_file(from) {
        warn!(
            "Copied but failed to remove source file {}: {remove_err}",
            from.display()
        );
        if let Err(e) = fs::remove_file(to) {
            warn!("Failed to remove copy {}: {e}", to.display());
        }
        return Err(remove_err);
    }
    Ok(())
}

fn copy_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(from)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(to)?;

    let result = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if result.is_err() {
        drop(writer);
        let _ = fs::remove_file(to);
    }
    result
}

/// Copies `from` into `dir`, keeping its file name.
///
/// # Errors
///
/// Returns an error if `from` has no file name or the copy fails.
pub fn copy_into(from: &Path, dir: &Path) -> io::Result<PathBuf> {
    let name = from.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no file name: {}", from.display()),
        )
    })?;
    let to = dir.join(name);
    copy_new(from, &to)?;
    Ok(to)
}

/// Collects every file under `source_dir` with an allowed extension.
///
/// Files are returned in file-name order per directory. Symlinks are not
/// followed and anything under `skip` (the destination, when nested in the
/// source) is ignored.
///
/// # Errors
///
/// Returns an error if the walk fails, including a missing `source_dir`.
pub fn collect_candidates(
    source_dir: &Path,
    extensions: &[String],
    skip: Option<&Path>,
) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();

    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| skip.is_none_or(|skip| entry.path() != skip));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && has_allowed_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Finds files with an allowed extension under `dir`, excluding `original_name`.
///
/// Used to discover what an external renamer produced.
pub fn find_renamed(dir: &Path, extensions: &[String], original_name: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_allowed_extension(entry.path(), extensions))
        .find(|entry| entry.file_name() != original_name.as_os_str())
        .map(walkdir::DirEntry::into_path)
}

// ============================================================================
// Tests
// ============================================================================
