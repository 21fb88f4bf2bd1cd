//! Relocation of single files into the library.
//!
//! A `Relocator` takes one discovered file, works out its canonical name and
//! moves it into `<destination>/<stem>/<stem>.<ext>`, going through the
//! collision resolver so nothing on disk is ever replaced. With a
//! `MetadataRenamer` configured, the renamer gets the first attempt and the
//! filename parser is the fallback.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::CollaboratorSettings;
use crate::error::{CollaboratorError, RelocateError};
use crate::filesystem::{Slot, copy_into, find_renamed, move_file, next_available};
use crate::naming::{FilenameParser, MAX_VERSION, build_names, lowercase_extension};

const SCRATCH_PREFIX: &str = "reshelve-";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A video file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    path: PathBuf,
    file_name: String,
    extension: String,
}

impl RawEntry {
    /// Builds an entry from a path, or `None` if it has no UTF-8 file name.
    #[must_use]
    pub fn new(path: PathBuf) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let extension = lowercase_extension(&path).unwrap_or_default();
        Some(Self {
            path,
            file_name,
            extension,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-cased extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Where a file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocated {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Version suffix that was needed, if the canonical name was taken.
    pub version: Option<usize>,
    /// Whether the external renamer supplied the name.
    pub delegated: bool,
}

/// An external tool that can rename a video file to its proper title.
///
/// Implementations rename `file` in place inside `workdir`, or leave it
/// untouched if they cannot identify it.
pub trait MetadataRenamer: fmt::Debug {
    /// Runs the renamer on `file`, which lives inside `workdir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool could not be run or reported failure.
    fn rename(&self, file: &Path, workdir: &Path) -> Result<(), CollaboratorError>;
}

/// Runs a command-line renamer as a child process.
///
/// The command line is `<program> <args..> [<config_flag> <config_path>] <file>`
/// with the scratch directory as working directory.
#[derive(Debug, Clone)]
pub struct ExternalRenamer {
    settings: CollaboratorSettings,
}

impl ExternalRenamer {
    #[must_use]
    pub fn new(settings: CollaboratorSettings) -> Self {
        Self { settings }
    }

    fn command(&self, file: &Path, workdir: &Path) -> Command {
        let mut command = Command::new(&self.settings.program);
        command.args(&self.settings.args);
        if let Some(config_path) = &self.settings.config_path {
            command.arg(&self.settings.config_flag).arg(config_path);
        }
        command
            .arg(file)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl MetadataRenamer for ExternalRenamer {
    fn rename(&self, file: &Path, workdir: &Path) -> Result<(), CollaboratorError> {
        let mut child =
            self.command(file, workdir)
                .spawn()
                .map_err(|source| CollaboratorError::Spawn {
                    program: self.settings.program.clone(),
                    source,
                })?;

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => return Err(CollaboratorError::Failed { status }),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CollaboratorError::TimedOut {
                        secs: self.settings.timeout_secs,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(CollaboratorError::Spawn {
                        program: self.settings.program.clone(),
                        source,
                    });
                }
            }
        }
    }
}

/// How a file's canonical name is decided.
#[derive(Debug)]
pub enum Strategy {
    /// Parse the filename.
    Direct,
    /// Ask the renamer first, parse the filename if it fails.
    Delegated(Box<dyn MetadataRenamer>),
}

/// Moves files into `<destination>/<stem>/`.
#[derive(Debug)]
pub struct Relocator {
    destination: PathBuf,
    extensions: Vec<String>,
    parser: FilenameParser,
    strategy: Strategy,
    max_version: usize,
}

impl Relocator {
    #[must_use]
    pub fn new(
        destination: PathBuf,
        extensions: Vec<String>,
        parser: FilenameParser,
        strategy: Strategy,
    ) -> Self {
        Self {
            destination,
            extensions,
            parser,
            strategy,
            max_version: MAX_VERSION,
        }
    }

    #[cfg(test)]
    fn with_max_version(mut self, max_version: usize) -> Self {
        self.max_version = max_version;
        self
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Relocates one file.
    ///
    /// On error the source file is left where it was. An empty destination
    /// folder may remain if the move itself failed.
    ///
    /// # Errors
    ///
    /// Returns a `RelocateError` naming the stage that failed.
    pub fn relocate(&self, entry: &RawEntry) -> Result<Relocated, RelocateError> {
        if !entry.path().is_file() {
            return Err(RelocateError::NotAFile {
                path: entry.path().to_path_buf(),
            });
        }

        if let Strategy::Delegated(renamer) = &self.strategy {
            match self.relocate_delegated(entry, renamer.as_ref()) {
                Ok(Some(relocated)) => return Ok(relocated),
                Ok(None) => {}
                Err(e) => warn!(
                    "Renamer failed for {}: {e}; falling back to filename parsing",
                    entry.file_name()
                ),
            }
        }

        self.relocate_direct(entry)
    }

    fn relocate_direct(&self, entry: &RawEntry) -> Result<Relocated, RelocateError> {
        let parsed = self.parser.parse(entry.file_name())?;
        debug!(
            "Parsed {} as title '{}' year {:?}",
            entry.file_name(),
            parsed.title,
            parsed.year
        );

        let names = build_names(&parsed.title, parsed.year, entry.extension());
        debug!("Canonical name for {} is {}", entry.file_name(), names.file);
        let (to, version) = self.place_file(entry.path(), names.stem(), entry.extension())?;

        Ok(Relocated {
            from: entry.path().to_path_buf(),
            to,
            version,
            delegated: false,
        })
    }

    /// Runs the renamer on a scratch copy.
    ///
    /// `Ok(None)` and `Err` both mean "fall back". The scratch directory is
    /// removed when the `TempDir` drops, on every path out of here.
    fn relocate_delegated(
        &self,
        entry: &RawEntry,
        renamer: &dyn MetadataRenamer,
    ) -> Result<Option<Relocated>, CollaboratorError> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(CollaboratorError::Scratch)?;

        let staged =
            copy_into(entry.path(), scratch.path()).map_err(|source| CollaboratorError::Stage {
                path: entry.path().to_path_buf(),
                source,
            })?;

        renamer.rename(&staged, scratch.path())?;

        let renamed = find_renamed(
            scratch.path(),
            &self.extensions,
            Path::new(entry.file_name()),
        )
        .ok_or(CollaboratorError::NoOutput)?;

        let (Some(stem), Some(extension)) = (
            renamed.file_stem().and_then(|s| s.to_str()),
            lowercase_extension(&renamed),
        ) else {
            return Err(CollaboratorError::NoOutput);
        };
        info!("Renamer proposed '{stem}' for {}", entry.file_name());

        let (to, version) = match self.place_file(&renamed, stem, &extension) {
            Ok(placed) => placed,
            Err(e) => {
                warn!("Could not place renamed copy of {}: {e}", entry.file_name());
                return Ok(None);
            }
        };

        // The library now holds the file. If the original cannot go, take the
        // placed copy back out so the next pass does not file it again.
        if let Err(source) = fs::remove_file(entry.path()) {
            if let Err(e) = fs::remove_file(&to) {
                warn!("Failed to remove placed copy {}: {e}", to.display());
            }
            return Err(CollaboratorError::RemoveOriginal {
                path: entry.path().to_path_buf(),
                source,
            });
        }

        Ok(Some(Relocated {
            from: entry.path().to_path_buf(),
            to,
            version,
            delegated: true,
        }))
    }

    /// Creates the title folder, resolves a free name and moves `file` there.
    fn place_file(
        &self,
        file: &Path,
        stem: &str,
        extension: &str,
    ) -> Result<(PathBuf, Option<usize>), RelocateError> {
        let folder = self.destination.join(stem);
        fs::create_dir_all(&folder).map_err(|source| RelocateError::CreateFolder {
            path: folder.clone(),
            source,
        })?;

        let slot = next_available(&folder, stem, extension, self.max_version).map_err(|source| {
            RelocateError::ReadFolder {
                path: folder.clone(),
                source,
            }
        })?;

        let (to, version) = match slot {
            Slot::Canonical(path) => (path, None),
            Slot::Versioned { path, version } => {
                info!(
                    "'{stem}' already exists in {}, using version {version}",
                    folder.display()
                );
                (path, Some(version))
            }
            Slot::Exhausted => {
                return Err(RelocateError::CollisionExhausted {
                    folder,
                    stem: stem.to_string(),
                    attempts: self.max_version - 1,
                });
            }
        };

        move_file(file, &to).map_err(|source| RelocateError::Move {
            from: file.to_path_buf(),
            to: to.clone(),
            source,
        })?;

        Ok((to, version))
    }
}

// ============================================================================
// Tests
// ============================================================================
