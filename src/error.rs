//! Error types for each stage of the pipeline.
//!
//! Every error here is recoverable at some level: parse, collision and move
//! errors are fatal for one file, scan errors for one pass. Only `AppError`
//! reaches `main`.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no title left in '{filename}' after cleaning")]
    EmptyTitle { filename: String },

    #[error("'{filename}' has no file stem")]
    NoStem { filename: String },
}

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("parse stage failed: {0}")]
    Parse(#[from] ParseError),

    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error(
        "no free version for '{stem}' in {} after {attempts} attempts",
        folder.display()
    )]
    CollisionExhausted {
        folder: PathBuf,
        stem: String,
        attempts: usize,
    },

    #[error("cannot create folder {}: {source}", path.display())]
    CreateFolder { path: PathBuf, source: io::Error },

    #[error("cannot read folder {}: {source}", path.display())]
    ReadFolder { path: PathBuf, source: io::Error },

    #[error("move {} -> {} failed: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl RelocateError {
    /// Short name of the stage that failed, used in log lines.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::NotAFile { .. } => "inspect",
            Self::CollisionExhausted { .. } | Self::ReadFolder { .. } => "collision",
            Self::CreateFolder { .. } => "create-folder",
            Self::Move { .. } => "move",
        }
    }
}

/// Failures of the external renamer. None of these abort a file: the engine
/// falls back to parsing the filename itself.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("cannot create scratch directory: {0}")]
    Scratch(io::Error),

    #[error("cannot stage {} into scratch directory: {source}", path.display())]
    Stage { path: PathBuf, source: io::Error },

    #[error("cannot start '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("renamer exited with {status}")]
    Failed { status: ExitStatus },

    #[error("renamer did not finish within {secs}s")]
    TimedOut { secs: u64 },

    #[error("renamer produced no renamed file")]
    NoOutput,

    #[error("cannot remove original {}: {source}", path.display())]
    RemoveOriginal { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("source directory {} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    #[error("cannot create destination {}: {source}", path.display())]
    CreateDestination { path: PathBuf, source: io::Error },

    #[error("cannot resolve {}: {source}", path.display())]
    Resolve { path: PathBuf, source: io::Error },

    #[error("cannot walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid noise token list: {0}")]
    NoiseTokens(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("log file has no file name: {}", path.display())]
    NoFileName { path: PathBuf },

    #[error("cannot open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: tracing_appender::rolling::InitError,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}
