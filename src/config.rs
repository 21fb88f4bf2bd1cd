use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::naming::FilenameParser;

/// Video extensions picked up by the scanner when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mp2", "mpg", "mpeg", "m2v",
];

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

/// How to invoke the external metadata renamer.
///
/// The renamer's own config file is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollaboratorSettings {
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    pub config_flag: String,
    /// Flags for non-interactive runs that never overwrite.
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            program: "mnamer".to_string(),
            config_path: None,
            config_flag: "--config-path".to_string(),
            args: vec!["--batch".to_string(), "--no-overwrite".to_string()],
            timeout_secs: 300,
        }
    }
}

/// Runtime configuration, resolved once at start-up and passed down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub extensions: Vec<String>,
    pub scan_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub noise_tokens: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<CollaboratorSettings>,
}

impl Default for Settings {
    /// Returns the built-in configuration.
    fn default() -> Self {
        Self {
            source_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads")),
            destination_dir: dirs::video_dir().unwrap_or_else(|| PathBuf::from("movies")),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            log_file: None,
            noise_tokens: Vec::new(),
            collaborator: None,
        }
    }
}

impl Settings {
    /// Validates the configuration.
    ///
    /// Returns an error if:
    /// - The extension list is empty or holds something that is not a bare extension
    /// - The scan interval is zero
    /// - Source and destination are the same directory
    /// - A collaborator is configured without a program
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one extension must be allowed".to_string(),
            ));
        }

        for ext in &self.extensions {
            if ext.is_empty() || ext.contains(['/', '\\', '.']) || ext.contains(char::is_whitespace)
            {
                return Err(ConfigError::Invalid(format!(
                    "Extension '{ext}' must be a bare extension like 'mkv'"
                )));
            }
        }

        if self.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "Scan interval must be at least one second".to_string(),
            ));
        }

        if self.source_dir == self.destination_dir {
            return Err(ConfigError::Invalid(format!(
                "Source and destination are both {}",
                self.source_dir.display()
            )));
        }

        if let Some(collaborator) = &self.collaborator {
            if collaborator.program.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Collaborator program cannot be empty".to_string(),
                ));
            }
            if collaborator.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "Collaborator timeout must be at least one second".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Builds the filename parser with any extra noise tokens.
    pub fn parser(&self) -> Result<FilenameParser, ConfigError> {
        Ok(FilenameParser::new(&self.noise_tokens)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

// ============================================================================
// TOML Configuration Structures
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    source_dir: Option<String>,
    destination_dir: Option<String>,
    extensions: Option<Vec<String>>,
    scan_interval_secs: Option<u64>,
    log_file: Option<String>,
    noise_tokens: Option<Vec<String>>,
    collaborator: Option<CollaboratorSettings>,
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub source_dir: Option<PathBuf>,
    pub destination_dir: Option<PathBuf>,
    pub scan_interval_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub no_collaborator: bool,
}

/// Loads the configuration file.
///
/// An explicit path must exist. Without one, the default location
/// `<config_dir>/reshelve/config.toml` is used if present and `Ok(None)`
/// is returned if it is not.
pub fn load_config_file(explicit: Option<&Path>) -> Result<Option<ConfigFile>, ConfigError> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_file_path()?;
            if !path.exists() {
                return Ok(None);
            }
            path
        }
    };

    let contents = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;

    parse_config(&contents, &config_path).map(Some)
}

fn parse_config(contents: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the path to the config file: $HOME/.config/reshelve/config.toml
fn config_file_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("reshelve").join("config.toml"))
}

/// Resolves the runtime settings.
///
/// Precedence (highest to lowest):
/// 1. CLI overrides
/// 2. Config file
/// 3. Built-in default
pub fn resolve_settings(
    config_file: Option<&ConfigFile>,
    overrides: &Overrides,
) -> Result<Settings, ConfigError> {
    // Start with built-in default
    let mut settings = Settings::default();

    // Apply config file
    if let Some(file) = config_file {
        if let Some(dir) = &file.source_dir {
            settings.source_dir = expand_tilde(dir);
        }
        if let Some(dir) = &file.destination_dir {
            settings.destination_dir = expand_tilde(dir);
        }
        if let Some(extensions) = &file.extensions {
            settings.extensions.clone_from(extensions);
        }
        if let Some(secs) = file.scan_interval_secs {
            settings.scan_interval_secs = secs;
        }
        if let Some(log_file) = &file.log_file {
            settings.log_file = Some(expand_tilde(log_file));
        }
        if let Some(tokens) = &file.noise_tokens {
            settings.noise_tokens.clone_from(tokens);
        }
        if let Some(collaborator) = &file.collaborator {
            let mut collaborator = collaborator.clone();
            collaborator.config_path = collaborator
                .config_path
                .map(|path| expand_tilde(&path.to_string_lossy()));
            settings.collaborator = Some(collaborator);
        }
    }

    // Apply CLI overrides
    if let Some(dir) = &overrides.source_dir {
        settings.source_dir.clone_from(dir);
    }
    if let Some(dir) = &overrides.destination_dir {
        settings.destination_dir.clone_from(dir);
    }
    if let Some(secs) = overrides.scan_interval_secs {
        settings.scan_interval_secs = secs;
    }
    if let Some(log_file) = &overrides.log_file {
        settings.log_file = Some(log_file.clone());
    }
    if overrides.no_collaborator {
        settings.collaborator = None;
    }

    settings.extensions = normalize_extensions(&settings.extensions);

    // Validate final configuration
    settings.validate()?;

    Ok(settings)
}

/// Lower-cases extensions, strips leading dots and drops duplicates.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(extensions.len());
    for ext in extensions {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }
    normalized
}

/// Expands ~ to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(&path[2..]);
    }
    PathBuf::from(path)
}

// ============================================================================
// Tests
// ============================================================================
