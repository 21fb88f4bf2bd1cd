//! Pure business logic functions that perform no I/O operations.
//!
//! This module turns noisy release filenames into a `(title, year)` pair and
//! builds the canonical folder and file names from it. Nothing here touches
//! the filesystem, so it is easy to test and reason about.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// Built-in release noise: resolution, source, codec and scene group tags.
pub const DEFAULT_NOISE_TOKENS: &[&str] = &[
    "480p", "576p", "720p", "1080p", "2160p", "4K", "UHD", "HDTV", "BluRay", "BDRip", "BRRip",
    "DVDRip", "WEBRip", "WEB-DL", "WEB", "HDRip", "x264", "x265", "H264", "H265", "HEVC", "AAC",
    "AC3", "DTS", "YIFY", "YTS", "RARBG",
];

/// Highest version number probed before giving up on a stem.
pub const MAX_VERSION: usize = 10_000;

static RE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._\-]+").expect("Failed to compile separator regex"));

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

static RE_EMPTY_BRACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*\)|\[\s*\]|\{\s*\}").expect("Failed to compile empty brackets regex")
});

// ASCII only: `\d` would also take other scripts' digits.
static RE_DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("Failed to compile digit run regex"));

/// The parser's output for one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub title: String,
    pub year: Option<u16>,
}

/// Canonical names derived from a parsed title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationName {
    pub folder: String,
    pub file: String,
}

impl DestinationName {
    /// The shared stem of the folder and the file.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.folder
    }
}

/// Extracts titles and years from release filenames.
///
/// Holds the compiled noise-token pattern so it is built once per run.
#[derive(Debug, Clone)]
pub struct FilenameParser {
    noise: Regex,
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>()).expect("Built-in noise tokens form a valid regex")
    }
}

impl FilenameParser {
    /// Builds a parser from the built-in noise tokens plus `extra` ones.
    ///
    /// Tokens are matched literally and case-insensitively after separators
    /// have been turned into spaces. A token edge that is a word character
    /// must sit on a word boundary, so `WEB` never matches inside `WEBSTER`.
    ///
    /// # Errors
    ///
    /// Returns an error if the combined pattern exceeds the regex size limit.
    pub fn new<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut alternatives: Vec<String> = DEFAULT_NOISE_TOKENS
            .iter()
            .map(|token| token_pattern(token))
            .collect();
        alternatives.extend(
            extra
                .into_iter()
                .map(|token| token.as_ref().trim().to_string())
                .map(|token| token_pattern(&token)),
        );
        alternatives.retain(|alt| !alt.is_empty());
        // Longest first so `WEB DL` wins over `WEB`.
        alternatives.sort_by_key(|alt| std::cmp::Reverse(alt.len()));
        alternatives.dedup();

        let noise = Regex::new(&format!(r"(?i)(?:{})", alternatives.join("|")))?;
        Ok(Self { noise })
    }

    /// Parses a raw filename into a title and an optional year.
    ///
    /// The rightmost 4-digit run starting with `19` or `20` is the year and
    /// everything from it onwards is dropped. Without a year, the whole
    /// cleaned stem is the title.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the filename has no stem or the title is empty
    /// after cleaning.
    pub fn parse(&self, filename: &str) -> Result<ParsedTitle, ParseError> {
        let stem = file_stem(filename).ok_or_else(|| ParseError::NoStem {
            filename: filename.to_string(),
        })?;

        let (candidate, year) = match find_last_year(stem) {
            Some((start, year)) => (&stem[..start], Some(year)),
            None => (stem, None),
        };

        let title = self.clean_title(candidate);
        if title.is_empty() {
            return Err(ParseError::EmptyTitle {
                filename: filename.to_string(),
            });
        }

        Ok(ParsedTitle { title, year })
    }

    fn clean_title(&self, candidate: &str) -> String {
        let spaced = RE_SEPARATORS.replace_all(candidate, " ");
        let without_noise = self.noise.replace_all(&spaced, " ");
        let without_brackets = RE_EMPTY_BRACKETS.replace_all(&without_noise, " ");
        let collapsed = RE_WHITESPACE.replace_all(&without_brackets, " ");
        collapsed
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '(' | '[' | '{'))
            .trim_start_matches([')', ']', '}'])
            .trim()
            .to_string()
    }
}

/// Escapes a token and lets any separator inside it match a space.
///
/// Word boundaries are added only on sides that end in a word character;
/// `[HD]` has none. Empty for a token made only of separators.
fn token_pattern(token: &str) -> String {
    let parts: Vec<&str> = RE_SEPARATORS
        .split(token)
        .filter(|part| !part.is_empty())
        .collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return String::new();
    };

    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let start = if first.starts_with(is_word) { r"\b" } else { "" };
    let end = if last.ends_with(is_word) { r"\b" } else { "" };
    let body = parts
        .iter()
        .map(|part| regex::escape(part))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{start}{body}{end}")
}

/// Returns the filename without its final extension.
///
/// `None` for names with nothing before the extension, like `.mkv`.
fn file_stem(filename: &str) -> Option<&str> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let stem = match name.rfind('.') {
        Some(0) => return None,
        Some(dot) => &name[..dot],
        None => name,
    };
    (!stem.trim().is_empty()).then_some(stem)
}

/// Finds the rightmost stand-alone 4-digit run in `[1900, 2099]`.
///
/// Returns the byte offset of the run together with the parsed year.
fn find_last_year(text: &str) -> Option<(usize, u16)> {
    RE_DIGIT_RUN
        .find_iter(text)
        .filter(|m| m.len() == 4 && (m.as_str().starts_with("19") || m.as_str().starts_with("20")))
        .last()
        .and_then(|m| m.as_str().parse().ok().map(|year| (m.start(), year)))
}

/// Builds the canonical folder and file names.
///
/// Folder is `title` or `title (year)`; the file is the folder name plus the
/// extension. Deterministic for equal inputs.
#[must_use]
pub fn build_names(title: &str, year: Option<u16>, extension: &str) -> DestinationName {
    let folder = match year {
        Some(year) => format!("{title} ({year})"),
        None => title.to_string(),
    };
    let file = with_extension(&folder, extension);
    DestinationName { folder, file }
}

/// Appends `extension` to `stem`, skipping the dot when there is no extension.
#[must_use]
pub fn with_extension(stem: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Builds the stem for version `version` of `stem`.
///
/// The suffix goes after the whole stem, year group included:
/// `Title (2020)` becomes `Title (2020) - ver2`.
#[must_use]
pub fn versioned_stem(stem: &str, version: usize) -> String {
    format!("{stem} - ver{version}")
}

/// Returns the lower-cased final extension of `path`, if any.
#[must_use]
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Checks the final extension of `path` against the allow-list.
///
/// The comparison is ASCII case-insensitive; the allow-list is expected to be
/// lower-case already.
pub fn has_allowed_extension<P: AsRef<Path>>(path: P, allowed: &[String]) -> bool {
    lowercase_extension(path.as_ref()).is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}

// ============================================================================
// Tests
// ============================================================================
