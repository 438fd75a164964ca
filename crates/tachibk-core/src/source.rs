//! Retrieval of the Kotlin backup model sources.
//!
//! The [`SourceProvider`] trait abstracts where the model files come from:
//!
//! - [`GitHubSource`] lists a fork's models directory through the GitHub
//!   contents API and downloads each file
//! - [`DirectorySource`] reads `*.kt` files from a local checkout
//! - [`StaticSource`] serves in-memory text
//!
//! Files are always returned in a stable order so the generated schema is
//! reproducible.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Location of the backup models inside every fork
pub const MODELS_PATH: &str = "app/src/main/java/eu/kanade/tachiyomi/data/backup/models";

/// GitHub API base URL.
const GITHUB_API_URL: &str = "https://api.github.com";

/// User agent string for API requests.
const USER_AGENT_VALUE: &str = concat!("tachibk/", env!("CARGO_PKG_VERSION"));

/// Timeout for directory listings
const LIST_TIMEOUT: Duration = Duration::from_secs(12);

/// Timeout for file downloads
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(6);

/// Extension of Kotlin sources
const KOTLIN_EXTENSION: &str = "kt";

/// Application forks sharing the backup format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Fork {
    /// Mihon
    #[default]
    Mihon,
    /// TachiyomiSY
    Sy,
    /// TachiyomiJ2K
    J2k,
    /// Yokai
    Yokai,
    /// Komikku
    Komikku,
}

impl Fork {
    /// Every supported fork
    pub const ALL: [Fork; 5] = [
        Fork::Mihon,
        Fork::Sy,
        Fork::J2k,
        Fork::Yokai,
        Fork::Komikku,
    ];

    /// Short identifier used on the command line and in file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Fork::Mihon => "mihon",
            Fork::Sy => "sy",
            Fork::J2k => "j2k",
            Fork::Yokai => "yokai",
            Fork::Komikku => "komikku",
        }
    }

    /// GitHub `owner/repo`
    pub fn repository(&self) -> &'static str {
        match self {
            Fork::Mihon => "mihonapp/mihon",
            Fork::Sy => "jobobby04/TachiyomiSY",
            Fork::J2k => "Jays2Kings/tachiyomiJ2K",
            Fork::Yokai => "null2264/yokai",
            Fork::Komikku => "komikku-app/komikku",
        }
    }
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fork {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Fork::ALL
            .into_iter()
            .find(|fork| fork.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::internal(format!("unknown fork '{}'", s)))
    }
}

/// A source file to extract declarations from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name, used in schema comments
    pub name: String,
    /// Provider-specific location (URL or path)
    pub location: String,
}

impl SourceFile {
    /// Creates a new source file entry
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Trait for retrieving model source files
pub trait SourceProvider {
    /// Lists the files to process, in processing order
    fn list(&self) -> Result<Vec<SourceFile>>;

    /// Reads the text of one listed file
    fn read(&self, file: &SourceFile) -> Result<String>;
}

/// One entry of a GitHub contents listing
#[derive(Debug, Clone, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
    download_url: Option<String>,
}

/// Fetches model sources from a fork's GitHub repository
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::blocking::Client,
    repository: String,
    path: String,
}

impl GitHubSource {
    /// Creates a source for the default models path of `fork`
    pub fn new(fork: Fork) -> Result<Self> {
        Self::with_repository(fork.repository(), MODELS_PATH)
    }

    /// Creates a source for an arbitrary `owner/repo` and directory
    pub fn with_repository(repository: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| Error::fetch(GITHUB_API_URL, e))?;

        Ok(Self {
            client,
            repository: repository.into(),
            path: path.into(),
        })
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            GITHUB_API_URL, self.repository, self.path
        )
    }

    fn list_directory(&self, url: &str) -> Result<Vec<ContentEntry>> {
        debug!("Listing {}", url);
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(LIST_TIMEOUT)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(|e| Error::fetch(url, e))
    }
}

impl SourceProvider for GitHubSource {
    fn list(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        // Models sit at most one directory deep
        for entry in self.list_directory(&self.contents_url())? {
            match entry.kind.as_str() {
                "file" => files.extend(kotlin_file(entry)),
                "dir" => {
                    for sub_entry in self.list_directory(&entry.url)? {
                        if sub_entry.kind == "file" {
                            files.extend(kotlin_file(sub_entry));
                        }
                    }
                }
                other => trace!("Skipping {} entry {}", other, entry.name),
            }
        }

        Ok(files)
    }

    fn read(&self, file: &SourceFile) -> Result<String> {
        trace!("Downloading {}", file.location);
        self.client
            .get(&file.location)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| Error::fetch(&file.location, e))
    }
}

fn kotlin_file(entry: ContentEntry) -> Option<SourceFile> {
    if !entry.name.ends_with(&format!(".{}", KOTLIN_EXTENSION)) {
        trace!("Skipping non-Kotlin file {}", entry.name);
        return None;
    }
    let url = entry.download_url?;
    Some(SourceFile::new(entry.name, url))
}

/// Reads model sources from a local directory tree
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Creates a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceProvider for DirectorySource {
    fn list(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(KOTLIN_EXTENSION)
            {
                continue;
            }

            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            files.push(SourceFile::new(name, path.to_string_lossy()));
        }

        debug!("Found {} Kotlin files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn read(&self, file: &SourceFile) -> Result<String> {
        std::fs::read_to_string(&file.location).map_err(|e| Error::file_read(&file.location, e))
    }
}

/// Serves source text held in memory, keyed by file name
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    files: Vec<(String, String)>,
}

impl StaticSource {
    /// Creates an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file
    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.push((name.into(), text.into()));
        self
    }
}

impl SourceProvider for StaticSource {
    fn list(&self) -> Result<Vec<SourceFile>> {
        Ok(self
            .files
            .iter()
            .map(|(name, _)| SourceFile::new(name.clone(), name.clone()))
            .collect())
    }

    fn read(&self, file: &SourceFile) -> Result<String> {
        self.files
            .iter()
            .find(|(name, _)| *name == file.location)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| Error::internal(format!("no source named '{}'", file.location)))
    }
}
