//! Builds a [`SchemaDocument`] from a fork's model sources.

use crate::error::Result;
use crate::schema::{SchemaDocument, SchemaSection};
use crate::source::{Fork, SourceProvider};
use tracing::{debug, info, warn};

/// Configuration for schema extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    /// Fork the sources belong to, for logging
    pub fork: Fork,
    /// Keep sections for files that declare no classes
    pub include_empty_sections: bool,
}

impl ExtractorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fork
    pub fn fork(mut self, fork: Fork) -> Self {
        self.fork = fork;
        self
    }

    /// Sets whether files without declarations produce a section
    pub fn include_empty_sections(mut self, include: bool) -> Self {
        self.include_empty_sections = include;
        self
    }
}

/// Extracts a schema document from every file a provider lists
pub struct SchemaExtractor<P> {
    provider: P,
    config: ExtractorConfig,
}

impl<P: SourceProvider> SchemaExtractor<P> {
    /// Creates an extractor with default configuration
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ExtractorConfig::default())
    }

    /// Creates an extractor with custom configuration
    pub fn with_config(provider: P, config: ExtractorConfig) -> Self {
        Self { provider, config }
    }

    /// Returns a reference to the configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Reads every listed file in order and collects its declarations.
    ///
    /// The first retrieval failure aborts extraction.
    pub fn extract(&self) -> Result<SchemaDocument> {
        let files = self.provider.list()?;
        info!("Extracting {} schema from {} files", self.config.fork, files.len());

        let mut document = SchemaDocument::new();
        for file in &files {
            let text = self.provider.read(file)?;
            let section = SchemaSection::parse(file.name.as_str(), &text);
            debug!("{}: {} messages", file.name, section.messages.len());

            if section.messages.is_empty() && !self.config.include_empty_sections {
                continue;
            }
            document.push_section(section);
        }

        for reference in document.unresolved_references() {
            warn!("{}", reference);
        }

        Ok(document)
    }
}
