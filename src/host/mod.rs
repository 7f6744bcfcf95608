//! Host document surface
//!
//! Everything the editor tools touch goes through [`DocumentSurface`]. The
//! engine never reaches into the host directly, so an editor integration, a
//! plain file on disk and a test fake all look the same to the tool loop.

mod buffer;

use async_trait::async_trait;

pub use buffer::BufferDocument;

use crate::Result;

/// Maximum characters returned by a file listing
pub const MAX_LISTING_CHARS: usize = 1_000_000;

/// Zero-based position in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    /// Line index
    pub line: usize,
    /// Character index within the line
    pub character: usize,
}

impl Position {
    /// Create a position
    #[must_use]
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }

    /// Start of `line`
    #[must_use]
    pub const fn line_start(line: usize) -> Self {
        Self { line, character: 0 }
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        };
        f.write_str(name)
    }
}

/// A problem reported by the host for the active document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Zero-based line
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

/// The editor or document the tools operate on
#[async_trait]
pub trait DocumentSurface: Send + Sync {
    /// Identifier of the active document
    async fn uri(&self) -> String;

    /// Full text of the active document
    async fn get_text(&self) -> String;

    /// Replace the text between `start` and `end`
    ///
    /// # Errors
    ///
    /// Returns `Error::Host` if the edit cannot be applied
    async fn replace_range(&self, start: Position, end: Position, text: &str) -> Result<()>;

    /// Delete the text between `start` and `end`
    ///
    /// # Errors
    ///
    /// Returns `Error::Host` if the edit cannot be applied
    async fn delete_range(&self, start: Position, end: Position) -> Result<()>;

    /// Bring a range into view
    async fn reveal_range(&self, start: Position, end: Position);

    /// Persist the active document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be written
    async fn save(&self) -> Result<()>;

    /// Uris of every open document
    async fn list_open_documents(&self) -> Vec<String>;

    /// Uris of workspace files matching a glob pattern
    ///
    /// # Errors
    ///
    /// Returns `Error::Host` if the pattern is invalid
    async fn find_files(&self, pattern: &str) -> Result<Vec<String>>;

    /// Open a document and make it active
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be opened
    async fn open_document(&self, uri: &str) -> Result<()>;

    /// Problems reported for the active document
    async fn get_diagnostics(&self) -> Vec<Diagnostic>;

    /// Show a message to the user
    async fn notify_user(&self, text: &str);

    /// Update the status line
    async fn set_status(&self, text: &str);

    /// Hand an instruction to the host's own AI edit command
    ///
    /// # Errors
    ///
    /// Returns `Error::Host` if the host has no such command or it fails
    async fn delegate_edit(&self, instruction: &str) -> Result<()>;
}

/// Prefix each line with its 1-based number
#[must_use]
pub fn number_lines(text: &str) -> String {
    text.split('\n')
        .enumerate()
        .map(|(i, line)| format!("{} {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Uri plus line-numbered text of the active document
pub async fn document_context(host: &dyn DocumentSurface) -> String {
    format!("{}:\n{}", host.uri().await, number_lines(&host.get_text().await))
}

/// Cut a listing down to [`MAX_LISTING_CHARS`] characters
#[must_use]
pub fn truncate_listing(listing: String) -> String {
    match listing.char_indices().nth(MAX_LISTING_CHARS) {
        Some((idx, _)) => listing[..idx].to_string(),
        None => listing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_lines_from_one() {
        assert_eq!(number_lines("a\nb"), "1 a\n2 b");
        assert_eq!(number_lines(""), "1 ");
    }

    #[test]
    fn truncates_long_listing() {
        let long = "x".repeat(MAX_LISTING_CHARS + 10);
        assert_eq!(truncate_listing(long).len(), MAX_LISTING_CHARS);
        assert_eq!(truncate_listing("short".to_string()), "short");
    }
}
