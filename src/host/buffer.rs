//! Text buffer document host
//!
//! Backs the CLI (documents loaded from disk, saved back on `save`) and the
//! tests (purely in-memory documents). Every user-facing call is recorded so
//! callers can inspect what the engine showed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use super::{Diagnostic, DocumentSurface, Position};
use crate::{Error, Result};

/// `*` and `?` stay within one path segment, `**/` spans directories
const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
struct OpenDocument {
    uri: String,
    path: Option<PathBuf>,
    text: String,
}

#[derive(Debug, Default)]
struct Inner {
    documents: Vec<OpenDocument>,
    active: usize,
    diagnostics: Vec<Diagnostic>,
    notifications: Vec<String>,
    statuses: Vec<String>,
    revealed: Vec<(Position, Position)>,
    delegated: Vec<String>,
    saves: usize,
}

impl Inner {
    fn active(&self) -> Result<&OpenDocument> {
        self.documents
            .get(self.active)
            .ok_or_else(|| Error::Host("no active document".to_string()))
    }

    fn active_mut(&mut self) -> Result<&mut OpenDocument> {
        self.documents
            .get_mut(self.active)
            .ok_or_else(|| Error::Host("no active document".to_string()))
    }
}

/// Document host over plain text buffers
#[derive(Debug)]
pub struct BufferDocument {
    root: PathBuf,
    echo: bool,
    inner: Mutex<Inner>,
}

impl BufferDocument {
    /// Create a host with one in-memory document
    #[must_use]
    pub fn in_memory(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_document(
            PathBuf::from("."),
            OpenDocument {
                uri: uri.into(),
                path: None,
                text: text.into(),
            },
        )
    }

    /// Load a file from disk; its directory becomes the workspace root
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let text = tokio::fs::read_to_string(&path).await?;
        let root = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        tracing::debug!(path = %path.display(), bytes = text.len(), "document loaded");

        Ok(Self::with_document(
            root,
            OpenDocument {
                uri: file_uri(&path),
                path: Some(path),
                text,
            },
        ))
    }

    fn with_document(root: PathBuf, document: OpenDocument) -> Self {
        Self {
            root,
            echo: false,
            inner: Mutex::new(Inner {
                documents: vec![document],
                ..Inner::default()
            }),
        }
    }

    /// Search `root` in `find_files` and resolve relative uris against it
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Print notifications and status updates to the terminal
    #[must_use]
    pub const fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Replace the diagnostics reported for the active document
    pub async fn set_diagnostics(&self, diagnostics: Vec<Diagnostic>) {
        self.inner.lock().await.diagnostics = diagnostics;
    }

    /// Messages shown to the user so far
    pub async fn notifications(&self) -> Vec<String> {
        self.inner.lock().await.notifications.clone()
    }

    /// Status line history
    pub async fn statuses(&self) -> Vec<String> {
        self.inner.lock().await.statuses.clone()
    }

    /// Ranges brought into view
    pub async fn revealed(&self) -> Vec<(Position, Position)> {
        self.inner.lock().await.revealed.clone()
    }

    /// Instructions handed to the host edit command
    pub async fn delegated(&self) -> Vec<String> {
        self.inner.lock().await.delegated.clone()
    }

    /// Number of times `save` was called
    pub async fn save_count(&self) -> usize {
        self.inner.lock().await.saves
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let raw = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        }
    }
}

#[async_trait]
impl DocumentSurface for BufferDocument {
    async fn uri(&self) -> String {
        let inner = self.inner.lock().await;
        inner.active().map(|d| d.uri.clone()).unwrap_or_default()
    }

    async fn get_text(&self) -> String {
        let inner = self.inner.lock().await;
        inner.active().map(|d| d.text.clone()).unwrap_or_default()
    }

    async fn replace_range(&self, start: Position, end: Position, text: &str) -> Result<()> {
        if start > end {
            return Err(Error::Host(format!(
                "range start {}:{} is after end {}:{}",
                start.line, start.character, end.line, end.character
            )));
        }

        let mut inner = self.inner.lock().await;
        let document = inner.active_mut()?;
        let from = byte_offset(&document.text, start);
        let to = byte_offset(&document.text, end);
        document.text.replace_range(from..to, text);

        tracing::debug!(uri = %document.uri, from, to, inserted = text.len(), "range replaced");
        Ok(())
    }

    async fn delete_range(&self, start: Position, end: Position) -> Result<()> {
        self.replace_range(start, end, "").await
    }

    async fn reveal_range(&self, start: Position, end: Position) {
        self.inner.lock().await.revealed.push((start, end));
    }

    async fn save(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.saves += 1;
        let document = inner.active()?;
        if let Some(path) = &document.path {
            tokio::fs::write(path, &document.text).await?;
            tracing::info!(path = %path.display(), "document saved");
        }
        Ok(())
    }

    async fn list_open_documents(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.documents.iter().map(|d| d.uri.clone()).collect()
    }

    async fn find_files(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| Error::Host(format!("invalid pattern {pattern}: {e}")))?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            let mut found: Vec<String> = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let relative = e.path().strip_prefix(&root).ok()?;
                    let relative = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    matcher
                        .matches_with(&relative, PATH_MATCH)
                        .then(|| file_uri(e.path()))
                })
                .collect();
            found.sort();
            found
        })
        .await
        .map_err(|e| Error::Host(format!("file search failed: {e}")))
    }

    async fn open_document(&self, uri: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(index) = inner.documents.iter().position(|d| d.uri == uri) {
            inner.active = index;
            return Ok(());
        }

        let path = std::path::absolute(self.resolve(uri))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Host(format!("cannot open {uri}: {e}")))?;
        let uri = file_uri(&path);

        if let Some(index) = inner.documents.iter().position(|d| d.uri == uri) {
            inner.active = index;
        } else {
            inner.documents.push(OpenDocument {
                uri,
                path: Some(path),
                text,
            });
            inner.active = inner.documents.len() - 1;
        }
        inner.diagnostics.clear();
        Ok(())
    }

    async fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.lock().await.diagnostics.clone()
    }

    async fn notify_user(&self, text: &str) {
        tracing::info!(message = %text, "notify");
        if self.echo {
            println!("{text}");
        }
        self.inner.lock().await.notifications.push(text.to_string());
    }

    async fn set_status(&self, text: &str) {
        tracing::debug!(status = %text, "status");
        if self.echo {
            println!("[{text}]");
        }
        self.inner.lock().await.statuses.push(text.to_string());
    }

    async fn delegate_edit(&self, instruction: &str) -> Result<()> {
        tracing::info!(instruction = %instruction, "edit delegated to host");
        self.inner.lock().await.delegated.push(instruction.to_string());
        Ok(())
    }
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Byte offset of `position`, clamped to the line and the document
fn byte_offset(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (index, line) in text.split_inclusive('\n').enumerate() {
        if index == position.line {
            let content = line.strip_suffix('\n').unwrap_or(line);
            return offset
                + content
                    .char_indices()
                    .nth(position.character)
                    .map_or(content.len(), |(i, _)| i);
        }
        offset += line.len();
    }
    text.len()
}
