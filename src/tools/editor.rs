//! Built-in editor tools
//!
//! Every tool acts on the active document through [`DocumentSurface`]. Line
//! numbers are 1-based, matching the numbered context the model is given.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::registry::{ParamType, Parameter, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec};
use crate::host::{DocumentSurface, Position, document_context, number_lines, truncate_listing};
use crate::{Error, Result};

/// Lines shown on each side of an edited line
const SURROUNDING_LINES: usize = 3;

/// The closed set of editor operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorTool {
    ModifyCode,
    ReplaceCodeAtLine,
    Save,
    DeleteLines,
    FocusLines,
    ListFiles,
    FindFiles,
    OpenFile,
    Diagnostic,
    Response,
    GetDocumentation,
}

impl EditorTool {
    /// Every built-in tool, in catalog order
    pub const ALL: [Self; 11] = [
        Self::ModifyCode,
        Self::ReplaceCodeAtLine,
        Self::Save,
        Self::DeleteLines,
        Self::FocusLines,
        Self::ListFiles,
        Self::FindFiles,
        Self::OpenFile,
        Self::Diagnostic,
        Self::Response,
        Self::GetDocumentation,
    ];

    /// Tool run when a turn ends without any tool call
    pub const FALLBACK: Self = Self::ModifyCode;

    /// Name the model calls the tool by
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ModifyCode => "ModifyCode",
            Self::ReplaceCodeAtLine => "ReplaceCodeAtLine",
            Self::Save => "Save",
            Self::DeleteLines => "DeleteLines",
            Self::FocusLines => "FocusLines",
            Self::ListFiles => "ListFiles",
            Self::FindFiles => "FindFiles",
            Self::OpenFile => "OpenFile",
            Self::Diagnostic => "Diagnostic",
            Self::Response => "Response",
            Self::GetDocumentation => "GetDocumentation",
        }
    }

    /// Catalog entry for this tool
    #[must_use]
    pub fn spec(self) -> ToolSpec {
        let spec = ToolSpec::new(self.name(), self.description());
        match self {
            Self::ModifyCode => spec.param(Parameter::required(
                "input",
                ParamType::String,
                "The requested modification (do not include code)",
            )),
            Self::ReplaceCodeAtLine => spec
                .param(Parameter::required(
                    "line",
                    ParamType::Integer,
                    "Line number to replace",
                ))
                .param(Parameter::required(
                    "code",
                    ParamType::String,
                    "New content of the line",
                )),
            Self::DeleteLines => spec
                .param(Parameter::required(
                    "start",
                    ParamType::Integer,
                    "Start line number to delete",
                ))
                .param(Parameter::required(
                    "end",
                    ParamType::Integer,
                    "End line number to delete (exclusive)",
                )),
            Self::FocusLines => spec
                .param(Parameter::required(
                    "start",
                    ParamType::Integer,
                    "Start line number to focus",
                ))
                .param(Parameter::required(
                    "end",
                    ParamType::Integer,
                    "End line number to focus",
                )),
            Self::FindFiles => spec.param(Parameter::required(
                "pattern",
                ParamType::String,
                "A glob pattern that defines the files to search for. Example: **/*.txt",
            )),
            Self::OpenFile => spec.param(Parameter::required(
                "uri",
                ParamType::String,
                "Uri of the file to open",
            )),
            Self::Response => spec.param(Parameter::required(
                "response",
                ParamType::String,
                "Text to tell the user",
            )),
            Self::GetDocumentation => spec.param(Parameter::required(
                "symbol",
                ParamType::String,
                "Symbol to look up",
            )),
            Self::Save | Self::ListFiles | Self::Diagnostic => spec,
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::ModifyCode => "Modify the code using AI",
            Self::ReplaceCodeAtLine => "Replace the content of a single line",
            Self::Save => "Save the file",
            Self::DeleteLines => "Delete lines",
            Self::FocusLines => "Show a range of lines at the center of the screen",
            Self::ListFiles => "List files open in the editor",
            Self::FindFiles => {
                "Find files in the current workspace based on a provided glob pattern"
            }
            Self::OpenFile => "Open a file in the editor based on a provided uri",
            Self::Diagnostic => "List errors and warnings reported for the current file",
            Self::Response => "Tell something to the user",
            Self::GetDocumentation => "Find where a symbol is defined or described in the file",
        }
    }

    /// Bind this tool to a host
    #[must_use]
    pub fn definition(self, host: Arc<dyn DocumentSurface>) -> ToolDefinition {
        ToolDefinition::new(self.spec(), Arc::new(EditorToolHandler { tool: self, host }))
    }
}

impl FromStr for EditorTool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownTool(s.to_string()))
    }
}

impl std::fmt::Display for EditorTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Registry holding every built-in tool bound to `host`
#[must_use]
pub fn default_registry(host: &Arc<dyn DocumentSurface>) -> ToolRegistry {
    ToolRegistry::new(EditorTool::ALL.map(|tool| tool.definition(Arc::clone(host))))
}

#[derive(Deserialize)]
struct ModifyArgs {
    input: String,
}

#[derive(Deserialize)]
struct ReplaceLineArgs {
    line: usize,
    code: String,
}

#[derive(Deserialize)]
struct LineRangeArgs {
    start: usize,
    end: usize,
}

#[derive(Deserialize)]
struct PatternArgs {
    pattern: String,
}

#[derive(Deserialize)]
struct UriArgs {
    uri: String,
}

#[derive(Deserialize)]
struct ResponseArgs {
    response: String,
}

#[derive(Deserialize)]
struct SymbolArgs {
    symbol: String,
}

struct EditorToolHandler {
    tool: EditorTool,
    host: Arc<dyn DocumentSurface>,
}

impl EditorToolHandler {
    fn parse<T: DeserializeOwned>(&self, args: Value) -> Result<T> {
        serde_json::from_value(args).map_err(|e| Error::InvalidArguments(format!("{}: {e}", self.tool)))
    }

    async fn modify_code(&self, args: ModifyArgs) -> Result<String> {
        self.host.delegate_edit(&args.input).await?;
        let text = self.host.get_text().await;
        let head = text.split('\n').take(3).collect::<Vec<_>>().join("\n");
        Ok(format!("{}:\n{head}", self.host.uri().await))
    }

    async fn replace_code_at_line(&self, args: ReplaceLineArgs) -> Result<String> {
        let line_count = self.host.get_text().await.split('\n').count();
        if args.line == 0 || args.line > line_count {
            return Err(Error::InvalidArguments(format!(
                "line {} is outside the document (1 to {line_count})",
                args.line
            )));
        }

        let index = args.line - 1;
        self.host
            .replace_range(
                Position::line_start(index),
                Position::new(index, usize::MAX),
                &args.code,
            )
            .await?;
        self.host.set_status(&format!("Replaced line {}", args.line)).await;

        let text = self.host.get_text().await;
        let first = index.saturating_sub(SURROUNDING_LINES);
        let window = text
            .split('\n')
            .enumerate()
            .skip(first)
            .take(index - first + SURROUNDING_LINES + 1)
            .map(|(i, line)| format!("{} {line}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("{}:\n{window}", self.host.uri().await))
    }

    async fn save(&self) -> Result<String> {
        self.host.save().await?;
        self.host.set_status("Saved file").await;
        Ok(format!("Saved file {}", self.host.uri().await))
    }

    async fn delete_lines(&self, args: LineRangeArgs) -> Result<String> {
        let LineRangeArgs { start, end } = validate_range(args)?;
        self.host
            .delete_range(Position::line_start(start - 1), Position::line_start(end - 1))
            .await?;
        self.host
            .set_status(&format!("Deleted lines {start} to {end}"))
            .await;
        Ok(document_context(self.host.as_ref()).await)
    }

    async fn focus_lines(&self, args: LineRangeArgs) -> Result<String> {
        let LineRangeArgs { start, end } = validate_range(args)?;
        self.host
            .set_status(&format!("Focusing on lines {start} to {end}"))
            .await;
        self.host
            .reveal_range(Position::line_start(start - 1), Position::line_start(end - 1))
            .await;
        Ok(format!("Focused on lines {start} to {end}"))
    }

    async fn list_files(&self) -> Result<String> {
        let listing = self.host.list_open_documents().await.join("\n");
        self.host.set_status("Listed files").await;
        Ok(truncate_listing(listing))
    }

    async fn find_files(&self, args: PatternArgs) -> Result<String> {
        let listing = self.host.find_files(&args.pattern).await?.join("\n");
        self.host.set_status("FindFiles").await;
        Ok(truncate_listing(listing))
    }

    async fn open_file(&self, args: UriArgs) -> Result<String> {
        self.host.open_document(&args.uri).await?;
        Ok(format!("Opened file {}", args.uri))
    }

    async fn diagnostics(&self) -> Result<String> {
        let diagnostics = self.host.get_diagnostics().await;
        self.host.set_status("Checked diagnostics").await;
        if diagnostics.is_empty() {
            return Ok(format!("No problems reported for {}", self.host.uri().await));
        }
        Ok(diagnostics
            .iter()
            .map(|d| format!("line {} [{}]: {}", d.line + 1, d.severity, d.message))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn respond(&self, args: ResponseArgs) -> Result<String> {
        self.host.notify_user(&args.response).await;
        Ok(format!("Told user: {}", args.response))
    }

    async fn documentation(&self, args: SymbolArgs) -> Result<String> {
        let symbol = args.symbol.trim();
        if symbol.is_empty() {
            return Err(Error::InvalidArguments("GetDocumentation: empty symbol".to_string()));
        }

        let text = self.host.get_text().await;
        let matches: Vec<String> = number_lines(&text)
            .split('\n')
            .filter(|line| line.contains(symbol))
            .map(str::to_string)
            .collect();

        if matches.is_empty() {
            return Ok(format!("No documentation found for {symbol}"));
        }
        self.host
            .set_status(&format!("Documentation for {symbol} found"))
            .await;
        Ok(format!("Documentation for {symbol}:\n{}", matches.join("\n")))
    }
}

#[async_trait]
impl ToolHandler for EditorToolHandler {
    async fn call(&self, args: Value) -> Result<String> {
        match self.tool {
            EditorTool::ModifyCode => self.modify_code(self.parse(args)?).await,
            EditorTool::ReplaceCodeAtLine => self.replace_code_at_line(self.parse(args)?).await,
            EditorTool::Save => self.save().await,
            EditorTool::DeleteLines => self.delete_lines(self.parse(args)?).await,
            EditorTool::FocusLines => self.focus_lines(self.parse(args)?).await,
            EditorTool::ListFiles => self.list_files().await,
            EditorTool::FindFiles => self.find_files(self.parse(args)?).await,
            EditorTool::OpenFile => self.open_file(self.parse(args)?).await,
            EditorTool::Diagnostic => self.diagnostics().await,
            EditorTool::Response => self.respond(self.parse(args)?).await,
            EditorTool::GetDocumentation => self.documentation(self.parse(args)?).await,
        }
    }
}

fn validate_range(args: LineRangeArgs) -> Result<LineRangeArgs> {
    if args.start == 0 || args.end < args.start {
        return Err(Error::InvalidArguments(format!(
            "invalid line range {} to {}",
            args.start, args.end
        )));
    }
    Ok(args)
}
