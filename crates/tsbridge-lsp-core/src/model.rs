//! Engine-native result shapes.
//!
//! These mirror what the analysis engine hands back: offsets and spans in
//! UTF-16 code units, element kinds as strings, display text split into
//! parts. Nothing in here knows about lines or the protocol; translating
//! them is the job of the protocol layer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::path::NormalizedPath;
use crate::text::{ScriptSnapshot, TextChange, TextSpan};

/// Identifies an analysis context (project) inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub u32);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project#{}", self.0)
    }
}

/// The kind of a program element, as the engine spells it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScriptElementKind {
    Unknown,
    Warning,
    Keyword,
    Script,
    Module,
    Class,
    LocalClass,
    Interface,
    Type,
    Enum,
    EnumMember,
    Variable,
    LocalVariable,
    Function,
    LocalFunction,
    Method,
    Getter,
    Setter,
    Property,
    Constructor,
    Call,
    Index,
    Construct,
    Parameter,
    TypeParameter,
    PrimitiveType,
    Label,
    Alias,
    Const,
    Let,
    Directory,
    ExternalModuleName,
    String,
    Other(String),
}

impl ScriptElementKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => "",
            Self::Warning => "warning",
            Self::Keyword => "keyword",
            Self::Script => "script",
            Self::Module => "module",
            Self::Class => "class",
            Self::LocalClass => "local class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Enum => "enum",
            Self::EnumMember => "enum member",
            Self::Variable => "var",
            Self::LocalVariable => "local var",
            Self::Function => "function",
            Self::LocalFunction => "local function",
            Self::Method => "method",
            Self::Getter => "getter",
            Self::Setter => "setter",
            Self::Property => "property",
            Self::Constructor => "constructor",
            Self::Call => "call",
            Self::Index => "index",
            Self::Construct => "construct",
            Self::Parameter => "parameter",
            Self::TypeParameter => "type parameter",
            Self::PrimitiveType => "primitive type",
            Self::Label => "label",
            Self::Alias => "alias",
            Self::Const => "const",
            Self::Let => "let",
            Self::Directory => "directory",
            Self::ExternalModuleName => "external module name",
            Self::String => "string",
            Self::Other(kind) => kind,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl From<&str> for ScriptElementKind {
    fn from(kind: &str) -> Self {
        match kind {
            "" => Self::Unknown,
            "warning" => Self::Warning,
            "keyword" => Self::Keyword,
            "script" => Self::Script,
            "module" => Self::Module,
            "class" => Self::Class,
            "local class" => Self::LocalClass,
            "interface" => Self::Interface,
            "type" => Self::Type,
            "enum" => Self::Enum,
            "enum member" => Self::EnumMember,
            "var" => Self::Variable,
            "local var" => Self::LocalVariable,
            "function" => Self::Function,
            "local function" => Self::LocalFunction,
            "method" => Self::Method,
            "getter" => Self::Getter,
            "setter" => Self::Setter,
            "property" => Self::Property,
            "constructor" => Self::Constructor,
            "call" => Self::Call,
            "index" => Self::Index,
            "construct" => Self::Construct,
            "parameter" => Self::Parameter,
            "type parameter" => Self::TypeParameter,
            "primitive type" => Self::PrimitiveType,
            "label" => Self::Label,
            "alias" => Self::Alias,
            "const" => Self::Const,
            "let" => Self::Let,
            "directory" => Self::Directory,
            "external module name" => Self::ExternalModuleName,
            "string" => Self::String,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ScriptElementKind {
    fn from(kind: String) -> Self {
        Self::from(kind.as_str())
    }
}

impl From<ScriptElementKind> for String {
    fn from(kind: ScriptElementKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ScriptElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
}

/// One link of a nested diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessageChain {
    pub message_text: String,
    pub next: Vec<DiagnosticMessageChain>,
}

impl DiagnosticMessageChain {
    pub fn new(message_text: impl Into<String>) -> Self {
        Self {
            message_text: message_text.into(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: DiagnosticMessageChain) -> Self {
        self.next.push(next);
        self
    }

    fn flatten_into(&self, out: &mut String, new_line: &str, depth: usize) {
        if depth > 0 {
            out.push_str(new_line);
            for _ in 0..depth {
                out.push_str("  ");
            }
        }
        out.push_str(&self.message_text);
        for next in &self.next {
            next.flatten_into(out, new_line, depth + 1);
        }
    }
}

/// A diagnostic message: either plain text or a chain of nested messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticMessage {
    Text(String),
    Chain(DiagnosticMessageChain),
}

impl DiagnosticMessage {
    /// Render the message as one line per chain link, nested links indented
    /// two spaces per level.
    pub fn flatten(&self, new_line: &str) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Chain(chain) => {
                let mut out = String::new();
                chain.flatten_into(&mut out, new_line, 0);
                out
            }
        }
    }
}

impl From<&str> for DiagnosticMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DiagnosticMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<DiagnosticMessageChain> for DiagnosticMessage {
    fn from(chain: DiagnosticMessageChain) -> Self {
        Self::Chain(chain)
    }
}

/// The file a diagnostic points into, with the text it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileRef {
    pub name: NormalizedPath,
    pub snapshot: Arc<ScriptSnapshot>,
}

/// A diagnostic as produced by the engine.
///
/// `file`, `start` and `length` are all optional: global diagnostics (for
/// example about compiler options) have no location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: Option<SourceFileRef>,
    pub start: Option<usize>,
    pub length: Option<usize>,
    pub message: DiagnosticMessage,
    pub category: DiagnosticCategory,
    pub code: u32,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(
        category: DiagnosticCategory,
        code: u32,
        message: impl Into<DiagnosticMessage>,
    ) -> Self {
        Self {
            file: None,
            start: None,
            length: None,
            message: message.into(),
            category,
            code,
            source: None,
        }
    }

    pub fn error(code: u32, message: impl Into<DiagnosticMessage>) -> Self {
        Self::new(DiagnosticCategory::Error, code, message)
    }

    /// Attach a location.
    pub fn at(mut self, name: NormalizedPath, snapshot: Arc<ScriptSnapshot>, span: TextSpan) -> Self {
        self.file = Some(SourceFileRef { name, snapshot });
        self.start = Some(span.start);
        self.length = Some(span.length);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// =============================================================================
// Query results
// =============================================================================

/// A fragment of display text, tagged with what it represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDisplayPart {
    pub text: String,
    pub kind: String,
}

impl SymbolDisplayPart {
    pub fn new(text: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: kind.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, "text")
    }
}

/// Concatenate the text of `parts`.
pub fn display_parts_to_string(parts: &[SymbolDisplayPart]) -> String {
    parts.iter().map(|part| part.text.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickInfo {
    pub kind: ScriptElementKind,
    /// Comma-separated modifiers, e.g. `"export,declare"`.
    pub kind_modifiers: String,
    pub text_span: TextSpan,
    pub display_parts: Vec<SymbolDisplayPart>,
    pub documentation: Vec<SymbolDisplayPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionOptions {
    pub include_external_module_exports: bool,
    pub include_insert_text_completions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionInfo {
    pub is_member_completion: bool,
    pub entries: Vec<CompletionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntry {
    pub name: String,
    pub kind: ScriptElementKind,
    pub sort_text: String,
    pub insert_text: Option<String>,
    pub replacement_span: Option<TextSpan>,
    /// Module the entry would be imported from, for auto-import entries.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionInfo {
    pub file_name: NormalizedPath,
    pub text_span: TextSpan,
    pub kind: ScriptElementKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub file_name: NormalizedPath,
    pub text_span: TextSpan,
    pub is_write_access: bool,
    pub is_definition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInfo {
    pub can_rename: bool,
    pub localized_error_message: Option<String>,
    pub display_name: String,
    pub trigger_span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameLocation {
    pub file_name: NormalizedPath,
    pub text_span: TextSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightSpanKind {
    None,
    Definition,
    Reference,
    WrittenReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub text_span: TextSpan,
    pub kind: HighlightSpanKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHighlights {
    pub file_name: NormalizedPath,
    pub highlight_spans: Vec<HighlightSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpParameter {
    pub name: String,
    pub documentation: Vec<SymbolDisplayPart>,
    pub display_parts: Vec<SymbolDisplayPart>,
    pub is_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpItem {
    pub is_variadic: bool,
    pub prefix_display_parts: Vec<SymbolDisplayPart>,
    pub suffix_display_parts: Vec<SymbolDisplayPart>,
    pub separator_display_parts: Vec<SymbolDisplayPart>,
    pub parameters: Vec<SignatureHelpParameter>,
    pub documentation: Vec<SymbolDisplayPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpItems {
    pub items: Vec<SignatureHelpItem>,
    pub applicable_span: TextSpan,
    pub selected_item_index: usize,
    pub argument_index: usize,
    pub argument_count: usize,
}

/// A node of the engine's hierarchical outline of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTree {
    pub text: String,
    pub kind: ScriptElementKind,
    pub kind_modifiers: String,
    pub spans: Vec<TextSpan>,
    pub child_items: Vec<NavigationTree>,
}

impl NavigationTree {
    pub fn new(text: impl Into<String>, kind: ScriptElementKind, span: TextSpan) -> Self {
        Self {
            text: text.into(),
            kind,
            kind_modifiers: String::new(),
            spans: vec![span],
            child_items: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NavigationTree>) -> Self {
        self.child_items = children;
        self
    }
}

/// A workspace-wide search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateToItem {
    pub name: String,
    pub kind: ScriptElementKind,
    pub kind_modifiers: String,
    pub match_kind: String,
    pub file_name: NormalizedPath,
    pub text_span: TextSpan,
    pub container_name: String,
    pub container_kind: ScriptElementKind,
}

// =============================================================================
// Formatting and host configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatCodeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line_character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert_tabs_to_spaces: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_comma_delimiter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_after_semicolon_in_for_statements: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_space_before_and_after_binary_operators: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_open_brace_on_new_line_for_functions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_open_brace_on_new_line_for_control_blocks: Option<bool>,
}

impl FormatCodeSettings {
    /// Overlay the editor's indentation preferences.
    pub fn with_editor_options(mut self, tab_size: u32, insert_spaces: bool) -> Self {
        self.tab_size = Some(tab_size);
        self.indent_size = Some(tab_size);
        self.convert_tabs_to_spaces = Some(insert_spaces);
        self
    }

    /// Fill every unset field from `defaults`.
    pub fn or(self, defaults: &FormatCodeSettings) -> Self {
        let defaults = defaults.clone();
        Self {
            indent_size: self.indent_size.or(defaults.indent_size),
            tab_size: self.tab_size.or(defaults.tab_size),
            new_line_character: self.new_line_character.or(defaults.new_line_character),
            convert_tabs_to_spaces: self.convert_tabs_to_spaces.or(defaults.convert_tabs_to_spaces),
            insert_space_after_comma_delimiter: self
                .insert_space_after_comma_delimiter
                .or(defaults.insert_space_after_comma_delimiter),
            insert_space_after_semicolon_in_for_statements: self
                .insert_space_after_semicolon_in_for_statements
                .or(defaults.insert_space_after_semicolon_in_for_statements),
            insert_space_before_and_after_binary_operators: self
                .insert_space_before_and_after_binary_operators
                .or(defaults.insert_space_before_and_after_binary_operators),
            place_open_brace_on_new_line_for_functions: self
                .place_open_brace_on_new_line_for_functions
                .or(defaults.place_open_brace_on_new_line_for_functions),
            place_open_brace_on_new_line_for_control_blocks: self
                .place_open_brace_on_new_line_for_control_blocks
                .or(defaults.place_open_brace_on_new_line_for_control_blocks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExtensionInfo {
    pub extension: String,
    #[serde(default)]
    pub is_mixed_content: bool,
}

/// Settings pushed by the client through `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfiguration {
    pub host_info: Option<String>,
    /// When set, `format_options` apply to this file only.
    pub file: Option<NormalizedPath>,
    pub format_options: Option<FormatCodeSettings>,
    pub extra_file_extensions: Vec<FileExtensionInfo>,
}

// =============================================================================
// Code fixes and refactorings
// =============================================================================

/// Edits to a single file. Travels as a command argument, hence serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTextChanges {
    pub file_name: NormalizedPath,
    pub text_changes: Vec<TextChange>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFixAction {
    pub fix_name: String,
    pub description: String,
    pub changes: Vec<FileTextChanges>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorActionInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicableRefactorInfo {
    pub name: String,
    pub description: String,
    pub actions: Vec<RefactorActionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorEditInfo {
    pub edits: Vec<FileTextChanges>,
    pub rename_filename: Option<NormalizedPath>,
    pub rename_location: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub pos: usize,
    pub end: usize,
}

/// Where a refactoring applies: a caret offset or a selected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionOrRange {
    Position(usize),
    Range(TextRange),
}

impl PositionOrRange {
    /// A caret when `start == end`, a range otherwise.
    pub fn from_bounds(start: usize, end: usize) -> Self {
        if start == end {
            Self::Position(start)
        } else {
            Self::Range(TextRange { pos: start, end })
        }
    }
}
