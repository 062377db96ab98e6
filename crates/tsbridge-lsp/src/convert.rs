//! Conversion between engine-native results and tower_lsp::lsp_types.
//!
//! The engine speaks in UTF-16 offsets and spans, the protocol in zero-based
//! lines and characters. Every function here is pure: it takes the snapshot
//! the engine answered against and never touches session state.

use serde_json::Value;
use tower_lsp::lsp_types::{
    Command, CompletionItem, CompletionItemKind, CompletionTextEdit,
    Diagnostic as LspDiagnostic, DiagnosticSeverity, DocumentHighlight, DocumentHighlightKind,
    Documentation, Hover, HoverContents, LanguageString, Location, MarkedString, NumberOrString,
    ParameterInformation, ParameterLabel, Position, Range, SignatureHelp, SignatureInformation,
    SymbolInformation, SymbolKind, TextDocumentPositionParams, TextEdit, Url,
};

use tsbridge_lsp_core::model::{
    ApplicableRefactorInfo, CodeFixAction, CompletionEntry, Diagnostic, DiagnosticCategory,
    HighlightSpan, HighlightSpanKind, NavigateToItem, NavigationTree, PositionOrRange, QuickInfo,
    ScriptElementKind, SignatureHelpItems, display_parts_to_string,
};
use tsbridge_lsp_core::{NormalizedPath, ScriptSnapshot, TextChange, TextSpan};

use crate::commands::{CommandName, RefactorCommand};

/// Source reported for diagnostics that do not name one.
pub const DEFAULT_DIAGNOSTIC_SOURCE: &str = "ts";

/// Language tag of the declaration block in hovers.
const HOVER_LANGUAGE: &str = "typescript";

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

// =============================================================================
// Positions and ranges
// =============================================================================

/// Protocol position of an engine offset.
pub fn to_position(snapshot: &ScriptSnapshot, offset: usize) -> Position {
    let location = snapshot.line_and_character_of(offset);
    Position {
        line: to_u32(location.line),
        character: to_u32(location.character),
    }
}

/// Engine offset of a protocol position.
///
/// The snapshot's lookup is one-based, the protocol zero-based.
pub fn to_offset(snapshot: &ScriptSnapshot, position: &Position) -> usize {
    snapshot.line_offset_to_position(
        position.line as usize + 1,
        position.character as usize + 1,
    )
}

pub fn to_range(snapshot: &ScriptSnapshot, span: TextSpan) -> Range {
    Range {
        start: to_position(snapshot, span.start),
        end: to_position(snapshot, span.end()),
    }
}

pub fn to_span(snapshot: &ScriptSnapshot, range: &Range) -> TextSpan {
    TextSpan::from_bounds(to_offset(snapshot, &range.start), to_offset(snapshot, &range.end))
}

pub fn to_location(uri: Url, snapshot: &ScriptSnapshot, span: TextSpan) -> Location {
    Location {
        uri,
        range: to_range(snapshot, span),
    }
}

pub fn to_text_edit(snapshot: &ScriptSnapshot, change: &TextChange) -> TextEdit {
    TextEdit {
        range: to_range(snapshot, change.span),
        new_text: change.new_text.clone(),
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

pub fn severity_to_lsp(category: DiagnosticCategory) -> DiagnosticSeverity {
    match category {
        DiagnosticCategory::Error => DiagnosticSeverity::ERROR,
        DiagnosticCategory::Warning => DiagnosticSeverity::WARNING,
        DiagnosticCategory::Message => DiagnosticSeverity::INFORMATION,
        DiagnosticCategory::Suggestion => DiagnosticSeverity::HINT,
    }
}

/// Convert an engine diagnostic.
///
/// Diagnostics without a file, start or length get the empty range at the
/// start of the document.
pub fn diagnostic_to_lsp(diagnostic: &Diagnostic) -> LspDiagnostic {
    let range = match (&diagnostic.file, diagnostic.start, diagnostic.length) {
        (Some(file), Some(start), Some(length)) => {
            to_range(&file.snapshot, TextSpan::new(start, length))
        }
        _ => Range::default(),
    };

    LspDiagnostic {
        range,
        severity: Some(severity_to_lsp(diagnostic.category)),
        code: Some(NumberOrString::Number(
            i32::try_from(diagnostic.code).unwrap_or(i32::MAX),
        )),
        code_description: None,
        source: Some(
            diagnostic
                .source
                .clone()
                .filter(|source| !source.is_empty())
                .unwrap_or_else(|| DEFAULT_DIAGNOSTIC_SOURCE.to_string()),
        ),
        message: diagnostic.message.flatten("\n"),
        related_information: None,
        tags: None,
        data: None,
    }
}

// =============================================================================
// Completion
// =============================================================================

/// Completion item kind for an engine element kind, if it has one.
pub fn completion_kind(kind: &ScriptElementKind) -> Option<CompletionItemKind> {
    let kind = match kind.as_str() {
        "class" => CompletionItemKind::CLASS,
        "constructor" => CompletionItemKind::CONSTRUCTOR,
        "enum" => CompletionItemKind::ENUM,
        "field" => CompletionItemKind::FIELD,
        "file" => CompletionItemKind::FILE,
        "function" => CompletionItemKind::FUNCTION,
        "interface" => CompletionItemKind::INTERFACE,
        "keyword" => CompletionItemKind::KEYWORD,
        "method" => CompletionItemKind::METHOD,
        "module" => CompletionItemKind::MODULE,
        "property" => CompletionItemKind::PROPERTY,
        "reference" => CompletionItemKind::REFERENCE,
        "snippet" => CompletionItemKind::SNIPPET,
        "text" => CompletionItemKind::TEXT,
        "unit" => CompletionItemKind::UNIT,
        "value" => CompletionItemKind::VALUE,
        "variable" => CompletionItemKind::VARIABLE,
        _ => return None,
    };
    Some(kind)
}

/// Convert a completion entry. `data` carries enough context to resolve the
/// item later.
pub fn to_completion_item(
    snapshot: &ScriptSnapshot,
    entry: &CompletionEntry,
    position: &TextDocumentPositionParams,
) -> CompletionItem {
    let text_edit = entry.replacement_span.map(|span| {
        CompletionTextEdit::Edit(TextEdit {
            range: to_range(snapshot, span),
            new_text: entry
                .insert_text
                .clone()
                .unwrap_or_else(|| entry.name.clone()),
        })
    });

    CompletionItem {
        label: entry.name.clone(),
        kind: completion_kind(&entry.kind),
        insert_text: entry.insert_text.clone(),
        text_edit,
        sort_text: (!entry.sort_text.is_empty()).then(|| entry.sort_text.clone()),
        data: Some(serde_json::json!({
            "textDocument": position.text_document,
            "position": position.position,
            "source": entry.source,
        })),
        ..Default::default()
    }
}

// =============================================================================
// Hover
// =============================================================================

/// Drop a leading `(kind) ` annotation from declaration text.
fn strip_kind_annotation(declaration: &str) -> &str {
    if !declaration.starts_with('(') {
        return declaration;
    }
    let first_line = declaration.find('\n').unwrap_or(declaration.len());
    for (idx, _) in declaration[..first_line].match_indices(')').filter(|(idx, _)| *idx >= 2) {
        let rest = &declaration[idx + 1..];
        let trimmed = rest.trim_start();
        if trimmed.len() < rest.len() {
            return trimmed;
        }
    }
    declaration
}

fn hover_modifiers<'a>(kind: &ScriptElementKind, modifiers: &'a str) -> Vec<&'a str> {
    modifiers
        .split(',')
        .filter(|modifier| !modifier.is_empty())
        .filter(|modifier| !(*modifier == "export" && *kind == ScriptElementKind::Constructor))
        .map(|modifier| match modifier {
            "declare" => "ambient",
            "export" => "exported",
            other => other,
        })
        .collect()
}

/// Convert quick info into hover content: declaration, kind line,
/// documentation. Empty blocks are left out.
pub fn to_hover(snapshot: &ScriptSnapshot, info: &QuickInfo) -> Hover {
    let mut contents = Vec::new();

    let display = display_parts_to_string(&info.display_parts);
    let declaration = strip_kind_annotation(&display);
    if !declaration.is_empty() {
        contents.push(MarkedString::LanguageString(LanguageString {
            language: HOVER_LANGUAGE.to_string(),
            value: declaration.to_string(),
        }));
    }

    if !info.kind.is_empty() {
        let mut kind = format!("**{}**", info.kind);
        let modifiers = hover_modifiers(&info.kind, &info.kind_modifiers);
        if !modifiers.is_empty() {
            kind.push_str(&format!(" _({})_", modifiers.join(", ")));
        }
        contents.push(MarkedString::String(kind));
    }

    let documentation = display_parts_to_string(&info.documentation);
    if !documentation.is_empty() {
        contents.push(MarkedString::String(documentation));
    }

    Hover {
        contents: HoverContents::Array(contents),
        range: Some(to_range(snapshot, info.text_span)),
    }
}

// =============================================================================
// Highlights and signature help
// =============================================================================

pub fn highlight_kind(kind: HighlightSpanKind) -> DocumentHighlightKind {
    match kind {
        HighlightSpanKind::Reference => DocumentHighlightKind::READ,
        HighlightSpanKind::WrittenReference => DocumentHighlightKind::WRITE,
        HighlightSpanKind::None | HighlightSpanKind::Definition => DocumentHighlightKind::TEXT,
    }
}

pub fn to_document_highlight(snapshot: &ScriptSnapshot, span: &HighlightSpan) -> DocumentHighlight {
    DocumentHighlight {
        range: to_range(snapshot, span.text_span),
        kind: Some(highlight_kind(span.kind)),
    }
}

fn non_empty_documentation(text: String) -> Option<Documentation> {
    (!text.is_empty()).then_some(Documentation::String(text))
}

/// Convert signature help. No items gives an empty help with both indices 0.
pub fn to_signature_help(items: Option<&SignatureHelpItems>) -> SignatureHelp {
    let Some(items) = items else {
        return SignatureHelp {
            signatures: Vec::new(),
            active_signature: Some(0),
            active_parameter: Some(0),
        };
    };

    let signatures = items
        .items
        .iter()
        .map(|item| {
            let prefix = display_parts_to_string(&item.prefix_display_parts);
            let suffix = display_parts_to_string(&item.suffix_display_parts);
            let labels: Vec<String> = item
                .parameters
                .iter()
                .map(|param| display_parts_to_string(&param.display_parts))
                .collect();
            let parameters = item
                .parameters
                .iter()
                .zip(&labels)
                .map(|(param, label)| ParameterInformation {
                    label: ParameterLabel::Simple(label.clone()),
                    documentation: non_empty_documentation(display_parts_to_string(
                        &param.documentation,
                    )),
                })
                .collect();

            SignatureInformation {
                label: format!("{prefix}{}{suffix}", labels.join(", ")),
                documentation: non_empty_documentation(display_parts_to_string(
                    &item.documentation,
                )),
                parameters: Some(parameters),
                active_parameter: None,
            }
        })
        .collect();

    SignatureHelp {
        signatures,
        active_signature: Some(to_u32(items.selected_item_index)),
        active_parameter: Some(to_u32(items.argument_index)),
    }
}

// =============================================================================
// Symbols
// =============================================================================

pub fn symbol_kind(kind: &ScriptElementKind) -> SymbolKind {
    match kind {
        ScriptElementKind::Class | ScriptElementKind::LocalClass => SymbolKind::CLASS,
        ScriptElementKind::Module => SymbolKind::MODULE,
        ScriptElementKind::Interface => SymbolKind::INTERFACE,
        ScriptElementKind::Enum => SymbolKind::ENUM,
        ScriptElementKind::EnumMember => SymbolKind::FIELD,
        ScriptElementKind::Function | ScriptElementKind::LocalFunction => SymbolKind::FUNCTION,
        ScriptElementKind::Variable
        | ScriptElementKind::LocalVariable
        | ScriptElementKind::Const
        | ScriptElementKind::Let => SymbolKind::VARIABLE,
        ScriptElementKind::Constructor => SymbolKind::CONSTRUCTOR,
        ScriptElementKind::Method => SymbolKind::METHOD,
        ScriptElementKind::Getter | ScriptElementKind::Setter => SymbolKind::PROPERTY,
        ScriptElementKind::Property => SymbolKind::FIELD,
        _ => SymbolKind::VARIABLE,
    }
}

#[allow(deprecated)]
fn symbol_information(
    name: String,
    kind: SymbolKind,
    location: Location,
    container_name: Option<String>,
) -> SymbolInformation {
    SymbolInformation {
        name,
        kind,
        tags: None,
        deprecated: None,
        location,
        container_name,
    }
}

/// Convert an outline node. Nodes without a span have no location and are
/// skipped.
pub fn tree_to_symbol_information(
    uri: &Url,
    snapshot: &ScriptSnapshot,
    item: &NavigationTree,
    container_name: Option<&str>,
) -> Option<SymbolInformation> {
    let span = item.spans.first()?;
    Some(symbol_information(
        format!("{} ({})", item.text, item.kind),
        symbol_kind(&item.kind),
        to_location(uri.clone(), snapshot, *span),
        container_name.map(str::to_string),
    ))
}

pub fn item_to_symbol_information(
    uri: Url,
    snapshot: &ScriptSnapshot,
    item: &NavigateToItem,
) -> SymbolInformation {
    symbol_information(
        format!("{} ({})", item.name, item.kind),
        symbol_kind(&item.kind),
        to_location(uri, snapshot, item.text_span),
        (!item.container_name.is_empty()).then(|| item.container_name.clone()),
    )
}

// =============================================================================
// Code actions
// =============================================================================

/// A quick fix as a `codeFix` command carrying the fix's file changes.
pub fn fix_to_command(fix: &CodeFixAction) -> serde_json::Result<Command> {
    let arguments = fix
        .changes
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<Value>>>()?;
    Ok(Command {
        title: fix.description.clone(),
        command: CommandName::CodeFix.as_str().to_string(),
        arguments: Some(arguments),
    })
}

/// One `refactor` command per action of `refactor`.
pub fn refactor_to_commands(
    refactor: &ApplicableRefactorInfo,
    file_name: &NormalizedPath,
    position_or_range: PositionOrRange,
) -> serde_json::Result<Vec<Command>> {
    refactor
        .actions
        .iter()
        .map(|action| {
            let argument = RefactorCommand {
                file_name: file_name.clone(),
                position_or_range,
                refactor_name: refactor.name.clone(),
                action_name: action.name.clone(),
            };
            Ok(Command {
                title: action.description.clone(),
                command: CommandName::Refactor.as_str().to_string(),
                arguments: Some(vec![serde_json::to_value(argument)?]),
            })
        })
        .collect()
}
