//! The request router.
//!
//! A [`Session`] owns the engine and everything the server remembers between
//! requests: the open documents, the change counter and the background
//! diagnostics operation. Each protocol request maps to one method. Methods
//! run synchronously; messages the server wants to send on its own
//! (diagnostics, workspace edits) are queued in an outbox the transport
//! drains after every call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use serde_json::Value;
use tower_lsp::lsp_types::{
    CodeActionOrCommand, CodeActionParams, CompletionItem, Diagnostic as LspDiagnostic,
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentFormattingParams, DocumentHighlight,
    DocumentOnTypeFormattingParams, DocumentRangeFormattingParams, DocumentSymbolParams,
    ExecuteCommandParams,
    FormattingOptions, Hover, InitializeParams, InitializeResult, Location, NumberOrString,
    ReferenceParams, RenameParams, ServerInfo, SignatureHelp, SymbolInformation,
    TextDocumentPositionParams, TextEdit, Url, WorkspaceEdit, WorkspaceSymbolParams,
};

use tsbridge_lsp_core::model::{
    CompletionOptions, FileTextChanges, FormatCodeSettings, HostConfiguration, PositionOrRange,
    ProjectId,
};
use tsbridge_lsp_core::{
    Engine, EngineError, LanguageService, MultistepOperation, NormalizedPath, OperationHost,
    ProjectEvent, ProjectService, RequestId, ScriptSnapshot, SharedCancellationToken, TextChange,
    TextSpan,
};

use crate::capabilities::server_capabilities;
use crate::commands::ExecuteCommand;
use crate::convert;
use crate::diagnostics;
use crate::error::{SessionError, SessionResult};
use crate::paths::{path_to_uri, uri_to_path};
use crate::symbols::relevant_symbols;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "tsbridge";

/// A message the server sends without being asked.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// `textDocument/publishDiagnostics`; replaces what the client shows for `uri`.
    PublishDiagnostics {
        uri: Url,
        diagnostics: Vec<LspDiagnostic>,
    },
    /// `workspace/applyEdit`.
    ApplyEdit(WorkspaceEdit),
}

/// Session state shared by request handlers and diagnostics steps.
pub struct SessionState {
    pub(crate) engine: Box<dyn Engine>,
    /// Documents open in the client, oldest first.
    pub(crate) open_files: IndexSet<NormalizedPath>,
    /// Bumped on every edit and background project update.
    pub(crate) change_seq: u64,
    pub(crate) outbox: Vec<Outgoing>,
    next_request: u64,
    token: SharedCancellationToken,
}

impl OperationHost for SessionState {
    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn request_completed(&mut self, request: RequestId) {
        tracing::debug!(request_id = %request, "diagnostics request completed");
    }

    fn cancellation_token(&self) -> SharedCancellationToken {
        self.token.clone()
    }

    fn log_error(&mut self, request: RequestId, error: &EngineError) {
        tracing::error!(request_id = %request, %error, "diagnostics request failed");
    }
}

/// A document resolved to everything a query needs.
struct DocumentContext {
    uri: Url,
    file: NormalizedPath,
    project: ProjectId,
    snapshot: Arc<ScriptSnapshot>,
}

impl SessionState {
    pub(crate) fn new(engine: Box<dyn Engine>, token: SharedCancellationToken) -> Self {
        Self {
            engine,
            open_files: IndexSet::new(),
            change_seq: 0,
            outbox: Vec::new(),
            next_request: 0,
            token,
        }
    }

    /// Resolve a document URI. Gives the engine a collection tick, as every
    /// request does.
    fn resolve(&mut self, uri: &Url) -> SessionResult<DocumentContext> {
        self.engine.schedule_collect();
        self.try_resolve(uri).inspect_err(|error| {
            tracing::error!(%uri, %error, "could not resolve document");
        })
    }

    fn try_resolve(&self, uri: &Url) -> SessionResult<DocumentContext> {
        let file = uri_to_path(uri)?;
        let project = self
            .engine
            .default_project_for_file(&file)
            .ok_or_else(|| SessionError::NoProject(file.clone()))?;
        let snapshot = self
            .engine
            .script_snapshot(&file)
            .ok_or_else(|| SessionError::UnknownFile(file.clone()))?;
        Ok(DocumentContext {
            uri: uri.clone(),
            file,
            project,
            snapshot,
        })
    }

    /// Location of `span` in `file`, which need not be open.
    fn location(&self, file: &NormalizedPath, span: TextSpan) -> SessionResult<Location> {
        let snapshot = self
            .engine
            .script_snapshot(file)
            .ok_or_else(|| SessionError::UnknownFile(file.clone()))?;
        Ok(convert::to_location(path_to_uri(file)?, &snapshot, span))
    }

    fn format_options(&self, file: &NormalizedPath, editor: &FormattingOptions) -> FormatCodeSettings {
        FormatCodeSettings::default()
            .with_editor_options(editor.tab_size, editor.insert_spaces)
            .or(&self.engine.format_code_options(file))
    }

    fn to_text_edits(snapshot: &ScriptSnapshot, changes: &[TextChange]) -> Vec<TextEdit> {
        changes
            .iter()
            .map(|change| convert::to_text_edit(snapshot, change))
            .collect()
    }

    fn to_workspace_edit(&self, changes: &[FileTextChanges]) -> SessionResult<WorkspaceEdit> {
        let mut edits: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for change in changes {
            let snapshot = match self.engine.script_snapshot(&change.file_name) {
                Some(snapshot) => snapshot,
                None if change.is_new_file => Arc::new(ScriptSnapshot::new("")),
                None => return Err(SessionError::UnknownFile(change.file_name.clone())),
            };
            for text_change in &change.text_changes {
                snapshot
                    .slice(text_change.span)
                    .map_err(|source| SessionError::InvalidEdit {
                        file: change.file_name.clone(),
                        source,
                    })?;
            }
            edits
                .entry(path_to_uri(&change.file_name)?)
                .or_default()
                .extend(Self::to_text_edits(&snapshot, &change.text_changes));
        }
        Ok(WorkspaceEdit {
            changes: Some(edits),
            ..Default::default()
        })
    }
}

/// See the module docs.
pub struct Session {
    state: SessionState,
    error_check: MultistepOperation<SessionState>,
}

impl Session {
    pub fn new(engine: Box<dyn Engine>, token: SharedCancellationToken) -> Self {
        Self {
            state: SessionState::new(engine, token),
            error_check: MultistepOperation::new(),
        }
    }

    pub fn change_seq(&self) -> u64 {
        self.state.change_seq
    }

    /// Open documents, oldest first.
    pub fn open_files(&self) -> impl Iterator<Item = &NormalizedPath> {
        self.state.open_files.iter()
    }

    /// Drain messages queued for the client.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.state.outbox)
    }

    /// When background work next wants to run.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.error_check.next_deadline()
    }

    /// Run one due diagnostics step. Returns whether one ran.
    pub fn run_pending(&mut self, now: Instant) -> bool {
        self.error_check.run_pending(&mut self.state, now)
    }

    fn request_diagnostics(&mut self, now: Instant) {
        diagnostics::request_diagnostics(&mut self.error_check, &mut self.state, now);
    }

    // =========================================================================
    // Lifecycle and document sync
    // =========================================================================

    pub fn initialize(&mut self, params: &InitializeParams) -> InitializeResult {
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                "initializing"
            );
        }
        InitializeResult {
            capabilities: server_capabilities(),
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        }
    }

    pub fn did_open(&mut self, params: DidOpenTextDocumentParams, now: Instant) -> SessionResult<()> {
        let file = uri_to_path(&params.text_document.uri)?;
        tracing::info!(%file, "opened");
        self.state
            .engine
            .open_client_file(&file, params.text_document.text)
            .inspect_err(|error| tracing::error!(%file, %error, "could not open file"))?;
        self.state.open_files.insert(file);
        self.request_diagnostics(now);
        Ok(())
    }

    /// Apply an edit, then request fresh diagnostics whether or not the edit
    /// applied.
    pub fn did_change(
        &mut self,
        params: DidChangeTextDocumentParams,
        now: Instant,
    ) -> SessionResult<()> {
        let result = self.apply_edit(&params);
        if let Err(error) = &result {
            tracing::error!(uri = %params.text_document.uri, %error, "could not apply edit");
        }
        self.request_diagnostics(now);
        result
    }

    fn apply_edit(&mut self, params: &DidChangeTextDocumentParams) -> SessionResult<()> {
        let file = uri_to_path(&params.text_document.uri)?;
        let mut current = self
            .state
            .engine
            .script_snapshot(&file)
            .ok_or_else(|| SessionError::UnknownFile(file.clone()))?;

        self.state.change_seq += 1;

        // Ranges of later changes refer to the text produced by earlier ones.
        let mut changes = Vec::with_capacity(params.content_changes.len());
        for event in &params.content_changes {
            let span = match &event.range {
                Some(range) => convert::to_span(&current, range),
                None => TextSpan::new(0, current.len()),
            };
            let change = TextChange::new(span, event.text.clone());
            current = Arc::new(current.apply_change(&change).map_err(EngineError::from)?);
            changes.push(change);
        }

        self.state.engine.apply_changes_to_file(&file, &changes)?;
        Ok(())
    }

    pub fn did_close(&mut self, params: DidCloseTextDocumentParams, now: Instant) -> SessionResult<()> {
        let uri = params.text_document.uri;
        let file = uri_to_path(&uri)?;
        tracing::info!(%file, "closed");
        self.state.engine.close_client_file(&file);
        self.state.open_files.shift_remove(&file);
        self.state.outbox.push(Outgoing::PublishDiagnostics {
            uri,
            diagnostics: Vec::new(),
        });
        self.request_diagnostics(now);
        Ok(())
    }

    /// Hand client settings to the engine. Settings that do not decode are
    /// ignored.
    pub fn did_change_configuration(&mut self, params: DidChangeConfigurationParams) {
        match serde_json::from_value::<HostConfiguration>(params.settings) {
            Ok(configuration) => self.state.engine.set_host_configuration(configuration),
            Err(error) => tracing::warn!(%error, "ignoring unrecognized configuration"),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn hover(&mut self, params: &TextDocumentPositionParams) -> SessionResult<Option<Hover>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &params.position);
        let info = self
            .state
            .engine
            .quick_info_at_position(doc.project, &doc.file, position)?;
        Ok(info.map(|info| convert::to_hover(&doc.snapshot, &info)))
    }

    pub fn completion(
        &mut self,
        params: &TextDocumentPositionParams,
    ) -> SessionResult<Vec<CompletionItem>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &params.position);
        let options = CompletionOptions {
            include_external_module_exports: false,
            include_insert_text_completions: false,
        };
        let Some(info) = self
            .state
            .engine
            .completions_at_position(doc.project, &doc.file, position, &options)?
        else {
            return Ok(Vec::new());
        };
        Ok(info
            .entries
            .iter()
            .map(|entry| convert::to_completion_item(&doc.snapshot, entry, params))
            .collect())
    }

    pub fn definition(&mut self, params: &TextDocumentPositionParams) -> SessionResult<Vec<Location>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &params.position);
        let definitions = self
            .state
            .engine
            .definition_at_position(doc.project, &doc.file, position)?;
        definitions
            .iter()
            .map(|definition| self.state.location(&definition.file_name, definition.text_span))
            .collect()
    }

    pub fn references(&mut self, params: &ReferenceParams) -> SessionResult<Vec<Location>> {
        let position_params = &params.text_document_position;
        let doc = self.state.resolve(&position_params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &position_params.position);
        let references = self
            .state
            .engine
            .references_at_position(doc.project, &doc.file, position)?;
        references
            .iter()
            .filter(|reference| params.context.include_declaration || !reference.is_definition)
            .map(|reference| self.state.location(&reference.file_name, reference.text_span))
            .collect()
    }

    pub fn document_highlight(
        &mut self,
        params: &TextDocumentPositionParams,
    ) -> SessionResult<Vec<DocumentHighlight>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &params.position);
        let highlights = self.state.engine.document_highlights(
            doc.project,
            &doc.file,
            position,
            std::slice::from_ref(&doc.file),
        )?;
        Ok(highlights
            .iter()
            .filter(|highlights| highlights.file_name == doc.file)
            .flat_map(|highlights| &highlights.highlight_spans)
            .map(|span| convert::to_document_highlight(&doc.snapshot, span))
            .collect())
    }

    pub fn signature_help(&mut self, params: &TextDocumentPositionParams) -> SessionResult<SignatureHelp> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &params.position);
        let items = self
            .state
            .engine
            .signature_help_items(doc.project, &doc.file, position)?;
        Ok(convert::to_signature_help(items.as_ref()))
    }

    /// Rename the symbol under the cursor, grouping edits per document.
    pub fn rename(&mut self, params: &RenameParams) -> SessionResult<WorkspaceEdit> {
        let position_params = &params.text_document_position;
        let doc = self.state.resolve(&position_params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &position_params.position);

        let info = self.state.engine.rename_info(doc.project, &doc.file, position)?;
        if !info.can_rename {
            tracing::info!(
                file = %doc.file,
                reason = info.localized_error_message.as_deref().unwrap_or_default(),
                "rename rejected"
            );
            return Err(SessionError::CannotRename);
        }

        let locations = self
            .state
            .engine
            .find_rename_locations(doc.project, &doc.file, position, false, true)?;
        let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for location in &locations {
            let Location { uri, range } = self.state.location(&location.file_name, location.text_span)?;
            changes.entry(uri).or_default().push(TextEdit {
                range,
                new_text: params.new_name.clone(),
            });
        }
        Ok(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        })
    }

    pub fn formatting(&mut self, params: &DocumentFormattingParams) -> SessionResult<Vec<TextEdit>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let options = self.state.format_options(&doc.file, &params.options);
        let edits = self
            .state
            .engine
            .formatting_edits_for_document(doc.project, &doc.file, &options)?;
        Ok(SessionState::to_text_edits(&doc.snapshot, &edits))
    }

    pub fn range_formatting(
        &mut self,
        params: &DocumentRangeFormattingParams,
    ) -> SessionResult<Vec<TextEdit>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let span = convert::to_span(&doc.snapshot, &params.range);
        let options = self.state.format_options(&doc.file, &params.options);
        let edits = self.state.engine.formatting_edits_for_range(
            doc.project,
            &doc.file,
            span.start,
            span.end(),
            &options,
        )?;
        Ok(SessionState::to_text_edits(&doc.snapshot, &edits))
    }

    pub fn on_type_formatting(
        &mut self,
        params: &DocumentOnTypeFormattingParams,
    ) -> SessionResult<Vec<TextEdit>> {
        let position_params = &params.text_document_position;
        let doc = self.state.resolve(&position_params.text_document.uri)?;
        let position = convert::to_offset(&doc.snapshot, &position_params.position);
        let options = self.state.format_options(&doc.file, &params.options);
        let edits = self.state.engine.formatting_edits_after_keystroke(
            doc.project,
            &doc.file,
            position,
            &params.ch,
            &options,
        )?;
        Ok(SessionState::to_text_edits(&doc.snapshot, &edits))
    }

    pub fn document_symbol(
        &mut self,
        params: &DocumentSymbolParams,
    ) -> SessionResult<Vec<SymbolInformation>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let Some(tree) = self.state.engine.navigation_tree(doc.project, &doc.file)? else {
            return Ok(Vec::new());
        };
        Ok(relevant_symbols(&tree)
            .filter_map(|(node, container)| {
                convert::tree_to_symbol_information(
                    &doc.uri,
                    &doc.snapshot,
                    node,
                    container.as_deref(),
                )
            })
            .collect())
    }

    /// Search every configured project. Hits in files the engine no longer
    /// tracks are skipped.
    pub fn workspace_symbol(
        &mut self,
        params: &WorkspaceSymbolParams,
    ) -> SessionResult<Vec<SymbolInformation>> {
        let mut symbols = Vec::new();
        for project in self.state.engine.configured_projects() {
            let items = self.state.engine.navigate_to_items(project, &params.query)?;
            for item in &items {
                let Some(snapshot) = self.state.engine.script_snapshot(&item.file_name) else {
                    tracing::warn!(file = %item.file_name, "no script info for symbol");
                    continue;
                };
                let uri = path_to_uri(&item.file_name)?;
                symbols.push(convert::item_to_symbol_information(uri, &snapshot, item));
            }
        }
        Ok(symbols)
    }

    // =========================================================================
    // Code actions and commands
    // =========================================================================

    /// Quick fixes for the diagnostics in range, then applicable refactors.
    pub fn code_action(&mut self, params: &CodeActionParams) -> SessionResult<Vec<CodeActionOrCommand>> {
        let doc = self.state.resolve(&params.text_document.uri)?;
        let span = convert::to_span(&doc.snapshot, &params.range);
        let error_codes: Vec<u32> = params
            .context
            .diagnostics
            .iter()
            .filter_map(|diagnostic| match diagnostic.code {
                Some(NumberOrString::Number(code)) => u32::try_from(code).ok(),
                _ => None,
            })
            .collect();
        let options = self.state.engine.format_code_options(&doc.file);

        let fixes = self.state.engine.code_fixes_at_position(
            doc.project,
            &doc.file,
            span.start,
            span.end(),
            &error_codes,
            &options,
        )?;
        let position_or_range = PositionOrRange::from_bounds(span.start, span.end());
        let refactors =
            self.state
                .engine
                .applicable_refactors(doc.project, &doc.file, position_or_range)?;
        tracing::debug!(
            file = %doc.file,
            fixes = fixes.len(),
            refactors = refactors.len(),
            "code actions"
        );

        let mut actions = Vec::new();
        for fix in &fixes {
            actions.push(CodeActionOrCommand::Command(encode(convert::fix_to_command(fix))?));
        }
        for refactor in &refactors {
            let commands = encode(convert::refactor_to_commands(
                refactor,
                &doc.file,
                position_or_range,
            ))?;
            actions.extend(commands.into_iter().map(CodeActionOrCommand::Command));
        }
        Ok(actions)
    }

    /// Run a command produced by [`code_action`](Self::code_action). The
    /// resulting edit is queued as a `workspace/applyEdit` request.
    pub fn execute_command(
        &mut self,
        params: ExecuteCommandParams,
    ) -> SessionResult<Option<Value>> {
        self.state.engine.schedule_collect();
        let edit = match ExecuteCommand::parse(params)? {
            ExecuteCommand::CodeFix(changes) => self.state.to_workspace_edit(&changes)?,
            ExecuteCommand::Refactor(refactor) => {
                let file = &refactor.file_name;
                let project = self
                    .state
                    .engine
                    .default_project_for_file(file)
                    .ok_or_else(|| SessionError::NoProject(file.clone()))?;
                let options = self.state.engine.format_code_options(file);
                tracing::info!(
                    %file,
                    refactor = %refactor.refactor_name,
                    action = %refactor.action_name,
                    "getting edits for refactor"
                );
                let Some(info) = self.state.engine.edits_for_refactor(
                    project,
                    file,
                    &options,
                    refactor.position_or_range,
                    &refactor.refactor_name,
                    &refactor.action_name,
                )?
                else {
                    return Ok(None);
                };
                self.state.to_workspace_edit(&info.edits)?
            }
        };
        self.state.outbox.push(Outgoing::ApplyEdit(edit));
        Ok(None)
    }

    // =========================================================================
    // Engine events
    // =========================================================================

    pub fn handle_project_event(&mut self, event: ProjectEvent, now: Instant) {
        match event {
            ProjectEvent::ProjectsUpdatedInBackground { open_files } => {
                tracing::info!(files = open_files.len(), "projects updated in background");
                if !open_files.is_empty() {
                    self.state.change_seq += 1;
                    diagnostics::recheck_in_background(
                        &mut self.error_check,
                        &mut self.state,
                        open_files,
                        now,
                    );
                }
            }
            ProjectEvent::ConfigFileDiagnostics {
                config_file,
                trigger_file,
                diagnostics,
            } => {
                let messages: Vec<String> = diagnostics
                    .iter()
                    .map(|diagnostic| diagnostic.message.flatten(" "))
                    .collect();
                tracing::info!(
                    config = %config_file,
                    trigger = %trigger_file,
                    "config file diagnostics: {}",
                    messages.join(", ")
                );
                match path_to_uri(&config_file) {
                    Ok(uri) => self.state.outbox.push(Outgoing::PublishDiagnostics {
                        uri,
                        diagnostics: diagnostics.iter().map(convert::diagnostic_to_lsp).collect(),
                    }),
                    Err(error) => tracing::warn!(%error, "not publishing config file diagnostics"),
                }
            }
            ProjectEvent::LanguageServiceState {
                project_name,
                enabled,
            } => {
                tracing::info!(project = %project_name, enabled, "language service state changed");
            }
        }
    }
}

fn encode<T>(result: serde_json::Result<T>) -> SessionResult<T> {
    result.map_err(|source| SessionError::InvalidArguments {
        command: "codeAction".to_string(),
        source,
    })
}
