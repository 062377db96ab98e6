//! A scripted engine for driving a [`Session`] in tests.
//!
//! Document bookkeeping is delegated to [`MemoryEngine`]; query answers come
//! from a [`Script`] the test can change while the session owns the engine.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tower_lsp::lsp_types::{
    Diagnostic as LspDiagnostic, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, Position, Range, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, Url,
    VersionedTextDocumentIdentifier,
};

use tsbridge_lsp::{Outgoing, Session};
use tsbridge_lsp_core::model::{
    ApplicableRefactorInfo, CodeFixAction, CompletionInfo, CompletionOptions, DefinitionInfo,
    Diagnostic, DocumentHighlights, FormatCodeSettings, HostConfiguration, NavigateToItem,
    NavigationTree, PositionOrRange, ProjectId, QuickInfo, ReferenceEntry, RefactorEditInfo,
    RenameInfo, RenameLocation, SignatureHelpItems,
};
use tsbridge_lsp_core::{
    EngineError, EngineResult, LanguageService, MemoryEngine, NormalizedPath,
    NullCancellationToken, ProjectEventHandler, ProjectService, ScriptSnapshot, ServerOptions,
    TextChange, TextSpan,
};

pub const TYPE_MISMATCH: u32 = 2322;
pub const TYPE_MISMATCH_MESSAGE: &str = "Type 'number' is not assignable to type 'string'.";

/// Scripted answers and a record of what the session asked for.
#[derive(Default)]
pub struct Script {
    /// Files whose semantic check fails.
    pub failing: HashSet<NormalizedPath>,
    /// Files reported as no longer part of their project.
    pub detached: HashSet<NormalizedPath>,
    pub can_rename: bool,
    pub rename_locations: Vec<RenameLocation>,
    pub quick_info: Option<QuickInfo>,
    pub definitions: Vec<DefinitionInfo>,
    pub navigation_tree: Option<NavigationTree>,
    pub fixes: Vec<CodeFixAction>,
    pub refactors: Vec<ApplicableRefactorInfo>,
    pub refactor_edits: Option<RefactorEditInfo>,
    pub format_edits: Vec<TextChange>,

    /// Files in the order their semantic check ran.
    pub semantic_checks: Vec<NormalizedPath>,
    pub error_codes: Vec<u32>,
    pub format_options: Option<FormatCodeSettings>,
    pub collects: usize,
}

pub struct FakeEngine {
    inner: MemoryEngine,
    script: Arc<Mutex<Script>>,
}

impl FakeEngine {
    pub fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        let engine = Self {
            inner: MemoryEngine::new(ServerOptions::default()),
            script: script.clone(),
        };
        (engine, script)
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

/// Flag every `: string = <digits>` initializer.
fn type_mismatches(file: &NormalizedPath, snapshot: &Arc<ScriptSnapshot>) -> Vec<Diagnostic> {
    const PATTERN: &str = ": string = ";
    let text = snapshot.text();
    let mut diagnostics = Vec::new();
    for (index, _) in text.match_indices(PATTERN) {
        let literal_start = index + PATTERN.len();
        let digits = text[literal_start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .count();
        if digits == 0 {
            continue;
        }
        let start = text[..literal_start].encode_utf16().count();
        diagnostics.push(
            Diagnostic::error(TYPE_MISMATCH, TYPE_MISMATCH_MESSAGE).at(
                file.clone(),
                snapshot.clone(),
                TextSpan::new(start, digits),
            ),
        );
    }
    diagnostics
}

impl ProjectService for FakeEngine {
    fn set_event_handler(&mut self, handler: ProjectEventHandler) {
        self.inner.set_event_handler(handler);
    }

    fn open_client_file(&mut self, file: &NormalizedPath, text: String) -> EngineResult<()> {
        self.inner.open_client_file(file, text)
    }

    fn close_client_file(&mut self, file: &NormalizedPath) {
        self.inner.close_client_file(file);
    }

    fn apply_changes_to_file(
        &mut self,
        file: &NormalizedPath,
        changes: &[TextChange],
    ) -> EngineResult<()> {
        self.inner.apply_changes_to_file(file, changes)
    }

    fn script_snapshot(&self, file: &NormalizedPath) -> Option<Arc<ScriptSnapshot>> {
        self.inner.script_snapshot(file)
    }

    fn default_project_for_file(&self, file: &NormalizedPath) -> Option<ProjectId> {
        self.inner.default_project_for_file(file)
    }

    fn contains_file(&self, project: ProjectId, file: &NormalizedPath, require_open: bool) -> bool {
        !self.script().detached.contains(file) && self.inner.contains_file(project, file, require_open)
    }

    fn configured_projects(&self) -> Vec<ProjectId> {
        self.inner.configured_projects()
    }

    fn format_code_options(&self, file: &NormalizedPath) -> FormatCodeSettings {
        self.inner.format_code_options(file)
    }

    fn set_host_configuration(&mut self, configuration: HostConfiguration) {
        self.inner.set_host_configuration(configuration);
    }

    fn schedule_collect(&mut self) {
        self.script().collects += 1;
    }
}

impl LanguageService for FakeEngine {
    fn quick_info_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Option<QuickInfo>> {
        self.inner.check_request(file)?;
        Ok(self.script().quick_info.clone())
    }

    fn completions_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        options: &CompletionOptions,
    ) -> EngineResult<Option<CompletionInfo>> {
        self.inner
            .completions_at_position(project, file, position, options)
    }

    fn definition_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Vec<DefinitionInfo>> {
        self.inner.check_request(file)?;
        Ok(self.script().definitions.clone())
    }

    fn references_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Vec<ReferenceEntry>> {
        self.inner.references_at_position(project, file, position)
    }

    fn rename_info(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<RenameInfo> {
        let mut info = self.inner.rename_info(project, file, position)?;
        if self.script().can_rename {
            info.can_rename = true;
            info.localized_error_message = None;
        }
        Ok(info)
    }

    fn find_rename_locations(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
        _find_in_strings: bool,
        _find_in_comments: bool,
    ) -> EngineResult<Vec<RenameLocation>> {
        self.inner.check_request(file)?;
        Ok(self.script().rename_locations.clone())
    }

    fn document_highlights(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        files_to_search: &[NormalizedPath],
    ) -> EngineResult<Vec<DocumentHighlights>> {
        self.inner
            .document_highlights(project, file, position, files_to_search)
    }

    fn signature_help_items(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Option<SignatureHelpItems>> {
        self.inner.signature_help_items(project, file, position)
    }

    fn navigation_tree(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Option<NavigationTree>> {
        self.inner.check_request(file)?;
        Ok(self.script().navigation_tree.clone())
    }

    fn navigate_to_items(
        &mut self,
        project: ProjectId,
        search_value: &str,
    ) -> EngineResult<Vec<NavigateToItem>> {
        self.inner.navigate_to_items(project, search_value)
    }

    fn formatting_edits_for_document(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.inner.check_request(file)?;
        let mut script = self.script();
        script.format_options = Some(options.clone());
        Ok(script.format_edits.clone())
    }

    fn formatting_edits_for_range(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        start: usize,
        end: usize,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.inner
            .formatting_edits_for_range(project, file, start, end, options)
    }

    fn formatting_edits_after_keystroke(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        key: &str,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.inner
            .formatting_edits_after_keystroke(project, file, position, key, options)
    }

    fn code_fixes_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _start: usize,
        _end: usize,
        error_codes: &[u32],
        _options: &FormatCodeSettings,
    ) -> EngineResult<Vec<CodeFixAction>> {
        self.inner.check_request(file)?;
        let mut script = self.script();
        script.error_codes = error_codes.to_vec();
        Ok(script.fixes.clone())
    }

    fn applicable_refactors(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position_or_range: PositionOrRange,
    ) -> EngineResult<Vec<ApplicableRefactorInfo>> {
        self.inner.check_request(file)?;
        Ok(self.script().refactors.clone())
    }

    fn edits_for_refactor(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _options: &FormatCodeSettings,
        _position_or_range: PositionOrRange,
        _refactor_name: &str,
        _action_name: &str,
    ) -> EngineResult<Option<RefactorEditInfo>> {
        self.inner.check_request(file)?;
        Ok(self.script().refactor_edits.clone())
    }

    fn syntactic_diagnostics(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>> {
        self.inner.syntactic_diagnostics(project, file)
    }

    fn semantic_diagnostics(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>> {
        let snapshot = self.inner.check_request(file)?;
        let mut script = self.script();
        script.semantic_checks.push(file.clone());
        if script.failing.contains(file) {
            return Err(EngineError::Failed(format!("checker crashed on {file}")));
        }
        Ok(type_mismatches(file, &snapshot))
    }
}

// =============================================================================
// Session helpers
// =============================================================================

pub fn new_session() -> (Session, Arc<Mutex<Script>>) {
    let (engine, script) = FakeEngine::new();
    let session = Session::new(Box::new(engine), Arc::new(NullCancellationToken));
    (session, script)
}

pub fn uri(path: &str) -> Url {
    Url::from_file_path(path).unwrap()
}

pub fn path(path: &str) -> NormalizedPath {
    NormalizedPath::new(path)
}

pub fn open(session: &mut Session, file: &str, text: &str, now: Instant) {
    session
        .did_open(
            DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri(file),
                    language_id: "typescript".to_string(),
                    version: 1,
                    text: text.to_string(),
                },
            },
            now,
        )
        .unwrap();
}

pub fn edit(session: &mut Session, file: &str, range: Option<Range>, text: &str, now: Instant) {
    session
        .did_change(
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri(file),
                    version: 2,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range,
                    range_length: None,
                    text: text.to_string(),
                }],
            },
            now,
        )
        .unwrap();
}

pub fn close(session: &mut Session, file: &str, now: Instant) {
    session
        .did_close(
            DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri(file) },
            },
            now,
        )
        .unwrap();
}

pub fn at(file: &str, line: u32, character: u32) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: uri(file) },
        position: Position { line, character },
    }
}

pub fn range(start: (u32, u32), end: (u32, u32)) -> Range {
    Range {
        start: Position {
            line: start.0,
            character: start.1,
        },
        end: Position {
            line: end.0,
            character: end.1,
        },
    }
}

/// Run every step due at `now` and return what was queued.
pub fn run_until(session: &mut Session, now: Instant) -> Vec<Outgoing> {
    while session.run_pending(now) {}
    session.take_outgoing()
}

/// Advance a virtual clock until nothing is scheduled, returning each batch
/// of messages with the time it was sent.
pub fn run_to_completion(session: &mut Session, start: Instant) -> Vec<(Duration, Vec<Outgoing>)> {
    let mut sent = Vec::new();
    while let Some(deadline) = session.next_wakeup() {
        let outgoing = run_until(session, deadline);
        if !outgoing.is_empty() {
            sent.push((deadline.duration_since(start), outgoing));
        }
    }
    sent
}

/// Diagnostics published for `file`, in order.
pub fn published_for(outgoing: &[Outgoing], file: &str) -> Vec<Vec<LspDiagnostic>> {
    let target = uri(file);
    outgoing
        .iter()
        .filter_map(|message| match message {
            Outgoing::PublishDiagnostics { uri, diagnostics } if *uri == target => {
                Some(diagnostics.clone())
            }
            _ => None,
        })
        .collect()
}
