//! An engine binding that only tracks documents.
//!
//! [`MemoryEngine`] keeps client documents in memory, places every file in
//! one inferred project and honours host configuration, but performs no
//! analysis: every query succeeds with an empty answer. The server runs on
//! it when no analysis backend is linked in, and test doubles build on it
//! for the bookkeeping half of the engine boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::{
    EngineError, EngineResult, LanguageService, ProjectEvent, ProjectEventHandler, ProjectService,
};
use crate::model::{
    ApplicableRefactorInfo, CodeFixAction, CompletionInfo, CompletionOptions, DefinitionInfo,
    Diagnostic, DocumentHighlights, FileExtensionInfo, FormatCodeSettings, HostConfiguration,
    NavigateToItem, NavigationTree, PositionOrRange, ProjectId, QuickInfo, ReferenceEntry,
    RefactorEditInfo, RenameInfo, RenameLocation, SignatureHelpItems,
};
use crate::options::ServerOptions;
use crate::path::NormalizedPath;
use crate::request::CancellationToken;
use crate::text::{ScriptSnapshot, TextChange, TextSpan};

/// The single project every file belongs to.
pub const INFERRED_PROJECT: ProjectId = ProjectId(0);

#[derive(Debug)]
struct ScriptInfo {
    snapshot: Arc<ScriptSnapshot>,
    open: bool,
}

/// See the module docs.
pub struct MemoryEngine {
    options: ServerOptions,
    scripts: HashMap<NormalizedPath, ScriptInfo>,
    format_options: FormatCodeSettings,
    file_format_options: HashMap<NormalizedPath, FormatCodeSettings>,
    extra_file_extensions: Vec<FileExtensionInfo>,
    host_info: Option<String>,
    collect_due: Option<Instant>,
    event_handler: Option<ProjectEventHandler>,
}

impl MemoryEngine {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            scripts: HashMap::new(),
            format_options: FormatCodeSettings::default(),
            file_format_options: HashMap::new(),
            extra_file_extensions: Vec::new(),
            host_info: None,
            collect_due: None,
            event_handler: None,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn host_info(&self) -> Option<&str> {
        self.host_info.as_deref()
    }

    /// Number of tracked scripts, open or not.
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Drop closed scripts.
    pub fn collect(&mut self) {
        let before = self.scripts.len();
        self.scripts.retain(|_, info| info.open);
        tracing::debug!(collected = before - self.scripts.len(), "collected closed scripts");
    }

    /// Fail with [`EngineError::Cancelled`] if the current request was
    /// cancelled, then make sure `file` is tracked.
    pub fn check_request(&self, file: &NormalizedPath) -> EngineResult<Arc<ScriptSnapshot>> {
        if self.options.cancellation_token.is_cancellation_requested() {
            return Err(EngineError::Cancelled);
        }
        self.script_snapshot(file)
            .ok_or_else(|| EngineError::UnknownFile(file.clone()))
    }

    fn open_files(&self) -> Vec<NormalizedPath> {
        let mut files: Vec<_> = self
            .scripts
            .iter()
            .filter(|(_, info)| info.open)
            .map(|(path, _)| path.clone())
            .collect();
        files.sort();
        files
    }

    fn emit(&self, event: ProjectEvent) {
        if let Some(handler) = &self.event_handler {
            handler(event);
        }
    }
}

impl ProjectService for MemoryEngine {
    fn set_event_handler(&mut self, handler: ProjectEventHandler) {
        self.event_handler = Some(handler);
    }

    fn open_client_file(&mut self, file: &NormalizedPath, text: String) -> EngineResult<()> {
        self.scripts.insert(
            file.clone(),
            ScriptInfo {
                snapshot: Arc::new(ScriptSnapshot::new(text)),
                open: true,
            },
        );
        Ok(())
    }

    fn close_client_file(&mut self, file: &NormalizedPath) {
        if let Some(info) = self.scripts.get_mut(file) {
            info.open = false;
        }
        self.file_format_options.remove(file);
    }

    fn apply_changes_to_file(
        &mut self,
        file: &NormalizedPath,
        changes: &[TextChange],
    ) -> EngineResult<()> {
        let info = self
            .scripts
            .get_mut(file)
            .ok_or_else(|| EngineError::UnknownFile(file.clone()))?;
        info.snapshot = Arc::new(info.snapshot.apply_changes(changes)?);
        Ok(())
    }

    fn script_snapshot(&self, file: &NormalizedPath) -> Option<Arc<ScriptSnapshot>> {
        self.scripts.get(file).map(|info| info.snapshot.clone())
    }

    fn default_project_for_file(&self, file: &NormalizedPath) -> Option<ProjectId> {
        self.scripts.contains_key(file).then_some(INFERRED_PROJECT)
    }

    fn contains_file(&self, project: ProjectId, file: &NormalizedPath, require_open: bool) -> bool {
        project == INFERRED_PROJECT
            && self
                .scripts
                .get(file)
                .is_some_and(|info| info.open || !require_open)
    }

    fn configured_projects(&self) -> Vec<ProjectId> {
        Vec::new()
    }

    fn format_code_options(&self, file: &NormalizedPath) -> FormatCodeSettings {
        match self.file_format_options.get(file) {
            Some(options) => options.clone().or(&self.format_options),
            None => self.format_options.clone(),
        }
    }

    fn set_host_configuration(&mut self, configuration: HostConfiguration) {
        if let Some(host_info) = configuration.host_info {
            tracing::info!(host = %host_info, "host information set");
            self.host_info = Some(host_info);
        }

        if let Some(format_options) = configuration.format_options {
            match configuration.file {
                Some(file) => {
                    self.file_format_options.insert(file, format_options);
                }
                None => self.format_options = format_options,
            }
        }

        if !configuration.extra_file_extensions.is_empty()
            && configuration.extra_file_extensions != self.extra_file_extensions
        {
            self.extra_file_extensions = configuration.extra_file_extensions;
            self.emit(ProjectEvent::ProjectsUpdatedInBackground {
                open_files: self.open_files(),
            });
        }
    }

    fn schedule_collect(&mut self) {
        let now = Instant::now();
        match self.collect_due {
            Some(due) if due <= now => {
                self.collect();
                self.collect_due = None;
            }
            Some(_) => {}
            None => self.collect_due = Some(now + self.options.gc_delay),
        }
    }
}

impl LanguageService for MemoryEngine {
    fn quick_info_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Option<QuickInfo>> {
        self.check_request(file)?;
        Ok(None)
    }

    fn completions_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
        _options: &CompletionOptions,
    ) -> EngineResult<Option<CompletionInfo>> {
        self.check_request(file)?;
        Ok(None)
    }

    fn definition_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Vec<DefinitionInfo>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn references_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Vec<ReferenceEntry>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn rename_info(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<RenameInfo> {
        self.check_request(file)?;
        Ok(RenameInfo {
            can_rename: false,
            localized_error_message: Some("You cannot rename this element.".to_string()),
            display_name: String::new(),
            trigger_span: TextSpan::new(position, 0),
        })
    }

    fn find_rename_locations(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
        _find_in_strings: bool,
        _find_in_comments: bool,
    ) -> EngineResult<Vec<RenameLocation>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn document_highlights(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
        _files_to_search: &[NormalizedPath],
    ) -> EngineResult<Vec<DocumentHighlights>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn signature_help_items(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
    ) -> EngineResult<Option<SignatureHelpItems>> {
        self.check_request(file)?;
        Ok(None)
    }

    fn navigation_tree(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Option<NavigationTree>> {
        self.check_request(file)?;
        Ok(None)
    }

    fn navigate_to_items(
        &mut self,
        _project: ProjectId,
        _search_value: &str,
    ) -> EngineResult<Vec<NavigateToItem>> {
        Ok(Vec::new())
    }

    fn formatting_edits_for_document(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn formatting_edits_for_range(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _start: usize,
        _end: usize,
        _options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn formatting_edits_after_keystroke(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position: usize,
        _key: &str,
        _options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn code_fixes_at_position(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _start: usize,
        _end: usize,
        _error_codes: &[u32],
        _options: &FormatCodeSettings,
    ) -> EngineResult<Vec<CodeFixAction>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn applicable_refactors(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
        _position_or_range: PositionOrRange,
    ) -> EngineResult<Vec<ApplicableRefactorInfo>> {
        self.check_request(file)?;
        Ok(Vec::new())
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
        self.check_request(file)?;
        Ok(None)
    }

    fn syntactic_diagnostics(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }

    fn semantic_diagnostics(
        &mut self,
        _project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>> {
        self.check_request(file)?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn path(name: &str) -> NormalizedPath {
        NormalizedPath::new(name)
    }

    #[test]
    fn test_open_change_close() {
        let mut engine = MemoryEngine::new(ServerOptions::default());
        let file = path("/src/a.ts");
        engine.open_client_file(&file, "let x = 1;".to_string()).unwrap();

        assert_eq!(engine.default_project_for_file(&file), Some(INFERRED_PROJECT));
        assert!(engine.contains_file(INFERRED_PROJECT, &file, true));

        engine
            .apply_changes_to_file(&file, &[TextChange::new(TextSpan::new(8, 1), "2")])
            .unwrap();
        assert_eq!(engine.script_snapshot(&file).unwrap().text(), "let x = 2;");

        engine.close_client_file(&file);
        assert!(!engine.contains_file(INFERRED_PROJECT, &file, true));
        assert!(engine.contains_file(INFERRED_PROJECT, &file, false));
    }

    #[test]
    fn test_failed_change_leaves_text_untouched() {
        let mut engine = MemoryEngine::new(ServerOptions::default());
        let file = path("/src/a.ts");
        engine.open_client_file(&file, "abc".to_string()).unwrap();

        let result = engine.apply_changes_to_file(
            &file,
            &[
                TextChange::new(TextSpan::new(0, 1), "z"),
                TextChange::new(TextSpan::new(10, 1), ""),
            ],
        );
        assert!(matches!(result, Err(EngineError::Text(_))));
        assert_eq!(engine.script_snapshot(&file).unwrap().text(), "abc");
    }

    #[test]
    fn test_unknown_file_queries_fail() {
        let mut engine = MemoryEngine::new(ServerOptions::default());
        let result = engine.semantic_diagnostics(INFERRED_PROJECT, &path("/nope.ts"));
        assert!(matches!(result, Err(EngineError::UnknownFile(_))));
    }

    #[test]
    fn test_per_file_format_options_overlay_global() {
        let mut engine = MemoryEngine::new(ServerOptions::default());
        let file = path("/src/a.ts");
        engine.set_host_configuration(HostConfiguration {
            format_options: Some(FormatCodeSettings {
                tab_size: Some(8),
                new_line_character: Some("\n".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        engine.set_host_configuration(HostConfiguration {
            file: Some(file.clone()),
            format_options: Some(FormatCodeSettings {
                tab_size: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        });

        let options = engine.format_code_options(&file);
        assert_eq!(options.tab_size, Some(2));
        assert_eq!(options.new_line_character.as_deref(), Some("\n"));
        assert_eq!(engine.format_code_options(&path("/other.ts")).tab_size, Some(8));
    }

    #[test]
    fn test_new_file_extensions_raise_background_update() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut engine = MemoryEngine::new(ServerOptions::default());
        engine.set_event_handler(Box::new(move |event| sink.lock().unwrap().push(event)));
        engine.open_client_file(&path("/b.ts"), String::new()).unwrap();
        engine.open_client_file(&path("/a.ts"), String::new()).unwrap();

        let configuration = HostConfiguration {
            extra_file_extensions: vec![FileExtensionInfo {
                extension: ".vue".to_string(),
                is_mixed_content: true,
            }],
            ..Default::default()
        };
        engine.set_host_configuration(configuration.clone());
        engine.set_host_configuration(configuration);

        assert_eq!(
            *events.lock().unwrap(),
            vec![ProjectEvent::ProjectsUpdatedInBackground {
                open_files: vec![path("/a.ts"), path("/b.ts")],
            }]
        );
    }

    #[test]
    fn test_collect_drops_closed_scripts_after_delay() {
        let mut engine = MemoryEngine::new(ServerOptions {
            gc_delay: Duration::ZERO,
            ..Default::default()
        });
        engine.open_client_file(&path("/a.ts"), String::new()).unwrap();
        engine.open_client_file(&path("/b.ts"), String::new()).unwrap();
        engine.close_client_file(&path("/b.ts"));

        engine.schedule_collect();
        assert_eq!(engine.script_count(), 2);
        engine.schedule_collect();
        assert_eq!(engine.script_count(), 1);
    }
}
