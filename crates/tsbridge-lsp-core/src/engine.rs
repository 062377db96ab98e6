//! The boundary to the analysis engine.
//!
//! The engine is split the same way the session uses it:
//!
//! - [`ProjectService`] tracks client documents, owns the projects they
//!   belong to and reports background project changes.
//! - [`LanguageService`] answers queries about a file within a project.
//!
//! Anything implementing both (and `Send`) is an [`Engine`].

use std::sync::Arc;

use thiserror::Error;

use crate::model::{
    ApplicableRefactorInfo, CodeFixAction, CompletionInfo, CompletionOptions, DefinitionInfo,
    Diagnostic, DocumentHighlights, FormatCodeSettings, HostConfiguration, NavigateToItem,
    NavigationTree, PositionOrRange, ProjectId, QuickInfo, ReferenceEntry, RefactorEditInfo,
    RenameInfo, RenameLocation, SignatureHelpItems,
};
use crate::path::NormalizedPath;
use crate::text::{ScriptSnapshot, TextChange, TextError};

/// Errors reported by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The current request was cancelled while the engine worked on it.
    #[error("operation was cancelled")]
    Cancelled,

    #[error("no script info for file {0}")]
    UnknownFile(NormalizedPath),

    #[error("no project for file {0}")]
    NoProject(NormalizedPath),

    #[error(transparent)]
    Text(#[from] TextError),

    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Notifications the engine raises outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    /// Project structure changed (a config file was edited, a dependency
    /// appeared); the listed open files need fresh diagnostics.
    ProjectsUpdatedInBackground { open_files: Vec<NormalizedPath> },

    /// Problems found while loading a project configuration file.
    ConfigFileDiagnostics {
        config_file: NormalizedPath,
        trigger_file: NormalizedPath,
        diagnostics: Vec<Diagnostic>,
    },

    /// The language service of a project was switched on or off.
    LanguageServiceState { project_name: String, enabled: bool },
}

/// Receives [`ProjectEvent`]s. Called from whatever thread the engine raises
/// the event on.
pub type ProjectEventHandler = Box<dyn Fn(ProjectEvent) + Send + Sync>;

/// Document and project bookkeeping.
pub trait ProjectService {
    fn set_event_handler(&mut self, handler: ProjectEventHandler);

    /// Start tracking `file` as opened by the client with `text`.
    fn open_client_file(&mut self, file: &NormalizedPath, text: String) -> EngineResult<()>;

    fn close_client_file(&mut self, file: &NormalizedPath);

    /// Apply `changes` in order. Either all of them apply or none does.
    fn apply_changes_to_file(
        &mut self,
        file: &NormalizedPath,
        changes: &[TextChange],
    ) -> EngineResult<()>;

    /// Current text of a tracked file.
    fn script_snapshot(&self, file: &NormalizedPath) -> Option<Arc<ScriptSnapshot>>;

    fn default_project_for_file(&self, file: &NormalizedPath) -> Option<ProjectId>;

    /// Whether `project` still owns `file`. With `require_open`, the file
    /// must also still be open in the client.
    fn contains_file(&self, project: ProjectId, file: &NormalizedPath, require_open: bool) -> bool;

    /// Projects backed by a configuration file, searched by workspace symbol
    /// queries.
    fn configured_projects(&self) -> Vec<ProjectId>;

    fn format_code_options(&self, file: &NormalizedPath) -> FormatCodeSettings;

    fn set_host_configuration(&mut self, configuration: HostConfiguration);

    /// Hint that the engine may collect unused projects soon.
    fn schedule_collect(&mut self) {}
}

/// Queries over a file within a project. Positions are UTF-16 offsets.
pub trait LanguageService {
    fn quick_info_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Option<QuickInfo>>;

    fn completions_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        options: &CompletionOptions,
    ) -> EngineResult<Option<CompletionInfo>>;

    fn definition_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Vec<DefinitionInfo>>;

    fn references_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Vec<ReferenceEntry>>;

    fn rename_info(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<RenameInfo>;

    fn find_rename_locations(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        find_in_strings: bool,
        find_in_comments: bool,
    ) -> EngineResult<Vec<RenameLocation>>;

    fn document_highlights(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        files_to_search: &[NormalizedPath],
    ) -> EngineResult<Vec<DocumentHighlights>>;

    fn signature_help_items(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
    ) -> EngineResult<Option<SignatureHelpItems>>;

    fn navigation_tree(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Option<NavigationTree>>;

    fn navigate_to_items(
        &mut self,
        project: ProjectId,
        search_value: &str,
    ) -> EngineResult<Vec<NavigateToItem>>;

    fn formatting_edits_for_document(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>>;

    fn formatting_edits_for_range(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        start: usize,
        end: usize,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>>;

    fn formatting_edits_after_keystroke(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position: usize,
        key: &str,
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<TextChange>>;

    fn code_fixes_at_position(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        start: usize,
        end: usize,
        error_codes: &[u32],
        options: &FormatCodeSettings,
    ) -> EngineResult<Vec<CodeFixAction>>;

    fn applicable_refactors(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        position_or_range: PositionOrRange,
    ) -> EngineResult<Vec<ApplicableRefactorInfo>>;

    fn edits_for_refactor(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
        options: &FormatCodeSettings,
        position_or_range: PositionOrRange,
        refactor_name: &str,
        action_name: &str,
    ) -> EngineResult<Option<RefactorEditInfo>>;

    fn syntactic_diagnostics(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>>;

    fn semantic_diagnostics(
        &mut self,
        project: ProjectId,
        file: &NormalizedPath,
    ) -> EngineResult<Vec<Diagnostic>>;
}

/// A complete engine binding.
pub trait Engine: ProjectService + LanguageService + Send {}

impl<T: ProjectService + LanguageService + Send> Engine for T {}
