//! LSP capability negotiation.

use tower_lsp::lsp_types::{
    CodeActionProviderCapability, CompletionOptions, DocumentOnTypeFormattingOptions,
    ExecuteCommandOptions, HoverProviderCapability, OneOf, ServerCapabilities,
    SignatureHelpOptions, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions,
};

/// Get the server capabilities to report to the client.
pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        // Full text on every change; edits are turned into spans on our side.
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                will_save: None,
                will_save_wait_until: None,
                save: None,
            },
        )),

        code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
        // Commands come back to us from code actions; none are registered up front.
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: Vec::new(),
            ..Default::default()
        }),
        completion_provider: Some(CompletionOptions {
            resolve_provider: Some(false),
            ..Default::default()
        }),

        document_formatting_provider: Some(OneOf::Left(true)),
        document_range_formatting_provider: Some(OneOf::Left(true)),
        document_on_type_formatting_provider: Some(DocumentOnTypeFormattingOptions {
            first_trigger_character: "}".to_string(),
            more_trigger_character: Some(vec![";".to_string(), "\n".to_string()]),
        }),

        document_symbol_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        document_highlight_provider: Some(OneOf::Left(true)),
        definition_provider: Some(OneOf::Left(true)),
        references_provider: Some(OneOf::Left(true)),
        rename_provider: Some(OneOf::Left(true)),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        signature_help_provider: Some(SignatureHelpOptions {
            trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
            retrigger_characters: None,
            work_done_progress_options: Default::default(),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_use_full_document_sync() {
        let caps = server_capabilities();
        let Some(TextDocumentSyncCapability::Options(sync)) = caps.text_document_sync else {
            panic!("expected sync options");
        };
        assert_eq!(sync.open_close, Some(true));
        assert_eq!(sync.change, Some(TextDocumentSyncKind::FULL));
    }

    #[test]
    fn capabilities_advertise_trigger_characters() {
        let caps = server_capabilities();
        let on_type = caps.document_on_type_formatting_provider.unwrap();
        assert_eq!(on_type.first_trigger_character, "}");
        assert_eq!(
            on_type.more_trigger_character,
            Some(vec![";".to_string(), "\n".to_string()])
        );
        assert_eq!(
            caps.signature_help_provider.unwrap().trigger_characters,
            Some(vec!["(".to_string(), ",".to_string()])
        );
    }

    #[test]
    fn capabilities_do_not_resolve_completions() {
        let caps = server_capabilities();
        assert_eq!(caps.completion_provider.unwrap().resolve_provider, Some(false));
        assert!(caps.execute_command_provider.unwrap().commands.is_empty());
    }
}
