//! LSP server implementation using tower-lsp.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use tsbridge_lsp_core::{Engine, ProjectEvent, ServerOptions};

use crate::client_log::{self, ClientLogReceiver};
use crate::error::SessionResult;
use crate::session::{Outgoing, Session};

/// The tsbridge language server.
pub struct TsBridgeLanguageServer {
    /// The LSP client for sending notifications.
    client: Client,
    session: Arc<Mutex<Session>>,
    /// Wakes the diagnostics driver after a request changed its schedule.
    wake: Arc<Notify>,
}

impl TsBridgeLanguageServer {
    pub fn new(client: Client, session: Arc<Mutex<Session>>, wake: Arc<Notify>) -> Self {
        Self {
            client,
            session,
            wake,
        }
    }

    /// Run `f` against the session, then send whatever it queued.
    async fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session, Instant) -> SessionResult<T>,
    ) -> Result<T> {
        let (result, outgoing) = {
            let mut session = self.session.lock().await;
            let result = f(&mut session, Instant::now());
            (result, session.take_outgoing())
        };
        self.wake.notify_one();
        dispatch(&self.client, outgoing).await;
        result.map_err(Into::into)
    }

    /// Like [`with_session`](Self::with_session) for notifications, which
    /// have nobody to report an error to.
    async fn notify_session(&self, f: impl FnOnce(&mut Session, Instant) -> SessionResult<()>) {
        // Failures are logged where they happen.
        let _ = self.with_session(f).await;
    }
}

/// Send queued messages to the client.
async fn dispatch(client: &Client, outgoing: Vec<Outgoing>) {
    for message in outgoing {
        match message {
            Outgoing::PublishDiagnostics { uri, diagnostics } => {
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
            Outgoing::ApplyEdit(edit) => match client.apply_edit(edit).await {
                Ok(response) if !response.applied => {
                    tracing::warn!(
                        reason = response.failure_reason.as_deref().unwrap_or("unknown"),
                        "client did not apply edit"
                    );
                }
                Ok(_) => {}
                Err(error) => tracing::error!(%error, "workspace/applyEdit failed"),
            },
        }
    }
}

/// Run due diagnostics steps and engine events until the client goes away.
async fn drive_background(
    client: Client,
    session: Arc<Mutex<Session>>,
    wake: Arc<Notify>,
    mut events: mpsc::UnboundedReceiver<ProjectEvent>,
) {
    let mut events_open = true;
    loop {
        let deadline = session.lock().await.next_wakeup();
        tokio::select! {
            () = sleep_until(deadline) => {
                let outgoing = {
                    let mut session = session.lock().await;
                    let now = Instant::now();
                    while session.run_pending(now) {}
                    session.take_outgoing()
                };
                dispatch(&client, outgoing).await;
            }
            () = wake.notified() => {}
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    let outgoing = {
                        let mut session = session.lock().await;
                        session.handle_project_event(event, Instant::now());
                        session.take_outgoing()
                    };
                    dispatch(&client, outgoing).await;
                }
                None => events_open = false,
            },
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for TsBridgeLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        Ok(self.session.lock().await.initialize(&params))
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "tsbridge server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.notify_session(|session, now| session.did_open(params, now))
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.notify_session(|session, now| session.did_change(params, now))
            .await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.notify_session(|session, now| session.did_close(params, now))
            .await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.notify_session(|session, _| {
            session.did_change_configuration(params);
            Ok(())
        })
        .await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.with_session(|session, _| session.hover(&params.text_document_position_params))
            .await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let items = self
            .with_session(|session, _| session.completion(&params.text_document_position))
            .await?;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let locations = self
            .with_session(|session, _| session.definition(&params.text_document_position_params))
            .await?;
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let locations = self
            .with_session(|session, _| session.references(&params))
            .await?;
        Ok(Some(locations))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let highlights = self
            .with_session(|session, _| {
                session.document_highlight(&params.text_document_position_params)
            })
            .await?;
        Ok(Some(highlights))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let help = self
            .with_session(|session, _| {
                session.signature_help(&params.text_document_position_params)
            })
            .await?;
        Ok(Some(help))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let edit = self
            .with_session(|session, _| session.rename(&params))
            .await?;
        Ok(Some(edit))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let edits = self
            .with_session(|session, _| session.formatting(&params))
            .await?;
        Ok(Some(edits))
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let edits = self
            .with_session(|session, _| session.range_formatting(&params))
            .await?;
        Ok(Some(edits))
    }

    async fn on_type_formatting(
        &self,
        params: DocumentOnTypeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let edits = self
            .with_session(|session, _| session.on_type_formatting(&params))
            .await?;
        Ok(Some(edits))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let symbols = self
            .with_session(|session, _| session.document_symbol(&params))
            .await?;
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }

    async fn symbol(&self, params: WorkspaceSymbolParams) -> Result<Option<Vec<SymbolInformation>>> {
        let symbols = self
            .with_session(|session, _| session.workspace_symbol(&params))
            .await?;
        Ok(Some(symbols))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let actions = self
            .with_session(|session, _| session.code_action(&params))
            .await?;
        Ok(Some(actions))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        self.with_session(|session, _| session.execute_command(params))
            .await
    }
}

/// Run the LSP server over stdio with `engine` answering queries.
///
/// With `client_log`, lines queued by a [`ClientLogLayer`](crate::ClientLogLayer)
/// are sent to the client as `window/logMessage`.
pub async fn run_server<E>(
    mut engine: E,
    options: ServerOptions,
    client_log: Option<ClientLogReceiver>,
) where
    E: Engine + 'static,
{
    let (events_tx, events) = mpsc::unbounded_channel();
    engine.set_event_handler(Box::new(move |event| {
        // The receiver only goes away when the server is shutting down.
        let _ = events_tx.send(event);
    }));

    let session = Arc::new(Mutex::new(Session::new(
        Box::new(engine),
        options.cancellation_token.clone(),
    )));
    let wake = Arc::new(Notify::new());

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| {
        if let Some(receiver) = client_log {
            tokio::spawn(client_log::forward(client.clone(), receiver));
        }
        tokio::spawn(drive_background(
            client.clone(),
            session.clone(),
            wake.clone(),
            events,
        ));
        TsBridgeLanguageServer::new(client, session, wake)
    });
    tracing::info!(?options, "serving on stdio");
    Server::new(stdin, stdout, socket).serve(service).await;
}
