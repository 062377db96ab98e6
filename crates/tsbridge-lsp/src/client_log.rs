//! Forwarding of log events to the client's console.
//!
//! With `--trace-to-console` the binary registers a [`ClientLogLayer`] next
//! to its stderr layer. The layer turns each event into a line and queues
//! it; once the server has a [`Client`], a task drains the queue into
//! `window/logMessage` notifications.
//!
//! ```text
//! tracing event ──► ClientLogLayer ──► channel ──► forward() ──► window/logMessage
//! ```

use std::fmt::{self, Write as _};

use tokio::sync::mpsc;
use tower_lsp::Client;
use tower_lsp::lsp_types::MessageType;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Events from the transport itself are not forwarded, since sending a log
/// message produces more of them.
const TRANSPORT_TARGET: &str = "tower_lsp";

/// One line bound for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub typ: MessageType,
    pub message: String,
}

/// Receiving end of a [`ClientLogLayer`], handed to
/// [`run_server`](crate::run_server).
#[derive(Debug)]
pub struct ClientLogReceiver(mpsc::UnboundedReceiver<LogLine>);

/// A `tracing_subscriber` layer that queues every event for the client.
#[derive(Debug, Clone)]
pub struct ClientLogLayer {
    sender: mpsc::UnboundedSender<LogLine>,
}

/// Create a layer and the receiver the server drains it from.
pub fn client_log_layer() -> (ClientLogLayer, ClientLogReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ClientLogLayer { sender }, ClientLogReceiver(receiver))
}

/// Console message type for a tracing level.
pub fn message_type(level: &Level) -> MessageType {
    if *level == Level::ERROR {
        MessageType::ERROR
    } else if *level == Level::WARN {
        MessageType::WARNING
    } else if *level == Level::INFO {
        MessageType::INFO
    } else {
        MessageType::LOG
    }
}

impl<S: Subscriber> Layer<S> for ClientLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(TRANSPORT_TARGET) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = LogLine {
            typ: message_type(metadata.level()),
            message: visitor.finish(),
        };
        // Nobody is listening once the server has shut down.
        let _ = self.sender.send(line);
    }
}

/// Collects the `message` field followed by `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}

/// Send queued lines to the client until every layer is gone.
pub(crate) async fn forward(client: Client, ClientLogReceiver(mut receiver): ClientLogReceiver) {
    while let Some(line) = receiver.recv().await {
        client.log_message(line.typ, line.message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn collect(emit: impl FnOnce()) -> Vec<LogLine> {
        let (layer, ClientLogReceiver(mut receiver)) = client_log_layer();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);

        let mut lines = Vec::new();
        while let Ok(line) = receiver.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_levels_map_to_message_types() {
        assert_eq!(message_type(&Level::ERROR), MessageType::ERROR);
        assert_eq!(message_type(&Level::WARN), MessageType::WARNING);
        assert_eq!(message_type(&Level::INFO), MessageType::INFO);
        assert_eq!(message_type(&Level::DEBUG), MessageType::LOG);
        assert_eq!(message_type(&Level::TRACE), MessageType::LOG);
    }

    #[test]
    fn test_events_become_lines() {
        let lines = collect(|| {
            tracing::error!(file = "/src/a.ts", "could not resolve document");
            tracing::info!(files = 2, "projects updated in background");
            tracing::debug!("diagnostics request completed");
        });
        assert_eq!(
            lines,
            vec![
                LogLine {
                    typ: MessageType::ERROR,
                    message: "could not resolve document file=/src/a.ts".to_string(),
                },
                LogLine {
                    typ: MessageType::INFO,
                    message: "projects updated in background files=2".to_string(),
                },
                LogLine {
                    typ: MessageType::LOG,
                    message: "diagnostics request completed".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_transport_events_are_not_forwarded() {
        let lines = collect(|| {
            tracing::info!(target: "tower_lsp::transport", "<- notification");
            tracing::warn!("kept");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "kept");
    }
}
