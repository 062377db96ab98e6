//! Session errors and their JSON-RPC form.

use std::borrow::Cow;

use thiserror::Error;
use tower_lsp::jsonrpc::{Error as RpcError, ErrorCode};

use tsbridge_lsp_core::{EngineError, NormalizedPath, TextError};

/// JSON-RPC code for a request the server gave up on because it was cancelled.
const REQUEST_CANCELLED: i64 = -32800;

/// Errors raised while serving a request.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot resolve non-file uri to path: {0}")]
    UnsupportedUri(String),

    #[error("Cannot create a file uri from relative path: {0}")]
    NotAbsolute(NormalizedPath),

    #[error("No script info for file {0}")]
    UnknownFile(NormalizedPath),

    #[error("No project for file {0}")]
    NoProject(NormalizedPath),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("This symbol cannot be renamed")]
    CannotRename,

    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Command {0} requires arguments")]
    MissingArguments(String),

    #[error("No changes supplied for code fix command")]
    NoChanges,

    #[error("Only 1 refactor can be supplied with a command")]
    TooManyRefactors,

    #[error("Invalid arguments for command {command}: {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid edit for file {file}: {source}")]
    InvalidEdit {
        file: NormalizedPath,
        #[source]
        source: TextError,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Engine(EngineError::Cancelled) => ErrorCode::ServerError(REQUEST_CANCELLED),
            Self::UnknownCommand(_)
            | Self::MissingArguments(_)
            | Self::NoChanges
            | Self::TooManyRefactors
            | Self::InvalidArguments { .. }
            | Self::InvalidEdit { .. }
            | Self::UnsupportedUri(_) => ErrorCode::InvalidParams,
            _ => ErrorCode::InternalError,
        }
    }
}

impl From<SessionError> for RpcError {
    fn from(error: SessionError) -> Self {
        RpcError {
            code: error.code(),
            message: Cow::Owned(error.to_string()),
            data: None,
        }
    }
}
