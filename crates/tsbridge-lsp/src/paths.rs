//! Document URIs and engine file names.
//!
//! Only `file://` URIs name documents the engine can analyse.

use tower_lsp::lsp_types::Url;

use tsbridge_lsp_core::NormalizedPath;

use crate::error::{SessionError, SessionResult};

pub fn uri_to_path(uri: &Url) -> SessionResult<NormalizedPath> {
    if uri.scheme() != "file" {
        return Err(SessionError::UnsupportedUri(uri.to_string()));
    }
    uri.to_file_path()
        .map(|path| NormalizedPath::from_path(&path))
        .map_err(|()| SessionError::UnsupportedUri(uri.to_string()))
}

pub fn path_to_uri(path: &NormalizedPath) -> SessionResult<Url> {
    Url::from_file_path(path.to_path_buf()).map_err(|()| SessionError::NotAbsolute(path.clone()))
}
