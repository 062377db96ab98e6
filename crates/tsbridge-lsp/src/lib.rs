//! tsbridge Language Server Protocol implementation.
//!
//! This crate adapts an analysis engine (see `tsbridge-lsp-core`) to the
//! Language Server Protocol with the tower-lsp framework.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         tsbridge-lsp                           │
//! │                                                                │
//! │  ┌─────────────┐   lock    ┌──────────────┐   ┌─────────────┐  │
//! │  │  server.rs  │ ────────► │  session.rs  │──►│ convert.rs  │  │
//! │  │ tower-lsp   │ ◄──────── │ request      │   │ engine ↔ LSP│  │
//! │  │ + driver    │  outbox   │ router       │   └─────────────┘  │
//! │  └──────┬──────┘           └──────┬───────┘                    │
//! │         │ timers / events         │ diagnostics.rs             │
//! │         └────────────────────────►│ commands.rs, symbols.rs    │
//! │                                   ▼                            │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │                    tsbridge-lsp-core                      │  │
//! │  │      Engine traits, snapshots, multistep operations       │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! The server is started by the `tsbridge` binary, or programmatically:
//!
//! ```rust,ignore
//! let options = ServerOptions::default();
//! tsbridge_lsp::run_server(MemoryEngine::new(options.clone()), options, None).await;
//! ```

pub mod capabilities;
pub mod client_log;
pub mod commands;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod paths;
pub mod server;
pub mod session;
pub mod symbols;

pub use client_log::{ClientLogLayer, ClientLogReceiver, client_log_layer};
pub use error::{SessionError, SessionResult};
pub use server::run_server;
pub use session::{Outgoing, Session};
