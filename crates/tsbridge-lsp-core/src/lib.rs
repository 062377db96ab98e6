//! Transport-agnostic core of the tsbridge language server.
//!
//! This crate holds everything that does not speak the protocol: the
//! boundary to the analysis engine, the engine's native data model, document
//! text with its UTF-16 line index, and the multi-step operation scheduler
//! that drives background diagnostics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       tsbridge-lsp-core                         │
//! │                                                                 │
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌─────────────┐   │
//! │  │ engine   │  │  model    │  │   text     │  │ multistep   │   │
//! │  │ traits,  │  │ engine    │  │ snapshots, │  │ suspendable │   │
//! │  │ events   │  │ results   │  │ line index │  │ operations  │   │
//! │  └────┬─────┘  └───────────┘  └────────────┘  └─────────────┘   │
//! │       │                                                         │
//! │  ┌────▼──────────────┐                                          │
//! │  │ memory            │  document-tracking engine, no analysis   │
//! │  └───────────────────┘                                          │
//! └─────────────────────────────────────────────────────────────────┘
//!             │
//!             ▼
//! ┌───────────────────────┐
//! │     tsbridge-lsp      │
//! │  (protocol adapter)   │
//! └───────────────────────┘
//! ```

pub mod engine;
pub mod memory;
pub mod model;
pub mod multistep;
pub mod options;
pub mod path;
pub mod request;
pub mod text;

pub use engine::{
    Engine, EngineError, EngineResult, LanguageService, ProjectEvent, ProjectEventHandler,
    ProjectService,
};
pub use memory::MemoryEngine;
pub use multistep::{MultistepOperation, NextStep, OperationHost};
pub use options::ServerOptions;
pub use path::NormalizedPath;
pub use request::{CancellationToken, NullCancellationToken, RequestId, SharedCancellationToken};
pub use text::{LineAndCharacter, ScriptSnapshot, TextChange, TextError, TextSpan};
