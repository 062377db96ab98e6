//! tsbridge - language server entry point
//!
//! Speaks LSP over stdio. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tsbridge_lsp_core::{MemoryEngine, NullCancellationToken, ServerOptions};

#[derive(Parser, Debug)]
#[command(name = "tsbridge")]
#[command(version)]
#[command(about = "TypeScript language server over stdio", long_about = None)]
struct Cli {
    /// Locale for engine messages (e.g. `en`, `pt-br`)
    #[arg(long, value_parser = parse_locale)]
    locale: Option<String>,

    /// Plugins loaded into every project (comma-separated)
    #[arg(long, value_delimiter = ',')]
    global_plugins: Vec<String>,

    /// Extra directories searched for plugins (comma-separated)
    #[arg(long, value_delimiter = ',')]
    plugin_probe_locations: Vec<String>,

    /// Let projects load plugins from their own directories
    #[arg(long)]
    allow_local_plugin_loads: bool,

    /// Put every loose file into a single inferred project
    #[arg(long)]
    use_single_inferred_project: bool,

    /// Group loose files into one inferred project per workspace root
    #[arg(long)]
    use_inferred_project_per_project_root: bool,

    /// Also send log lines to the client's console
    #[arg(long)]
    trace_to_console: bool,

    /// How much to log. `RUST_LOG` takes precedence when set.
    #[arg(long, value_enum, default_value = "terse")]
    log_verbosity: LogVerbosity,

    /// Delay before unused projects are collected, in milliseconds
    #[arg(long, default_value_t = 7000)]
    gc_delay_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogVerbosity {
    Terse,
    Normal,
    RequestTime,
    Verbose,
}

impl LogVerbosity {
    fn filter(self) -> &'static str {
        match self {
            Self::Terse => "warn",
            Self::Normal => "info",
            Self::RequestTime => "debug",
            Self::Verbose => "trace",
        }
    }
}

/// Accept `xx` or `xx-yy`, case-insensitively.
fn parse_locale(value: &str) -> std::result::Result<String, String> {
    let valid_part = |part: &str| part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic());
    let mut parts = value.split('-');
    let language = parts.next().unwrap_or_default();
    let region = parts.next();
    let valid = valid_part(language) && region.is_none_or(valid_part) && parts.next().is_none();
    if valid {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(format!("invalid locale '{value}', expected a form like 'en' or 'pt-br'"))
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

impl Cli {
    fn server_options(self) -> ServerOptions {
        ServerOptions {
            locale: self.locale,
            global_plugins: non_empty(self.global_plugins),
            plugin_probe_locations: non_empty(self.plugin_probe_locations),
            allow_local_plugin_loads: self.allow_local_plugin_loads,
            use_single_inferred_project: self.use_single_inferred_project,
            use_inferred_project_per_project_root: self.use_inferred_project_per_project_root,
            gc_delay: Duration::from_millis(self.gc_delay_ms),
            cancellation_token: Arc::new(NullCancellationToken),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (client_log, client_log_receiver) = cli
        .trace_to_console
        .then(tsbridge_lsp::client_log_layer)
        .unzip();

    // stdout carries the protocol; logs must stay on stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_verbosity.filter())),
        )
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(client_log)
        .init();

    let options = cli.server_options();
    tracing::debug!(?options, "starting");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        tsbridge_lsp::run_server(
            MemoryEngine::new(options.clone()),
            options,
            client_log_receiver,
        )
        .await;
    });

    Ok(())
}
