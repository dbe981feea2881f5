//! CruzeiroChat main binary.

mod chatbot;
mod config;
mod routes;
mod server;
mod session;
#[cfg(test)]
mod test_support;

use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "cruzeiro-chat", version, about = "CruzeiroChat web chat for Gemini")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// TOML config file (default: ./cruzeiro.toml when present).
    #[arg(long, global = true, env = "CRUZEIRO_CONFIG")]
    config: Option<PathBuf>,
    /// Port to listen on; overrides config and CRUZEIRO_PORT.
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the chat server (default).
    Serve,
    /// Validate configuration and exit.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let (mut cfg, config_path) = AppConfig::load(cli.global.config.clone()).await?;
    if let Some(port) = cli.global.port {
        cfg.server.port = port;
    }
    cfg.server.debug |= cli.global.debug;
    cfg.validate()?;

    init_tracing(cfg.server.debug)?;
    install_panic_hook();
    match &dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), ".env loaded"),
        Err(e) if e.not_found() => tracing::debug!("no .env file found"),
        Err(e) => tracing::warn!(%e, ".env could not be loaded"),
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(e) = server::run(cfg).await {
                tracing::error!(error = %e, "ERRO CRÍTICO: server stopped");
                eprintln!("ERRO CRÍTICO: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Doctor => server::doctor(&cfg, config_path),
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "debug"
    } else {
        "info,cruzeiro_chat=debug,ct_llm=debug,tower_http=info"
    };
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(default_filter),
    };
    let log_format = std::env::var("CRUZEIRO_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported CRUZEIRO_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        debug = verbose,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

/// Routes panics (including ones inside request handlers) through `tracing`
/// before the default hook prints them.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let at = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        tracing::error!(
            location = at.as_deref().unwrap_or("?"),
            payload = panic_message(info.payload()),
            "panic"
        );
        previous(info);
    }));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
