//! Run the agent REPL: launch tool providers, build the catalog, and chat
//! with a local model that can call them.
//!
//! # Examples
//!
//! ```sh
//! # Use ./tether.json and the model it names
//! tether
//!
//! # Point at a different config and model
//! tether --config ~/agents/research.json --model llama3.1
//!
//! # Tighten the tool timeout and round bound
//! tether --tool-timeout-ms 5000 --max-tool-rounds 4
//!
//! # Verbose internals
//! RUST_LOG=tether=debug tether
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tether::prelude::*;
use tether::ui::Console;
use tracing_subscriber::EnvFilter;

/// Chat with a local model that can call external tool providers.
///
/// Providers and model settings come from a JSON configuration file, read
/// once at startup. Type 'exit' (or press Ctrl-D) to quit.
#[derive(Parser)]
#[command(name = "tether", version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "tether.json")]
    config: PathBuf,

    /// Override the configured model name
    #[arg(long)]
    model: Option<String>,

    /// Override the configured model host URL
    #[arg(long)]
    host: Option<String>,

    /// Override the per-call tool timeout (milliseconds)
    #[arg(long)]
    tool_timeout_ms: Option<u64>,

    /// Override the per-turn tool round bound
    #[arg(long)]
    max_tool_rounds: Option<u32>,

    /// Override the system prompt
    #[arg(long)]
    system: Option<String>,
}

/// Renders session events on the console: answers to stdout, everything
/// else as status lines on stderr.
struct ConsoleHandler;

impl EventHandler for ConsoleHandler {
    fn on_event(&self, event: &SessionEvent<'_>) {
        match event {
            SessionEvent::Answer(text) => println!("\n{text}\n"),
            SessionEvent::ToolExecuting { name, arguments } => {
                eprintln!("  [tool] {name}({arguments})");
            }
            SessionEvent::ToolResult { name, result } => {
                eprintln!("  [tool] {name} -> {} bytes", result.len());
            }
            SessionEvent::ToolSkipped { name, error } => {
                eprintln!("  [tool] {name} skipped: {error}");
            }
            SessionEvent::Recovery { name } => {
                eprintln!("  [recovery] '{name}' failed; asking the model to correct the call");
            }
            SessionEvent::NoProgress { name } => {
                eprintln!("  [recovery] '{name}' repeated the same failing call; giving up");
            }
            SessionEvent::RoundLimitReached { max_rounds } => {
                eprintln!("  [agent] tool round limit ({max_rounds}) reached");
            }
            SessionEvent::TurnAborted { reason } => {
                eprintln!("  [agent] {reason}");
            }
        }
    }
}

/// Launch every configured provider, in declaration order. A provider that
/// fails to launch is reported and skipped; the rest still connect.
async fn connect_providers(specs: &[ProviderSpec]) -> Vec<ProviderHandle> {
    let mut providers = Vec::new();
    for spec in specs {
        match StdioProvider::launch(spec).await {
            Ok(client) => {
                eprintln!("  connected provider '{}'", spec.name);
                providers.push(ProviderHandle::new(&spec.name, client));
            }
            Err(e) => eprintln!("  Warning: {e}"),
        }
    }
    providers
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(model) = cli.model {
        config.model.name = model;
    }
    if let Some(host) = cli.host {
        config.model.host = host;
    }
    if let Some(ms) = cli.tool_timeout_ms {
        config.tool_timeout_ms = ms;
    }
    if let Some(rounds) = cli.max_tool_rounds {
        config.max_tool_rounds = rounds;
    }
    if let Some(system) = cli.system {
        config.system_prompt = Some(system);
    }

    let providers = connect_providers(&config.providers).await;
    let connected: Vec<String> = providers.iter().map(|p| p.name.clone()).collect();

    // Fatal when nothing connected; an empty catalog from live providers
    // is fine.
    let catalog = ToolCatalog::build(&providers)
        .await
        .map_err(|e| e.to_string())?;

    let session_config = SessionConfig::default()
        .with_tool_timeout(Duration::from_millis(config.tool_timeout_ms))
        .with_max_tool_rounds(config.max_tool_rounds)
        .with_max_result_bytes(config.max_result_bytes);

    let executor = ToolExecutor::new(providers, catalog)
        .with_default_timeout(session_config.tool_timeout)
        .with_max_result_bytes(session_config.max_result_bytes);

    let client = LocalModelClient::new(&config.model.host, &config.model.name).with_options(
        ModelOptions {
            temperature: config.model.temperature,
            top_p: config.model.top_p,
            num_predict: config.model.max_tokens,
        },
    );

    let console = Console::new();
    console.banner(&config.model.name, &connected, executor.catalog().len());

    let handler = ConsoleHandler;
    let mut session =
        Session::new(&client, executor, session_config).with_event_handler(&handler);
    if let Some(prompt) = config.system_prompt.clone() {
        session = session.with_system_prompt(prompt);
    }

    session.run(|| console.prompt()).await.map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
