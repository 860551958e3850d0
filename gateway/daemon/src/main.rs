//! Gateway Daemon - HTTP API and Terminal Chat for a Managed Agent
//!
//! Entry point for agent-gateway. Forwards questions to a Bedrock agent,
//! decodes its event-stream replies and serves the answers over HTTP or in
//! the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API and widget on 0.0.0.0:8000
//! AGENT_ID=... AGENT_ALIAS_ID=... gateway-daemon serve
//!
//! # Custom bind address and request log
//! gateway-daemon serve --bind 127.0.0.1:9000 --request-log ./requests.jsonl
//!
//! # Ask once / chat in the terminal
//! gateway-daemon ask "How do I reset my device?"
//! gateway-daemon chat --trace
//!
//! # Try the widget without AWS access
//! gateway-daemon --mock-answer "Hello from the gateway" serve
//!
//! # Verbose logging
//! RUST_LOG=debug gateway-daemon serve
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown of `serve`

mod console;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};

use gateway_core::{
    default_config_path, load_config_from_path, AgentClient, BedrockAgentClient, ConfigOverrides,
    GatewayConfig, MockAgentClient, MockReply,
};

use console::ConsoleOptions;

/// Gateway Daemon - HTTP API and terminal chat for a managed agent
#[derive(Parser, Debug)]
#[command(name = "gateway-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "GATEWAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Agent identifier
    #[arg(long, value_name = "ID")]
    agent_id: Option<String>,

    /// Agent alias identifier
    #[arg(long, value_name = "ID")]
    agent_alias_id: Option<String>,

    /// AWS region of the agent runtime
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Agent runtime endpoint override
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Answer every question with this text instead of calling the agent
    #[arg(long, value_name = "TEXT")]
    mock_answer: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "GATEWAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API and web widget
    Serve {
        /// Socket address to listen on
        #[arg(short = 'b', long, value_name = "ADDR")]
        bind: Option<String>,

        /// Append request/response log entries to this file
        #[arg(long, value_name = "PATH")]
        request_log: Option<PathBuf>,

        /// Disable per-client rate limiting
        #[arg(long)]
        no_rate_limit: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question
        question: String,

        /// Print the decode trace
        #[arg(long)]
        trace: bool,
    },

    /// Chat interactively in the terminal
    Chat {
        /// Print the decode trace after each answer
        #[arg(long)]
        trace: bool,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        overrides.agent_id.clone_from(&self.agent_id);
        overrides.agent_alias_id.clone_from(&self.agent_alias_id);
        overrides.region.clone_from(&self.region);
        overrides.endpoint.clone_from(&self.endpoint);

        if let Command::Serve {
            ref bind,
            ref request_log,
            no_rate_limit,
        } = self.command
        {
            overrides.bind.clone_from(bind);
            overrides.request_log.clone_from(request_log);
            if no_rate_limit {
                overrides.rate_limit_enabled = Some(false);
            }
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so terminal answers on stdout stay clean.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "gateway_daemon={level},gateway_core={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration from file, environment and CLI
fn resolve_config(args: &Args) -> Result<GatewayConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);

    info!(source = %config.source(), "Configuration resolved");
    if let Some(ref path) = config.config_file_path {
        info!(path = %path.display(), "Config file");
    }
    Ok(config)
}

/// Build the agent client, or a scripted one for offline use
fn build_client(args: &Args, config: &GatewayConfig) -> Result<Arc<dyn AgentClient>> {
    if let Some(ref answer) = args.mock_answer {
        info!("Using scripted answers instead of the agent runtime");
        return Ok(Arc::new(MockAgentClient::always(MockReply::answer(answer, ""))));
    }

    config.validate().context("Invalid configuration")?;
    let client = BedrockAgentClient::from_config(&config.agent)
        .context("Failed to create agent client")?;
    info!(
        agent_id = %config.agent.agent_id,
        region = %config.agent.region,
        endpoint = %config.agent.endpoint_url(),
        "Agent client ready"
    );
    Ok(Arc::new(client))
}

/// Terminal options, with example questions loaded when configured
fn console_options(config: &GatewayConfig, show_trace: bool) -> Result<ConsoleOptions> {
    let example_prompts = match config.example_prompts {
        Some(ref path) => {
            let prompts = console::load_example_prompts(path)?;
            info!(path = %path.display(), count = prompts.len(), "Example questions loaded");
            prompts
        }
        None => Vec::new(),
    };
    Ok(ConsoleOptions {
        support_contact: config.support_contact.clone(),
        show_trace,
        example_prompts,
    })
}

async fn run(args: Args) -> Result<()> {
    let config = resolve_config(&args)?;
    let client = build_client(&args, &config)?;

    match args.command {
        Command::Serve { .. } => server::serve(config, client).await,
        Command::Ask { ref question, trace } => {
            let service = console::console_service(&config, client);
            let options = console_options(&config, trace)?;
            console::ask_once(&service, question, &options, &mut std::io::stdout()).await
        }
        Command::Chat { trace } => {
            let service = console::console_service(&config, client);
            let options = console_options(&config, trace)?;
            let stdin = BufReader::new(tokio::io::stdin());
            console::chat_loop(&service, &options, stdin, &mut std::io::stdout())
                .await
                .map(|_| ())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Gateway daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => {
            info!("Gateway daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Gateway daemon stopped with error");
            Err(e)
        }
    }
}
