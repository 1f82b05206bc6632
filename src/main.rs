use anyhow::Context;
use clap::{Parser, Subcommand};
use relaybot::config::{AgentConfig, ConfigLoader};
use relaybot::dispatch::DispatchRequest;
use relaybot::messenger::ConsoleMessenger;
use relaybot::{audit_sink_from_config, health, RelayAgent};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relaybot", about = "Chat relay agent with credential failover")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file layered over the built-in defaults.
    #[arg(long, global = true, env = "RELAYBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "relaybot=info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question and exit.
    Ask {
        /// The question.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Requester name reported to the audit channel.
        #[arg(long, default_value = "console")]
        user: String,
    },
    /// Serve the liveness endpoint and answer one question per stdin line.
    Serve,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AgentConfig> {
    let loader = match path {
        Some(path) => ConfigLoader::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ConfigLoader::new().context("failed to load config")?,
    };
    Ok(loader.into_config()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(cli.config.as_ref())?;
    let audit = audit_sink_from_config(&config)?;
    let agent = RelayAgent::from_config(&config, audit.clone()).context("failed to build agent")?;
    agent.start().await;

    let result = match cli.command {
        Commands::Ask { prompt, user } => {
            let request = DispatchRequest::new(prompt.join(" "), user.clone(), user);
            agent
                .handle_question(&request, &ConsoleMessenger::stdout())
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
        }
        Commands::Serve => serve(&config, &agent).await,
    };

    audit.flush().await;
    result
}

async fn serve(config: &AgentConfig, agent: &RelayAgent) -> anyhow::Result<()> {
    let bind = config.health_bind.clone();
    let pool = agent.pool().clone();
    let health = tokio::spawn(async move {
        if let Err(e) = health::bind_and_serve(&bind, pool).await {
            error!(error = %e, "health endpoint failed");
        }
    });

    let messenger = ConsoleMessenger::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut asked = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("stdin closed");
                    break;
                };
                let prompt = line.trim();
                if prompt.is_empty() {
                    continue;
                }

                asked += 1;
                let request = DispatchRequest::new(prompt, "stdin", "console")
                    .with_reply_locator(format!("stdin#{}", asked));
                if let Err(e) = agent.handle_question(&request, &messenger).await {
                    warn!(error = %e, "failed to post reply");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            },
        }
    }

    health.abort();
    Ok(())
}
