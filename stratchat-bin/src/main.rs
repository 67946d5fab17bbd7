use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stratchat_core::{
    backend::{ChatBackend, HttpBackend, NullBackend},
    chat::stream_turn,
    config::Config,
    http_client::HttpClient,
    model::BacktestParams,
    session::{NoticeSink, RenderTarget, SessionGuard},
    strategy,
};

#[derive(Parser)]
#[command(author, version, about = "stratchat CLI smoke tool", long_about = None)]
struct Cli {
    /// Path to a JSON or TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and STRATCHAT_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Use the canned in-process backend instead of HTTP
    #[arg(long, global = true)]
    null_backend: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one chat message and stream the reply
    Chat {
        #[arg(short, long, help = "Message from the user")]
        message: String,
    },
    /// Clear the backend's conversation memory
    ClearMemory,
    /// Post the selected backtest parameters
    SetParams {
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        timeframe: String,
    },
    /// Generate a strategy from a chat transcript and save it
    Generate {
        #[arg(long, help = "Name to save under (suffixed if taken)")]
        name: String,
        #[arg(long, help = "Chat transcript; reads stdin when omitted")]
        history: Option<String>,
    },
    /// List saved strategies
    Strategies {
        /// Also print each strategy's decoded JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved strategy by name
    Delete {
        #[arg(long)]
        name: String,
    },
}

/// Terminal message surface. Incremental updates arrive as extensions of the
/// previously shown text, so only the new suffix is printed; the final
/// (Markdown) render replaces the whole thing and gets its own block.
#[derive(Default)]
struct StdoutSurface {
    shown: String,
}

impl RenderTarget for StdoutSurface {
    fn set_content(&mut self, html: &str) {
        if let Some(suffix) = html.strip_prefix(self.shown.as_str()) {
            print!("{suffix}");
        } else {
            println!();
            println!("--- final ---");
            println!("{html}");
        }
        io::stdout().flush().ok();
        self.shown = html.to_string();
    }
}

/// System notices go to stderr, clearly labeled, never into the reply text.
struct StderrNotices;

impl NoticeSink for StderrNotices {
    fn system_notice(&mut self, text: &str) {
        eprintln!("[system] {text}");
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Ok(base) = std::env::var("STRATCHAT_BASE_URL") {
        cfg.server.base_url = base;
    }
    if let Some(base) = &cli.base_url {
        cfg.server.base_url = base.clone();
    }
    Ok(cfg)
}

fn read_history(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(h) => Ok(h),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let backend: Box<dyn ChatBackend> = if cli.null_backend {
        Box::new(NullBackend)
    } else {
        let http = HttpClient::with_config(&cfg.http)?;
        Box::new(HttpBackend::new(http, cfg.server.base_url.clone()))
    };

    match cli.command {
        Commands::Chat { message } => {
            let guard = SessionGuard::new();
            stream_turn(
                backend.as_ref(),
                &guard,
                StdoutSurface::default(),
                &mut StderrNotices,
                &message,
            )
            .await?;
        }
        Commands::ClearMemory => {
            let ack = backend.clear_memory().await?;
            println!("{}", ack.message);
        }
        Commands::SetParams {
            instrument,
            timeframe,
        } => {
            let ack = backend
                .set_backtest_params(&BacktestParams {
                    instrument,
                    timeframe,
                })
                .await?;
            println!("{}", ack.message);
        }
        Commands::Generate { name, history } => {
            let history = read_history(history)?;
            let saved = strategy::generate_and_save(backend.as_ref(), &history, &name).await?;
            println!("saved as '{}' ({} total)", saved.name, saved.strategies.len());
        }
        Commands::Strategies { json } => {
            let strategies = backend.get_strategies().await?;
            if strategies.is_empty() {
                println!("(no saved strategies)");
            }
            for s in strategies {
                println!("{} -> {}", s.name, s.summary);
                if json {
                    let value = s.decoded()?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        Commands::Delete { name } => {
            let strategies = backend.delete_strategy(&name).await?;
            println!("deleted '{}' ({} remaining)", name, strategies.len());
        }
    }

    Ok(())
}
