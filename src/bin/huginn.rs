//! huginn - diagnostic CLI for the huginn gateway
//!
//! Exercises a configured gateway and inspects the embedding cache.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use huginn::embeddings::default_cache_dir;
use huginn::{
    CompletionRequest, EmbeddingCache, EmbeddingCacheConfig, EmbeddingRequest, GatewayClient,
    GatewayConfig,
};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Huginn LLM gateway diagnostics")]
struct Args {
    /// Gateway configuration file (TOML)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report which providers are configured and available
    Health,

    /// List models across providers
    Models {
        /// Only list this provider's models
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Run a completion
    Complete {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// Route to this provider only
        #[arg(short, long)]
        provider: Option<String>,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Embed text and print the vector summary
    Embed {
        /// Text to embed (or omit to read from stdin)
        text: Option<String>,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
        /// Route to this provider only
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show embedding cache statistics
    CacheStats {
        /// Cache directory (default: ~/.cache/huginn/embeddings)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Remove every entry from the embedding cache
    CacheClear {
        /// Cache directory (default: ~/.cache/huginn/embeddings)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };

    match args.command {
        Command::CacheStats { dir } => {
            let cache = open_cache(&config, dir)?;
            let stats = cache.get_stats();
            println!("directory: {}", cache.config().dir.display());
            println!("entries:   {} / {}", stats.entries, stats.max_size);
            println!("size:      {:.2} MB", stats.total_mb);
            println!("strategy:  {}", stats.strategy);
            if !stats.models.is_empty() {
                println!("models:    {}", stats.models.join(", "));
            }
            if let (Some(oldest), Some(newest)) = (stats.oldest_entry_days, stats.newest_entry_days)
            {
                println!("age:       {newest:.1} - {oldest:.1} days");
            }
        }
        Command::CacheClear { dir } => {
            let mut cache = open_cache(&config, dir)?;
            let removed = cache.clear();
            println!("removed {removed} entries");
        }
        command => {
            let gateway = GatewayClient::from_config(&config)?;
            let result = run(&gateway, command).await;
            gateway.cleanup().await;
            result?;
        }
    }
    Ok(())
}

/// Commands that talk to live providers.
async fn run(gateway: &GatewayClient, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Health => {
            let available = gateway.available_providers().await;
            println!("huginn {}", huginn::PKG_VERSION);
            for tag in gateway.provider_names() {
                let status = if available.iter().any(|a| a == tag) {
                    "available"
                } else {
                    "unavailable"
                };
                println!("  {tag:<16} {status}");
            }
        }

        Command::Models { provider } => {
            let models = gateway.list_models(provider.as_deref()).await;
            if models.is_empty() {
                println!("no models available");
            } else {
                for model in models {
                    let caps: Vec<String> = model
                        .capabilities
                        .iter()
                        .map(|c| format!("{c:?}").to_lowercase())
                        .collect();
                    println!("{:<16} {} [{}]", model.provider, model.id, caps.join(", "));
                }
            }
        }

        Command::Complete {
            prompt,
            provider,
            model,
        } => {
            let prompt = read_input(prompt)?;
            let mut request = CompletionRequest::new(prompt);
            if let Some(model) = model {
                request = request.model(model);
            }
            let response = gateway.complete(&request, provider.as_deref()).await?;
            println!("{}", response.content);
            eprintln!(
                "[{} {} {:?}]",
                response.provider,
                response.model.as_deref().unwrap_or("-"),
                response.finish_reason
            );
        }

        Command::Embed {
            text,
            model,
            provider,
        } => {
            let text = read_input(text)?;
            let mut request = EmbeddingRequest::new(text);
            if let Some(model) = model {
                request = request.model(model);
            }
            let response = gateway.embed(&request, provider.as_deref()).await?;
            for vector in &response.embeddings {
                let preview: Vec<String> =
                    vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
                println!("[{}, ...] ({} dims)", preview.join(", "), vector.len());
            }
            eprintln!("[{} {}]", response.provider, response.model);
        }

        Command::CacheStats { .. } | Command::CacheClear { .. } => {}
    }
    Ok(())
}

/// Cache settings from the config file, with the directory overridable.
fn open_cache(config: &GatewayConfig, dir: Option<PathBuf>) -> io::Result<EmbeddingCache> {
    let mut cache_config = config
        .embedding_cache
        .clone()
        .unwrap_or_else(|| EmbeddingCacheConfig::new(default_cache_dir()));
    if let Some(dir) = dir {
        cache_config.dir = dir;
    }
    EmbeddingCache::open(cache_config)
}

/// Use the argument if given, otherwise read stdin (unless it's a terminal).
fn read_input(arg: Option<String>) -> io::Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no input given and stdin is a terminal",
        ));
    }
    let mut buf = String::new();
    stdin.lock().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}
