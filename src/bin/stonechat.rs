//! # Stonechat - Unified CLI
//!
//! Chat with instruction-tuned models from the terminal or a browser.
//!
//! ## Commands
//!
//! ```bash
//! stonechat serve              # Launch the web chat UI
//! stonechat chat               # Interactive terminal chat
//! stonechat run "..."          # One-shot text generation
//! stonechat pull <org/repo>    # Pre-download a checkpoint
//! ```
//!
//! ## Model selection
//!
//! ```bash
//! # Serve the default checkpoint
//! stonechat serve
//!
//! # Any llama-family repo, optionally pinned to a revision
//! stonechat serve --model TinyLlama/TinyLlama-1.1B-Chat-v1.0
//! stonechat run --model meta-llama/Llama-3.2-1B-Instruct@main "Hello"
//!
//! # Pick the device explicitly
//! stonechat chat --device cuda:0
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stonechat::config::AppConfig;
use stonechat::engine::{ChatEngine, EngineOptions};
use stonechat::history::ConversationLog;
use stonechat::hub::{HubClient, HubOptions, ModelRef};
use stonechat::sampling::SamplerOptions;
use stonechat::server::ChatServer;

#[derive(Parser)]
#[command(name = "stonechat")]
#[command(author, version, about = "Web and terminal chat for instruction-tuned models")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON config file (default: the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the web chat UI
    #[command(alias = "start")]
    Serve {
        /// Model to serve (format: org/repo or org/repo@revision)
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Device to run on (auto, cpu, cuda[:n], metal[:n])
        #[arg(short, long)]
        device: Option<String>,

        /// Weight dtype (f16, bf16, f32)
        #[arg(long)]
        dtype: Option<String>,

        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind all interfaces and print a shareable URL
        #[arg(long)]
        share: bool,

        /// Verbose request logging
        #[arg(long)]
        debug: bool,

        /// Strip failure detail from responses
        #[arg(long)]
        hide_errors: bool,

        /// Suppress startup banner output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Interactive terminal chat
    #[command(alias = "repl")]
    Chat {
        /// Model to chat with (format: org/repo or org/repo@revision)
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Device to run on (auto, cpu, cuda[:n], metal[:n])
        #[arg(short, long)]
        device: Option<String>,

        /// Maximum tokens per reply
        #[arg(short = 'n', long)]
        max_tokens: Option<usize>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f64>,

        /// Nucleus sampling threshold
        #[arg(long)]
        top_p: Option<f64>,
    },

    /// One-shot text generation
    Run {
        /// The prompt to send
        prompt: String,

        /// Model to use (format: org/repo or org/repo@revision)
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Device to run on (auto, cpu, cuda[:n], metal[:n])
        #[arg(short, long)]
        device: Option<String>,

        /// Maximum tokens to generate
        #[arg(short = 'n', long)]
        max_tokens: Option<usize>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f64>,

        /// Nucleus sampling threshold
        #[arg(long)]
        top_p: Option<f64>,

        /// Show generation stats
        #[arg(long)]
        stats: bool,
    },

    /// Pre-download a checkpoint from the hub
    #[command(alias = "download")]
    Pull {
        /// Model to fetch (format: org/repo or org/repo@revision)
        model: String,

        /// Quiet mode (no progress bars)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            model,
            device,
            dtype,
            host,
            port,
            share,
            debug,
            hide_errors,
            quiet,
        } => {
            apply_model_overrides(&mut config, model.as_deref(), device.as_deref())?;
            if let Some(dtype) = dtype {
                config.model.dtype = Some(dtype);
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.share |= share;
            config.server.debug |= debug;
            config.server.quiet |= quiet;
            if hide_errors {
                config.server.show_errors = false;
            }
            init_tracing(&config);
            config.validate()?;
            run_server(config).await?;
        }

        Commands::Chat {
            model,
            device,
            max_tokens,
            temperature,
            top_p,
        } => {
            apply_model_overrides(&mut config, model.as_deref(), device.as_deref())?;
            init_tracing(&config);
            config.validate()?;
            let options = sampler_overrides(&config, max_tokens, temperature, top_p);
            run_repl(config, options).await?;
        }

        Commands::Run {
            prompt,
            model,
            device,
            max_tokens,
            temperature,
            top_p,
            stats,
        } => {
            apply_model_overrides(&mut config, model.as_deref(), device.as_deref())?;
            init_tracing(&config);
            config.validate()?;
            let options = sampler_overrides(&config, max_tokens, temperature, top_p);
            run_prompt(config, &prompt, options, stats).await?;
        }

        Commands::Pull { model, quiet } => {
            init_tracing(&config);
            pull_model(&config, &model, quiet).await?;
        }
    }

    Ok(())
}

// ==================== Setup ====================

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }
    if let Some(default) = AppConfig::default_path() {
        if default.exists() {
            return AppConfig::from_json_file(&default)
                .with_context(|| format!("failed to load config from {}", default.display()));
        }
    }
    AppConfig::from_env().context("failed to read environment configuration")
}

fn apply_model_overrides(
    config: &mut AppConfig,
    model: Option<&str>,
    device: Option<&str>,
) -> Result<()> {
    if let Some(spec) = model {
        let reference = ModelRef::parse(spec)?;
        config.model.model_id = reference.model_id;
        config.model.revision = reference.revision;
    }
    if let Some(device) = device {
        config.model.device = device.to_string();
    }
    Ok(())
}

fn sampler_overrides(
    config: &AppConfig,
    max_tokens: Option<usize>,
    temperature: Option<f64>,
    top_p: Option<f64>,
) -> SamplerOptions {
    let mut options = config.to_sampler_options();
    if let Some(max_tokens) = max_tokens {
        options.max_new_tokens = max_tokens;
    }
    if let Some(temperature) = temperature {
        options.temperature = temperature;
    }
    if let Some(top_p) = top_p {
        options.top_p = top_p;
    }
    options
}

fn init_tracing(config: &AppConfig) {
    let level = if config.server.debug {
        "debug"
    } else if config.server.quiet {
        "warn"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("stonechat={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn boot_engine(config: &AppConfig, quiet: bool) -> Result<ChatEngine> {
    let options: EngineOptions = config.to_engine_options()?;

    if !quiet {
        println!("Starting Stonechat...");
        println!("  Model:  {}", config.model_ref());
        println!("  Device: {}", config.model.device);
        println!();
        print!("Loading model... ");
        io::stdout().flush()?;
    }

    let started = Instant::now();
    match ChatEngine::boot(options).await {
        Ok(engine) => {
            if !quiet {
                let info = engine.info();
                println!(
                    "OK ({} layers, {} on {} in {:.1}s)",
                    info.num_layers,
                    stonechat::memory::format_bytes(info.weights_bytes),
                    info.device,
                    started.elapsed().as_secs_f64()
                );
                println!();
            }
            Ok(engine)
        }
        Err(e) => {
            if !quiet {
                println!("FAILED");
            }
            Err(e).context("model load failed")
        }
    }
}

// ==================== Server ====================

async fn run_server(config: AppConfig) -> Result<()> {
    let engine = boot_engine(&config, config.server.quiet).await?;
    let server = ChatServer::new(
        engine,
        config.to_sampler_options(),
        config.to_launch_options(),
    );
    server.serve().await?;
    Ok(())
}

// ==================== Terminal chat ====================

async fn run_repl(config: AppConfig, options: SamplerOptions) -> Result<()> {
    let engine = boot_engine(&config, false).await?;
    let mut log = ConversationLog::new();

    println!("💬 Chatting with {}", config.model_ref());
    println!("Type /help for commands, 'quit' to leave.");
    println!();

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("You: ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "quit" | "exit" | "bye" => break,
            "/help" => {
                println!("  /help    show this help");
                println!("  /clear   reset the conversation");
                println!("  /stats   show generation counters");
                println!("  /memory  show memory usage");
                println!("  quit     leave the chat");
                continue;
            }
            "/clear" => {
                log.clear();
                let report = engine.clear_memory();
                println!("🧹 Conversation cleared ({})", report.summary());
                continue;
            }
            "/stats" => {
                let stats = engine.stats();
                println!("  Requests:  {} ({} failed)", stats.requests, stats.failures);
                println!("  Tokens:    {}", stats.tokens_generated);
                println!("  Time:      {}ms", stats.total_generation_ms);
                continue;
            }
            "/memory" => {
                println!("  {}", engine.memory_report().summary());
                continue;
            }
            _ => {}
        }

        log.push_user(input);
        print!("Bot: ");
        io::stdout().flush()?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = {
            let engine = engine.clone();
            let message = input.to_string();
            let options = options.clone();
            tokio::spawn(async move { engine.reply_streaming(&message, &options, tx).await })
        };
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            io::stdout().flush()?;
        }
        match task.await? {
            Ok(generated) => {
                log.push_assistant(&generated.reply);
                println!();
            }
            Err(e) => {
                let reply = format!("❌ Error generating response: {}", e);
                println!("{}", reply);
                log.push_assistant(&reply);
            }
        }
        println!();
    }

    println!("Goodbye! ({} exchanges)", log.exchanges().len());
    Ok(())
}

// ==================== One-shot ====================

async fn run_prompt(
    config: AppConfig,
    prompt: &str,
    options: SamplerOptions,
    stats: bool,
) -> Result<()> {
    let engine = boot_engine(&config, true).await?;
    let generated = engine.reply(prompt, &options).await?;

    println!("{}", generated.reply);

    if stats {
        let seconds = (generated.elapsed_ms as f64 / 1000.0).max(0.001);
        eprintln!();
        eprintln!(
            "--- {} tokens in {}ms ({:.1} tok/s) on {} ---",
            generated.completion_tokens,
            generated.elapsed_ms,
            generated.completion_tokens as f64 / seconds,
            engine.info().device
        );
    }

    Ok(())
}

// ==================== Pull ====================

async fn pull_model(config: &AppConfig, spec: &str, quiet: bool) -> Result<()> {
    let reference = ModelRef::parse(spec)?;
    let mut options = HubOptions::for_model(&reference);
    options.cache_dir = config.model.cache_dir.clone();
    options.progress = !quiet;

    if !quiet {
        println!("Pulling {}...", reference);
    }

    let client = HubClient::new(&options)?;
    let tokenizer = client.fetch_tokenizer().await?;
    let model_config = client.fetch_config().await?;
    let weights = client.fetch_weights().await?;

    if !quiet {
        println!("  tokenizer: {}", tokenizer.display());
        println!("  config:    {}", model_config.display());
        for path in &weights {
            println!("  weights:   {}", path.display());
        }
        println!("✅ {} ready ({} weight files)", reference, weights.len());
    }

    Ok(())
}
