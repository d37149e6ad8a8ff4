//! Kestrel CLI — terminal chat client for OpenRouter.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use kestrel_core::client::OpenRouterClient;
use kestrel_core::config::KestrelConfig;
use kestrel_core::session::{ChatSession, SessionOptions};

// ─── CLI Definition ────────────────────────────────────────

/// Kestrel — chat with OpenRouter models from your terminal
#[derive(Parser)]
#[command(name = "kestrel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 💬 Start an interactive chat session
    Chat {
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// API key (overrides config)
        #[arg(short = 'k', long, env = "OPENROUTER_API_KEY")]
        api_key: Option<String>,

        /// API base URL override
        #[arg(long)]
        api_base: Option<String>,

        /// Sampling temperature, 0.0–1.0
        #[arg(short, long)]
        temperature: Option<f64>,
    },

    /// ❓ Send a single message and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// API key
        #[arg(short = 'k', long, env = "OPENROUTER_API_KEY")]
        api_key: Option<String>,

        /// API base URL override
        #[arg(long)]
        api_base: Option<String>,
    },

    /// 📋 Fetch and list available models with costs
    Models {
        /// API key
        #[arg(short = 'k', long, env = "OPENROUTER_API_KEY")]
        api_key: Option<String>,

        /// API base URL override
        #[arg(long)]
        api_base: Option<String>,

        /// List the full catalog instead of only enabled models
        #[arg(long)]
        all: bool,
    },

    /// ⚙️  Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value (api_key, model, temperature, api_base, referer)
    Set { key: String, value: String },
    /// Print the config file location
    Path,
}

// ─── Helpers ───────────────────────────────────────────────

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kestrel")
}

fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}", format!("  Kestrel v{}", version).cyan().bold());
    println!("{}", "  OpenRouter chat from your terminal".dimmed());
    println!();
}

fn spinner(message: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Resolve a session: CLI args → saved config → env var (via clap) → error.
fn build_session(
    model: Option<&str>,
    api_key: Option<&str>,
    api_base: Option<&str>,
    temperature: Option<f64>,
) -> anyhow::Result<ChatSession> {
    let config = KestrelConfig::load(&KestrelConfig::default_path())?;

    let api_key = api_key
        .map(|s| s.to_string())
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No API key found!\n\n\
                 • {} to save one\n\
                 • Set {} environment variable\n\
                 • Pass {}",
                "kestrel config set api_key <KEY>".cyan(),
                "OPENROUTER_API_KEY",
                "--api-key <KEY>".cyan()
            )
        })?;

    let api_base = api_base
        .map(|s| s.to_string())
        .or_else(|| config.api_base.clone());

    let mut client = match api_base.as_deref() {
        Some(base) => OpenRouterClient::with_api_base(base),
        None => OpenRouterClient::new(),
    };
    if let Some(referer) = &config.referer {
        client = client.with_referer(referer);
    }

    let options = SessionOptions {
        api_key,
        temperature: temperature.unwrap_or(config.temperature),
        default_model: model.map(|s| s.to_string()).unwrap_or(config.model),
        enabled_models: config.enabled_models,
    };

    Ok(ChatSession::new(Arc::new(client), options))
}

// ─── Main ──────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to a rolling file so tracing never corrupts the prompt
    let log_dir = data_dir().join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "kestrel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kestrel_core=debug")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            model,
            api_key,
            api_base,
            temperature,
        } => {
            run_chat(
                model.as_deref(),
                api_key.as_deref(),
                api_base.as_deref(),
                temperature,
            )
            .await?;
        }

        Commands::Ask {
            message,
            model,
            api_key,
            api_base,
        } => {
            run_ask(
                &message,
                model.as_deref(),
                api_key.as_deref(),
                api_base.as_deref(),
            )
            .await?;
        }

        Commands::Models {
            api_key,
            api_base,
            all,
        } => {
            run_models(api_key.as_deref(), api_base.as_deref(), all).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => run_config_show()?,
            ConfigAction::Set { key, value } => run_config_set(&key, &value)?,
            ConfigAction::Path => {
                println!("{}", KestrelConfig::default_path().display());
            }
        },
    }

    Ok(())
}

// ─── Command Handlers ──────────────────────────────────────

async fn run_chat(
    model: Option<&str>,
    api_key: Option<&str>,
    api_base: Option<&str>,
    temperature: Option<f64>,
) -> anyhow::Result<()> {
    let mut session = build_session(model, api_key, api_base, temperature)?;

    let pb = spinner("Fetching model catalog...");
    let catalog_result = session.fetch_available_models().await;
    pb.finish_and_clear();
    if let Err(e) = catalog_result {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }

    print_banner();
    println!(
        "  {} {} {} {} {}",
        "Model:".dimmed(),
        session.model_name().green(),
        "│".dimmed(),
        "Temperature:".dimmed(),
        session.temperature().to_string().green()
    );
    println!(
        "  {} {}",
        "Commands:".dimmed(),
        "/quit /clear /models /model <id> /recent /temp <v> /stats /help".dimmed()
    );
    println!();

    loop {
        print!("{} ", "You ›".green().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("{}", "👋 Goodbye!".cyan());
                break;
            }
            "/clear" => {
                session.clear_chat();
                println!("{}", "🗑️  Conversation cleared.".yellow());
                continue;
            }
            "/models" => {
                print_model_list(&session);
                continue;
            }
            "/recent" => {
                let recent = session.recent_models();
                if recent.is_empty() {
                    println!("  {}", "No recently used models yet.".dimmed());
                } else {
                    println!("\n{}", "Recently used:".bold());
                    for model in recent {
                        println!("  • {} {}", model.name.cyan(), model.id.dimmed());
                    }
                }
                println!();
                continue;
            }
            "/stats" => {
                let usage = session.usage();
                let current = session.current_model().to_string();
                println!("\n{}", "Session stats:".bold());
                println!("  {} {}", "Messages:".dimmed(), session.messages().len());
                println!("  {} {}", "Total tokens:".dimmed(), usage.total_tokens);
                println!(
                    "  {} {} prompt / {} completion",
                    "Last call:".dimmed(),
                    usage.last_prompt_tokens,
                    usage.last_completion_tokens
                );
                println!(
                    "  {} {}",
                    "Cost:".dimmed(),
                    session.format_model_cost(&current, Some(usage.cumulative_cost))
                );
                println!();
                continue;
            }
            "/help" => {
                println!("\n{}", "Commands:".bold());
                println!("  /quit        — Exit");
                println!("  /clear       — Clear conversation history");
                println!("  /models      — List enabled models");
                println!("  /model <id>  — Switch model");
                println!("  /recent      — Show recently used models");
                println!("  /temp <v>    — Set temperature (0.0–1.0)");
                println!("  /stats       — Show usage statistics");
                println!("  /help        — Show this help");
                println!();
                continue;
            }
            _ => {}
        }

        if let Some(id) = input.strip_prefix("/model ") {
            let id = id.trim();
            if session.set_model(id) {
                println!("  {} {}", "Switched to".dimmed(), session.model_name().green());
            } else {
                println!(
                    "  {} Unknown model '{}'. Try {} first.",
                    "Error:".red(),
                    id,
                    "/models".cyan()
                );
            }
            continue;
        }

        if let Some(value) = input.strip_prefix("/temp ") {
            match value.trim().parse::<f64>() {
                Ok(v) => {
                    session.update_temperature(v);
                    println!(
                        "  {} {}",
                        "Temperature set to".dimmed(),
                        session.temperature().to_string().green()
                    );
                }
                Err(_) => println!("  {} Temperature must be a number.", "Error:".red()),
            }
            continue;
        }

        let pb = spinner("Thinking...");
        let model_id = session.current_model().to_string();

        match session.send_message(input).await {
            Ok(reply) => {
                pb.finish_and_clear();
                session.track_model_usage(&model_id);
                println!("\n{} {}\n", "AI ›".cyan().bold(), reply.trim());
            }
            Err(e) => {
                pb.finish_and_clear();
                eprintln!("{} {}\n", "Error:".red().bold(), e);
            }
        }
    }

    Ok(())
}

async fn run_ask(
    message: &str,
    model: Option<&str>,
    api_key: Option<&str>,
    api_base: Option<&str>,
) -> anyhow::Result<()> {
    let mut session = build_session(model, api_key, api_base, None)?;

    match session.send_message(message).await {
        Ok(reply) => println!("{}", reply.trim()),
        Err(e) => eprintln!("{} {}", "Error:".red(), e),
    }

    Ok(())
}

async fn run_models(
    api_key: Option<&str>,
    api_base: Option<&str>,
    all: bool,
) -> anyhow::Result<()> {
    let mut session = build_session(None, api_key, api_base, None)?;

    let pb = spinner("Fetching model catalog...");
    let result = session.fetch_available_models().await;
    pb.finish_and_clear();
    result?;

    if all {
        println!("\n{}", "Available models:".bold());
        for model in session.available_models() {
            print_model_line(&session, &model.id);
        }
    } else {
        print_model_list(&session);
    }
    println!();

    Ok(())
}

fn print_model_list(session: &ChatSession) {
    let enabled = session.enabled_models();
    if enabled.is_empty() {
        println!("  {}", "Model catalog is empty — check your API key.".dimmed());
        return;
    }
    println!("\n{}", "Enabled models (by cost):".bold());
    let ids: Vec<String> = enabled.iter().map(|m| m.id.clone()).collect();
    for id in ids {
        print_model_line(session, &id);
    }
    println!();
}

fn print_model_line(session: &ChatSession, model_id: &str) {
    if let Some(model) = session.available_models().iter().find(|m| m.id == model_id) {
        let marker = if model.id == session.current_model() {
            "›".green()
        } else {
            " ".normal()
        };
        println!(
            "  {} {} {} {} ctx {} {}",
            marker,
            model.name.cyan(),
            model.id.dimmed(),
            "│".dimmed(),
            model.context_length,
            session.format_model_cost(&model.id, None).yellow()
        );
    }
}

fn run_config_show() -> anyhow::Result<()> {
    let path = KestrelConfig::default_path();
    let config = KestrelConfig::load(&path)?;

    println!("\n  {} {}", "Config:".dimmed(), path.display());
    println!(
        "  {} {}",
        "API key:".dimmed(),
        if config.api_key.is_some() {
            "✅ configured".green()
        } else {
            "❌ not set".red()
        }
    );
    println!("  {} {}", "Model:".dimmed(), config.model.green());
    println!("  {} {}", "Temperature:".dimmed(), config.temperature);
    println!(
        "  {} {}",
        "Enabled models:".dimmed(),
        config.enabled_models.join(", ")
    );
    if let Some(base) = &config.api_base {
        println!("  {} {}", "API base:".dimmed(), base);
    }
    if let Some(referer) = &config.referer {
        println!("  {} {}", "Referer:".dimmed(), referer);
    }
    println!();

    Ok(())
}

fn run_config_set(key: &str, value: &str) -> anyhow::Result<()> {
    let path = KestrelConfig::default_path();
    let mut config = KestrelConfig::load(&path)?;

    match key {
        "api_key" | "api-key" => config.api_key = Some(value.to_string()),
        "model" => config.model = value.to_string(),
        "temperature" => {
            config.temperature = value
                .parse()
                .map_err(|_| anyhow::anyhow!("temperature must be a number"))?;
        }
        "api_base" | "api-base" => config.api_base = Some(value.to_string()),
        "referer" => config.referer = Some(value.to_string()),
        _ => anyhow::bail!(
            "Unknown key '{}'. Valid keys: api_key, model, temperature, api_base, referer",
            key
        ),
    }

    config.save(&path)?;
    println!("{} {} updated.", "✅".green(), key);

    Ok(())
}
