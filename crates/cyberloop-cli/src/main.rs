//! cyberloop CLI
//!
//! Asks a tool-using model a question from the terminal. With a question argument it answers
//! once and exits; without one it starts an interactive session that keeps the conversation.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::{LevelFilter, debug};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use cyberloop::{
    Core, CoreError, CoreEvent, Message, Metrics, ModelFallback, OpenAIClient, RunOutcome,
    ToolExecutor,
};

mod config;
mod display;
mod error;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to answer. Starts an interactive session when omitted
    question: Vec<String>,

    /// Path to a TOML configuration file (default: ~/.config/cyberloop/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use, overriding the configuration
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint, overriding the configuration
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum completion requests per question
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Hide reasoning output
    #[arg(long)]
    hide_thinking: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn load_config(args: &Args) -> error::Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.provider.model.clone_from(model);
    }
    if let Some(base_url) = &args.base_url {
        config.provider.base_url.clone_from(base_url);
    }
    if let Some(max_iterations) = args.max_iterations {
        config.agent.max_iterations = max_iterations;
    }
    if args.no_stream {
        config.agent.streaming = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_core(config: &AppConfig) -> error::Result<Core<OpenAIClient>> {
    let client = OpenAIClient::new(config.client_config()?)?;
    let executor = ToolExecutor::from_config(&config.tools_config())?;
    debug!("Registered tools: {}", executor.registry().tool_names().join(", "));

    let mut core = Core::new(client, executor)
        .with_max_iterations(config.agent.max_iterations)
        .with_streaming(config.agent.streaming);
    if let Some(prompt) = &config.agent.system_prompt {
        core = core.with_system_prompt(prompt.as_str());
    }
    if let Some(model) = &config.provider.fallback_model {
        core = core.with_fallback(ModelFallback::new(model.as_str()));
    }
    Ok(core)
}

/// Runs one question with Ctrl-C wired to a fresh cancellation token.
async fn ask(
    core: &mut Core<OpenAIClient>,
    history: Vec<Message>,
    question: &str,
    show_thinking: bool,
) -> Result<RunOutcome, CoreError> {
    let token = CancellationToken::new();
    core.set_cancellation(token.clone());
    let watcher = tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    let mut metrics = Metrics::new();
    let mut streamed = false;
    let outcome = core
        .run_with_history(history, question, |event| {
            metrics.apply(&event);
            match &event {
                CoreEvent::Content(text) => {
                    streamed = true;
                    display::display_content(text);
                }
                CoreEvent::Thinking(text) if show_thinking => display::display_thinking(text),
                CoreEvent::ToolCall(update) => display::display_tool_update(update),
                CoreEvent::ModelFallback { from, to } => display::display_fallback(from, to),
                _ => {}
            }
        })
        .await;
    watcher.abort();

    let outcome = outcome?;
    if !streamed {
        print!("{}", outcome.text);
    }
    println!();
    if outcome.hit_ceiling {
        eprintln!(
            "{} Stopped after {} iterations; the answer may be incomplete.",
            "Warning:".bright_yellow(),
            outcome.iterations
        );
    }
    display::display_metrics(&metrics);
    Ok(outcome)
}

async fn run_interactive(core: &mut Core<OpenAIClient>, show_thinking: bool) -> Result<()> {
    println!("{}", "cyberloop".bright_magenta().bold());
    println!(
        "{}",
        "Commands: /tools, /clear, /quit. Ctrl-C cancels a running answer, Ctrl-D exits.".dimmed()
    );
    println!();

    let mut rl = DefaultEditor::new()?;
    let mut history: Vec<Message> = Vec::new();

    loop {
        match rl.readline(&format!("{} ", ">".bright_green())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        history.clear();
                        println!("Conversation cleared.");
                        continue;
                    }
                    "/tools" => {
                        for tool in core.executor().definitions().iter() {
                            println!(
                                "  {} {}",
                                tool.name().bright_green(),
                                tool.function.description.dimmed()
                            );
                        }
                        continue;
                    }
                    _ if line.starts_with('/') => {
                        display::display_error(&format!("Unknown command: {line}"));
                        continue;
                    }
                    _ => {}
                }

                match ask(core, history.clone(), line, show_thinking).await {
                    Ok(outcome) => history = outcome.messages,
                    Err(e) if e.is_cancelled() => println!("\n{}", "Cancelled".dimmed()),
                    Err(e) => display::display_error(&e.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {}
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                display::display_error(&err.to_string());
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;
    let mut core = build_core(&config)?;
    let show_thinking = !args.hide_thinking;

    if args.question.is_empty() {
        return run_interactive(&mut core, show_thinking).await;
    }

    let question = args.question.join(" ");
    match ask(&mut core, Vec::new(), &question, show_thinking).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => {
            eprintln!("\n{}", "Cancelled".dimmed());
            std::process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}
