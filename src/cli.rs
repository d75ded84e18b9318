//! CLI interface for context-keeper

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::agent::{CycleOutcome, FeedbackAgent};
use crate::config::{self, Config};
use crate::store::{ContextStore, DocumentKind, FeedbackDocument, IdentityQueue, SessionContext, UxConfig};
use crate::types::{FeedbackKind, FeedbackSource};
use crate::updater;

#[derive(Parser)]
#[command(name = "context-keeper")]
#[command(about = "Persistent assistant context with a feedback agent and a live local viewer", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the context documents
    #[arg(long, global = true, env = "CONTEXT_KEEPER_DIR")]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local viewer server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Also run the feedback agent in this process
        #[arg(long)]
        with_agent: bool,
        /// Open the viewer in the default browser
        #[arg(long)]
        open: bool,
    },
    /// Run the feedback agent
    Agent {
        /// Process pending queries once and exit
        #[arg(long)]
        once: bool,
        /// Milliseconds between queue polls
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Add feedback and queue it for the agent
    Feedback {
        /// Feedback text
        note: String,
        /// Feedback type: preference, performance or insight
        #[arg(short, long, default_value = "insight")]
        kind: FeedbackKind,
        /// Feedback category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Update the current focus
    Focus {
        /// What is being worked on
        focus: String,
        /// Progress status
        status: Option<String>,
        /// Next priority
        priority: Option<String>,
    },
    /// Record a decision and its rationale
    Decision {
        decision: String,
        rationale: String,
    },
    /// Append a note to long-term memory
    Remember {
        note: String,
    },
    /// Create any missing context documents
    Init,
    /// Show a summary of the store
    Status,
    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Using default configuration: {:#}", e);
            Config::default()
        }
    }
}

fn open_store(config: &Config) -> Result<ContextStore> {
    ContextStore::from_config(&config.store)
        .with_context(|| format!("Failed to open context store at {}", config.store.base_dir.display()))
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config().with_overrides(cli.path, None, None);

    match cli.command {
        Commands::Serve { port, host, with_agent, open } => {
            let mut config = config.with_overrides(None, host, port);
            config.server.open_browser |= open;
            crate::server::start(config, with_agent).await?;
        }
        Commands::Agent { once, interval_ms } => {
            let mut config = config;
            if let Some(ms) = interval_ms {
                config.agent.poll_interval_ms = ms;
            }
            run_agent(&config, once).await?;
        }
        Commands::Feedback { note, kind, category } => {
            let store = open_store(&config)?;
            let submitted = updater::add_feedback(&store, &note, kind, category.as_deref(), FeedbackSource::Manual)?;
            println!("✓ Feedback recorded ({} / {})", submitted.entry.kind, submitted.entry.category);
            println!("  Queued for the agent as {}", submitted.query.id);
        }
        Commands::Focus { focus, status, priority } => {
            let store = open_store(&config)?;
            let context = updater::update_focus(&store, &focus, status.as_deref(), priority.as_deref())?;
            let current = &context.current_context;
            println!("✓ Focus: {}", current.active_focus);
            println!("  Status: {}", current.progress_status);
            println!("  Next:   {}", current.next_priority);
        }
        Commands::Decision { decision, rationale } => {
            let store = open_store(&config)?;
            let recorded = updater::record_decision(&store, &decision, &rationale)?;
            println!("✓ Decision recorded: {}", recorded.decision);
        }
        Commands::Remember { note } => {
            let store = open_store(&config)?;
            updater::remember(&store, &note)?;
            println!("✓ Added to {}", store.path(DocumentKind::Memory).display());
        }
        Commands::Init => {
            let store = open_store(&config)?;
            let created = store.init().context("Failed to initialize context store")?;
            if created.is_empty() {
                println!("All documents already exist in {}", store.base_dir().display());
            } else {
                for kind in created {
                    println!("✓ Created {}", store.path(kind).display());
                }
            }
        }
        Commands::Status => {
            let store = open_store(&config)?;
            print_status(&store);
        }
        Commands::Config { show, init } => {
            if init {
                let path = config::config_path()?;
                if path.exists() {
                    println!("Configuration already exists at {}", path.display());
                } else {
                    Config::default().save_to(&path)?;
                    println!("✓ Wrote default configuration to {}", path.display());
                }
            } else if show {
                config::show_config(&config)?;
            } else {
                println!("{}", config::default_config_toml());
            }
        }
    }

    Ok(())
}

async fn run_agent(config: &Config, once: bool) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let agent = FeedbackAgent::new(store, &config.agent);

    if once {
        match agent.tick() {
            CycleOutcome::Skipped(reason) => anyhow::bail!("Agent cycle skipped: {}", reason),
            outcome => println!("{}", outcome),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    let _ = shutdown_tx.send(());
    handle.await.context("Agent task failed")?;
    Ok(())
}

fn print_status(store: &ContextStore) {
    println!("Context store: {}", store.base_dir().display());
    println!();

    for kind in DocumentKind::ALL {
        let state = match store.modified(kind) {
            Some(time) => format!("modified {}", chrono::DateTime::<chrono::Utc>::from(time).format("%Y-%m-%d %H:%M:%S UTC")),
            None => "missing".to_string(),
        };
        println!("  {:<24} {}", kind.file_name(), state);
    }
    println!();

    match store.load::<SessionContext>() {
        Ok(ctx) => {
            println!("Focus:    {}", ctx.current_context.active_focus);
            println!("Status:   {}", ctx.current_context.progress_status);
            println!("Next:     {}", ctx.current_context.next_priority);
            println!("Decisions: {}", ctx.decisions.len());
        }
        Err(e) => println!("Context unreadable: {}", e),
    }
    match store.load::<FeedbackDocument>() {
        Ok(doc) => println!("Feedback entries: {}", doc.feedback_log.len()),
        Err(e) => println!("Feedback unreadable: {}", e),
    }
    match store.load::<IdentityQueue>() {
        Ok(queue) => println!("Pending queries:  {}", queue.pending_count()),
        Err(e) => println!("Queue unreadable: {}", e),
    }
    match store.load::<UxConfig>() {
        Ok(ux) => println!("Theme:            {}", ux.theme),
        Err(e) => println!("UX config unreadable: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_feedback() {
        let cli = Cli::try_parse_from(["context-keeper", "--path", "/tmp/x", "feedback", "make it dark", "--kind", "preference"]).unwrap();
        assert_eq!(cli.path, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Feedback { note, kind, category } => {
                assert_eq!(note, "make it dark");
                assert_eq!(kind, FeedbackKind::Preference);
                assert!(category.is_none());
            }
            _ => panic!("expected feedback command"),
        }
    }

    #[test]
    fn test_parse_focus_positionals() {
        let cli = Cli::try_parse_from(["context-keeper", "focus", "Viewer", "testing"]).unwrap();
        match cli.command {
            Commands::Focus { focus, status, priority } => {
                assert_eq!(focus, "Viewer");
                assert_eq!(status.as_deref(), Some("testing"));
                assert!(priority.is_none());
            }
            _ => panic!("expected focus command"),
        }
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from(["context-keeper", "serve", "--port", "4100", "--with-agent", "--open"]).unwrap();
        match cli.command {
            Commands::Serve { port, host, with_agent, open } => {
                assert_eq!(port, Some(4100));
                assert!(host.is_none());
                assert!(with_agent);
                assert!(open);
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_bad_kind_rejected() {
        assert!(Cli::try_parse_from(["context-keeper", "feedback", "x", "--kind", "nope"]).is_err());
    }
}
