//! Habit Assistant Daemon - Rust implementation
//!
//! CLI for running the chat daemon and inspecting stored data offline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use habit_assistant_rs::advice::DisabledAdvisor;
use habit_assistant_rs::config::Config;
use habit_assistant_rs::conversation::ConversationEngine;
use habit_assistant_rs::logstore::{DaySummary, LogStore};
use habit_assistant_rs::reminders::Reminders;
use habit_assistant_rs::router::{parse_user_date, Router, USER_DATE_FORMAT};
use habit_assistant_rs::scheduler::Scheduler;
use habit_assistant_rs::subscribers::SubscriberRegistry;
use habit_assistant_rs::tasks::TaskManager;
use habit_assistant_rs::telegram::TelegramTransport;
use habit_assistant_rs::transport::Transport;
use habit_assistant_rs::ChatId;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Habit Assistant - meals, water, reflections, tasks and reminders
#[derive(Parser)]
#[command(name = "habit-assistant-rs")]
#[command(about = "Run the Habit Assistant chat daemon and inspect its data")]
struct Cli {
    /// Directory holding tasks, logs and the subscriber list
    #[arg(long, global = true, env = "HABIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Telegram bot token
    #[arg(long, global = true, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon until Ctrl-C
    Run,

    /// Print a chat's day summary
    Summary {
        /// Chat id
        #[arg(allow_negative_numbers = true)]
        chat_id: ChatId,

        /// Day to show (DD.MM.YYYY), today if omitted
        #[arg(long)]
        date: Option<String>,
    },

    /// Print a chat's task list
    Tasks {
        /// Chat id
        #[arg(allow_negative_numbers = true)]
        chat_id: ChatId,
    },

    /// List subscribed chats
    Subscribers,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.data_dir {
        Some(dir) => Config::rooted_at(&dir),
        None => Config::default(),
    };
    config.bot_token = cli.token;

    match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Summary { chat_id, date } => cmd_summary(&config, chat_id, date.as_deref()),
        Commands::Tasks { chat_id } => cmd_tasks(&config, chat_id),
        Commands::Subscribers => cmd_subscribers(&config),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_summary(config: &Config, chat_id: ChatId, date: Option<&str>) -> anyhow::Result<()> {
    let date = match date {
        Some(text) => parse_user_date(text)
            .with_context(|| format!("expected a date like 31.12.2024, got {:?}", text))?,
        None => habit_assistant_rs::today(),
    };

    let store = LogStore::new(config);
    let summary = store.day_summary(chat_id, date)?;
    let heading = date.format(USER_DATE_FORMAT);
    if summary.is_empty() {
        println!("No records for chat {} on {}", chat_id, heading);
    } else {
        println!("Summary for chat {} on {}", chat_id, heading);
        print!("{}", format_summary_plain(&summary));
    }
    Ok(())
}

fn format_summary_plain(summary: &DaySummary) -> String {
    let mut out = String::new();
    if !summary.food.is_empty() {
        out.push_str("Food:\n");
        for meal in &summary.food {
            out.push_str(&format!("  {}: {}\n", meal.label, meal.description));
        }
    }
    if summary.water_entries > 0 {
        out.push_str(&format!(
            "Water: {} ml ({} entries)\n",
            summary.water_ml, summary.water_entries
        ));
    }
    if !summary.reflections.is_empty() {
        out.push_str("Reflections:\n");
        for text in &summary.reflections {
            out.push_str(&format!("  {}\n", text.replace('\n', "\n  ")));
        }
    }
    out
}

fn cmd_tasks(config: &Config, chat_id: ChatId) -> anyhow::Result<()> {
    let tasks = TaskManager::new(config).load(chat_id)?;
    if tasks.is_empty() {
        println!("No tasks for chat {}", chat_id);
        return Ok(());
    }

    let today = habit_assistant_rs::today();
    for (i, task) in tasks.iter().enumerate() {
        let mark = if task.is_done_on(today) { "x" } else { " " };
        println!(
            "{}. [{}] {} (done {} days)",
            i + 1,
            mark,
            task.name,
            task.done_dates.len()
        );
    }
    Ok(())
}

fn cmd_subscribers(config: &Config) -> anyhow::Result<()> {
    let registry = SubscriberRegistry::open(config).with_context(|| {
        format!(
            "failed to read subscribers from {}",
            config.subscribers_file.display()
        )
    })?;

    if registry.is_empty() {
        println!("No subscribers");
    }
    for chat_id in registry.snapshot() {
        println!("{}", chat_id);
    }
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

fn cmd_run(config: &Config) -> anyhow::Result<()> {
    info!("Habit Assistant daemon starting (Rust)");

    let transport = Arc::new(TelegramTransport::new(config)?);

    for dir in [&config.data_dir, &config.tasks_dir, &config.logs_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run_daemon(config, transport))
}

async fn run_daemon(config: &Config, transport: Arc<TelegramTransport>) -> anyhow::Result<()> {
    let log_store = Arc::new(LogStore::new(config));
    let tasks = Arc::new(TaskManager::new(config));
    let subscribers = Arc::new(SubscriberRegistry::open(config)?);
    info!("Loaded {} subscribers", subscribers.len());

    let conversations = Arc::new(ConversationEngine::new(
        log_store.clone(),
        tasks.clone(),
        Arc::new(DisabledAdvisor),
    ));
    let router = Arc::new(Router::new(
        log_store,
        tasks,
        subscribers.clone(),
        conversations.clone(),
    ));

    transport.register_commands().await;

    let scheduler = Arc::new(Scheduler::new());
    let reminders = Arc::new(Reminders::new(
        config,
        transport.clone(),
        subscribers.clone(),
        scheduler.clone(),
    ));
    reminders.start(config)?;

    let mut inbox = transport.start_polling();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main loop
    loop {
        tokio::select! {
            incoming = inbox.recv() => {
                let Some(msg) = incoming else {
                    warn!("Inbound channel closed");
                    break;
                };
                debug!(
                    "Message in chat {}: {}",
                    msg.chat_id,
                    msg.text.chars().take(50).collect::<String>()
                );

                // Awaited in turn, so one chat's messages are handled in order
                let Some(reply) = router.handle_blocking(msg.chat_id, msg.text).await else {
                    continue;
                };
                if let Err(e) = transport.send_message(msg.chat_id, &reply).await {
                    warn!("Failed to reply in chat {}: {}", msg.chat_id, e);
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    scheduler.shutdown();
    if conversations.active_count() > 0 {
        info!("Dropping {} unfinished conversations", conversations.active_count());
    }
    subscribers.flush()?;
    info!("Habit Assistant daemon stopped");
    Ok(())
}
