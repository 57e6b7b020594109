use anyhow::Context;
use clap::{Parser, Subcommand};
use tether::config::Config;
use tether::db::{make_pool, run_migrations};
use tether::reminders::{NewReminder, ReminderKind, ReminderRepo, ReminderStatus};
use tether::schedule::{next_cron_fire, parse_time_expression, TimeExpression};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tetherctl", about = "Inspect and manage tether reminders")]
struct Cli {
    /// Overrides TETHER_DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a time expression is understood, without saving anything
    Parse {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Save a new reminder
    Add {
        message: String,
        #[arg(short, long)]
        when: String,
        #[arg(short, long)]
        channel: Option<String>,
    },
    /// List reminders, newest first
    List {
        #[arg(short, long)]
        status: Option<ReminderStatus>,
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
    /// Cancel a pending reminder
    Cancel { id: Uuid },
    /// Reminder counts per status
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Parsing needs no database.
    if let Commands::Parse { text } = &cli.command {
        print_parse(&text.join(" "), cli.json)?;
        return Ok(());
    }

    let mut cfg = Config::from_env()?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    let pool = make_pool(&cfg.database_url).await?;
    run_migrations(&pool).await?;
    let repo = ReminderRepo::new(pool);

    match cli.command {
        Commands::Parse { .. } => {}
        Commands::Add {
            message,
            when,
            channel,
        } => {
            let expr = parse_time_expression(&when)
                .with_context(|| format!("could not understand {when:?}"))?;
            let kind = match &expr {
                TimeExpression::Recurring { cron, .. } => ReminderKind::Recurring { cron: cron.clone() },
                TimeExpression::Once { at, .. } => ReminderKind::Once { at: *at },
            };

            let id = repo
                .create(NewReminder {
                    message,
                    kind,
                    channel: channel.unwrap_or(cfg.default_channel),
                })
                .await?;
            if cli.json {
                println!("{}", serde_json::json!({ "id": id, "expression": expr }));
            } else {
                println!("added {id} ({})", expr.description());
            }
        }
        Commands::List { status, limit } => {
            let items = repo.list(status, limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            if items.is_empty() {
                println!("no reminders");
            }
            for r in items {
                let when = match &r.kind {
                    ReminderKind::Once { at } => at.with_timezone(&chrono::Local).to_rfc2822(),
                    ReminderKind::Recurring { cron } => format!("cron {cron}"),
                };
                println!(
                    "{}  {:<9}  {:<12}  {}  {}",
                    r.id, r.status, r.channel, when, r.message
                );
            }
        }
        Commands::Cancel { id } => {
            let cancelled = repo.mark_cancelled(id).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "id": id, "cancelled": cancelled }));
            } else if cancelled {
                println!("cancelled {id}");
            } else {
                println!("{id} is not pending; nothing to cancel");
            }
        }
        Commands::Stats => {
            let counts = repo.count_by_status().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
                return Ok(());
            }
            println!(
                "reminders: pending={} completed={} cancelled={} total={}",
                counts.pending,
                counts.completed,
                counts.cancelled,
                counts.total()
            );
        }
    }

    Ok(())
}

fn print_parse(text: &str, json: bool) -> anyhow::Result<()> {
    let expr = parse_time_expression(text);
    if json {
        println!("{}", serde_json::to_string_pretty(&expr)?);
        if expr.is_none() {
            std::process::exit(2);
        }
        return Ok(());
    }

    match expr {
        Some(TimeExpression::Recurring { cron, description }) => {
            println!("recurring: {description}");
            println!("cron:      {cron}");
            if let Ok(Some(next)) = next_cron_fire(&cron, &chrono::Local::now()) {
                println!("next fire: {}", next.to_rfc2822());
            }
        }
        Some(TimeExpression::Once { at, text }) => {
            println!("once:      {text}");
            println!("at:        {}", at.with_timezone(&chrono::Local).to_rfc2822());
        }
        None => {
            eprintln!("could not understand {text:?}");
            std::process::exit(2);
        }
    }
    Ok(())
}
