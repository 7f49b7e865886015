use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use tracing_subscriber::EnvFilter;
use updown::{Client, Presentation, StoreConfig};

#[derive(Parser)]
#[command(name = "updown")]
#[command(about = "Collect up and down votes for presentations")]
struct Cli {
    /// Store URL: `memory://<bucket>` or `file://<path>`
    #[arg(long, global = true, default_value = "file://updown.store")]
    store: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the primary index (safe to repeat)
    SetupIndexes,
    /// Add a new presentation
    Add {
        #[arg(long)]
        title: String,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        created_at: Option<String>,
        /// Explicit document key instead of the one derived from the title
        #[arg(long)]
        id: Option<String>,
    },
    /// Show one presentation
    Show { id: String },
    /// Cast a vote
    Vote { id: String, direction: VoteDirection },
    /// Change a presentation's title (its key stays the same)
    Rename {
        id: String,
        #[arg(long)]
        title: String,
    },
    /// List every presentation, oldest first
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteDirection {
    Up,
    Down,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::from_url(&cli.store)
        .with_context(|| format!("Invalid store URL '{}'", cli.store))?;
    let client = Client::open(config)
        .await
        .with_context(|| format!("Failed to open store '{}'", cli.store))?;

    match cli.command {
        Command::SetupIndexes => {
            client
                .setup_indexes()
                .await
                .context("Couldn't create indexes")?;
            println!("Indexes ready on bucket '{}'", client.store().bucket());
            Ok(())
        }
        Command::Add {
            title,
            created_at,
            id,
        } => add(&client, title, created_at.as_deref(), id).await,
        Command::Show { id } => {
            let presentation = client
                .presentations()
                .find(&id)
                .await
                .with_context(|| format!("Failed to load '{}'", id))?;
            println!("{}", describe(&presentation));
            Ok(())
        }
        Command::Vote { id, direction } => {
            let mut presentation = client
                .presentations()
                .find(&id)
                .await
                .with_context(|| format!("Failed to load '{}'", id))?;
            match direction {
                VoteDirection::Up => presentation.up_vote(),
                VoteDirection::Down => presentation.down_vote(),
            }
            let saved = client
                .presentations()
                .save(&presentation)
                .await
                .with_context(|| format!("Failed to save vote for '{}'", id))?;
            println!("{}", describe(&saved));
            Ok(())
        }
        Command::Rename { id, title } => {
            let mut presentation = client
                .presentations()
                .find(&id)
                .await
                .with_context(|| format!("Failed to load '{}'", id))?;
            presentation.set_title(title);
            let saved = client
                .presentations()
                .save(&presentation)
                .await
                .with_context(|| format!("Failed to rename '{}'", id))?;
            println!("{}", describe(&saved));
            Ok(())
        }
        Command::List => {
            let mut presentations = client
                .presentations()
                .find_all()
                .await
                .context("Failed to list presentations (did you run setup-indexes?)")?;
            while let Some(presentation) = presentations.try_next().await? {
                println!("{}", describe(&presentation));
            }
            Ok(())
        }
    }
}

async fn add(
    client: &Client,
    title: String,
    created_at: Option<&str>,
    id: Option<String>,
) -> Result<()> {
    let mut presentation = Presentation::with_title(title);
    if let Some(created_at) = created_at {
        presentation.set_created_at(parse_timestamp(created_at)?);
    }
    if let Some(id) = id {
        presentation.assign_id(id);
    }

    let saved = client
        .presentations()
        .save(&presentation)
        .await
        .context("Failed to add presentation")?;
    println!("{}", describe(&saved));
    Ok(())
}

fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| anyhow!("Invalid timestamp '{}': {}", input, err))
}

fn describe(presentation: &Presentation) -> String {
    format!(
        "{}\t{}\t+{} -{}\t{}",
        presentation.id().unwrap_or("-"),
        presentation.created_at().to_rfc3339(),
        presentation.up_votes(),
        presentation.down_votes(),
        presentation.title()
    )
}
