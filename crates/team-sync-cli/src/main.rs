//! teamsync: command-line host for the team sync engine.
//!
//! Keeps a local JSON store in sync with a shared document directory, so two
//! machines (or two config directories on one machine) behave like two
//! devices on the same team.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use team_sync::backup::{self, Backup};
use team_sync::tracked::{CURRENT_GAME_KEY, GAMES_KEY, ROSTER_KEY, TEAM_NAME_KEY};
use team_sync::{
    HydrationOutcome, LeaveOutcome, LocalStore, StaticIdentity, SyncEvent, TeamCode, TeamSync,
    UserIdentity,
};
use team_sync_cli::ui::format_memberships;
use team_sync_cli::{Config, DirectoryRemote, JsonFileStore, TerminalUi};

#[derive(Parser, Debug)]
#[command(name = "teamsync")]
#[command(about = "Sync team roster and games with a shared document store")]
struct Args {
    /// Config directory (holds config.json)
    #[arg(short, long, default_value = ".teamsync")]
    config: PathBuf,

    /// Local store file (overrides config)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Shared document directory (overrides config)
    #[arg(long)]
    remote: Option<PathBuf>,

    /// Sign in as this user id (overrides config)
    #[arg(long)]
    user: Option<String>,

    /// Answer yes to every confirmation
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show memberships and the active team
    Status,
    /// Create a team from this device's data
    Create,
    /// Join a team by code
    Join { code: String },
    /// Leave a team (the active one by default)
    Leave { code: Option<String> },
    /// Make another joined team active
    Switch { code: String },
    /// Print a local value
    Get { key: String },
    /// Write a local value (synced when the key is tracked)
    Set { key: String, value: String },
    /// Remove a local value
    Remove { key: String },
    /// Write a backup of the tracked values
    Export { path: Option<PathBuf> },
    /// Load a backup into the store
    Import { path: PathBuf },
    /// Remove all team data from this device
    Clear,
    /// Stay running and print changes from other devices
    Watch,
}

/// Short names for the well-known keys; anything else is used verbatim.
fn resolve_key(key: &str) -> &str {
    match key {
        "roster" => ROSTER_KEY,
        "games" => GAMES_KEY,
        "name" | "team-name" => TEAM_NAME_KEY,
        "current-game" => CURRENT_GAME_KEY,
        other => other,
    }
}

fn describe(outcome: HydrationOutcome) -> String {
    match outcome {
        HydrationOutcome::Pulled { applied, cleared } => {
            format!("loaded team data ({} updated, {} cleared)", applied, cleared)
        }
        HydrationOutcome::Pushed { records } => {
            format!("uploaded {} local records", records)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to warn (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,team_sync=debug"
    } else {
        "warn,team_sync=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(&args.config)?;
    if let Some(store) = args.store {
        config.store_path = store;
    }
    if let Some(remote) = args.remote {
        config.remote_root = remote;
    }
    let identity = match args.user {
        Some(uid) => Some(UserIdentity::new(uid)),
        None => config.user.as_ref().map(|u| u.identity()),
    };

    info!("Store: {:?}", config.store_path);
    info!("Remote: {:?}", config.remote_root);

    let store = JsonFileStore::open(&config.store_path)?;
    let remote = DirectoryRemote::new(&config.remote_root);
    let mut engine =
        TeamSync::new(store, remote, config.sync.clone()).with_ui(TerminalUi::new(args.yes));

    engine
        .start(&StaticIdentity(identity))
        .await
        .context("Failed to start team sync")?;

    let result = run(&mut engine, args.command).await;
    engine.shutdown().await;
    result
}

async fn run(
    engine: &mut TeamSync<JsonFileStore, DirectoryRemote>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Status => {
            let memberships = engine.memberships();
            let active = engine.active_code();
            println!("{}", format_memberships(&memberships, active.as_ref()));
            match (&active, engine.is_syncing()) {
                (Some(code), true) => println!("Syncing with team {}", code),
                (Some(code), false) => println!("Team {} is active but not syncing", code),
                (None, _) => println!("Local only"),
            }
            if engine.identity().is_none() {
                println!("Not signed in (set --user or user in config.json)");
            }
        }
        Command::Create => {
            let code = engine.create_team().await?;
            println!("Created team {}. Share this code with your staff.", code);
        }
        Command::Join { code } => {
            let membership = engine.join_team(&code).await?;
            println!("Joined team \"{}\" ({})", membership.name, membership.code);
        }
        Command::Leave { code } => {
            let code: TeamCode = match code {
                Some(code) => code.parse()?,
                None => match engine.active_code() {
                    Some(code) => code,
                    None => bail!("No active team to leave"),
                },
            };
            match engine.leave_team(&code).await? {
                LeaveOutcome::Switched(next) => {
                    println!("Left {}. Now syncing with {}", code, next)
                }
                LeaveOutcome::Dormant => println!("Left {}. Data stays on this device.", code),
                LeaveOutcome::Unchanged => println!("Left {}", code),
            }
        }
        Command::Switch { code } => {
            let code: TeamCode = code.parse()?;
            let outcome = engine.switch_team(&code).await?;
            println!("Switched to {}: {}", code, describe(outcome));
        }
        Command::Get { key } => match engine.store().get(resolve_key(&key))? {
            Some(value) => println!("{}", value),
            None => bail!("{} is not set", key),
        },
        Command::Set { key, value } => {
            engine.store().set(resolve_key(&key), &value)?;
        }
        Command::Remove { key } => {
            engine.store().remove(resolve_key(&key))?;
        }
        Command::Export { path } => {
            let backup = backup::export(&**engine.store())?;
            let path = path.unwrap_or_else(|| PathBuf::from(backup.file_name()));
            std::fs::write(&path, backup.to_json_pretty()?)
                .with_context(|| format!("Failed to write backup: {:?}", path))?;
            println!("Exported to {}", path.display());
        }
        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read backup: {:?}", path))?;
            let backup = Backup::from_json(&raw)?;
            let written = backup::import(&**engine.store(), &backup)?;
            println!("Imported {} values", written);
        }
        Command::Clear => {
            backup::clear_tracked(&**engine.store())?;
            println!("All team data cleared from this device");
        }
        Command::Watch => watch(engine).await?,
    }
    Ok(())
}

async fn watch(engine: &TeamSync<JsonFileStore, DirectoryRemote>) -> Result<()> {
    if !engine.is_syncing() {
        warn!("No team is live; nothing will arrive");
    }

    let hooks = engine.refresh_hooks();
    for name in engine.config().refresh_hooks.clone() {
        let label = name.clone();
        hooks.register(name, move || println!("refresh: {}", label));
    }

    let store = Arc::clone(engine.store());
    let _subscription = engine.events().subscribe(move |event| match event {
        SyncEvent::RemoteApplied { document, .. } => {
            let value = team_sync::TrackedKey::from_document_name(&document)
                .and_then(|key| store.get(key.local_key()).ok().flatten());
            println!("{} <- {}", document, value.unwrap_or_else(|| "(removed)".to_string()));
        }
        SyncEvent::SubscriptionError { document, error, .. } => {
            eprintln!("{}: {}", document, error);
        }
        _ => {}
    });

    println!("Watching for changes. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}
