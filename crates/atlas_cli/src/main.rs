//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire settings, logging and one event store together at startup.
//! - Print event counts or an entity timeline for quick local checks.
//! - Read and edit the settings file by dotted key.

use atlas_core::{
    init_logging_from_config, AtlasConfig, AuditTrail, EventStore, QueryFilter, SettingsFile,
    SqliteEventStore,
};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const MAX_PAYLOAD_CHARS: usize = 80;

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Inspect the Atlas event log", long_about = None)]
struct Cli {
    /// Settings file; created with defaults when missing.
    #[arg(long, default_value = "config/settings.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Count stored events, optionally for one entity type
    Count { entity_type: Option<String> },
    /// Print the full history of one entity
    Explain {
        entity_type: String,
        entity_id: String,
    },
    /// Read or edit settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one setting by dotted key, e.g. `query.default_limit`
    Get { key: String },
    /// Set one setting; the value is read as JSON, or as text otherwise
    Set { key: String, value: String },
    /// Restore one setting to its default
    Delete { key: String },
    /// Restore every setting to its default
    Reset,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("atlas: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut settings = SettingsFile::open(&cli.config)?;
    let config = settings.effective();
    init_logging_from_config(&config.logging)?;

    match cli.command.unwrap_or(Commands::Count { entity_type: None }) {
        Commands::Count { entity_type } => {
            let store = open_store(&config)?;
            let filter = match entity_type {
                Some(entity_type) => QueryFilter::for_entity_type(entity_type),
                None => QueryFilter::all(),
            };
            println!("atlas_core version={}", atlas_core::core_version());
            println!("events={}", store.count(&filter)?);
        }
        Commands::Explain {
            entity_type,
            entity_id,
        } => {
            let store = open_store(&config)?;
            print_trail(&AuditTrail::load(&store, &entity_type, &entity_id)?);
        }
        Commands::Config { action } => run_config(&mut settings, action)?,
    }

    Ok(())
}

fn open_store(config: &AtlasConfig) -> Result<SqliteEventStore, Box<dyn Error>> {
    let store = SqliteEventStore::open(&config.database.path)?
        .with_default_limit(config.query.default_limit);
    info!(
        "event=cli_start module=cli status=ok version={}",
        atlas_core::core_version()
    );
    Ok(store)
}

fn run_config(settings: &mut SettingsFile, action: ConfigAction) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::Get { key } => match settings.get(&key) {
            Some(value) => println!("{key}={value}"),
            None => return Err(format!("unknown setting `{key}`").into()),
        },
        ConfigAction::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            settings.set(&key, value)?;
            println!("saved {}", settings.path().display());
        }
        ConfigAction::Delete { key } => {
            if settings.delete(&key)? {
                println!("{key} restored to default");
            } else {
                println!("{key} is not a setting");
            }
        }
        ConfigAction::Reset => {
            settings.reset()?;
            println!("defaults written to {}", settings.path().display());
        }
    }
    Ok(())
}

fn print_trail(trail: &AuditTrail) {
    if trail.is_empty() {
        println!("{} has no history", trail.key);
        return;
    }

    println!("{} ({} events)", trail.key, trail.len());
    for event in trail.entries() {
        println!(
            "#{:<6} {} {:<24} {}",
            event.sequence_id,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            truncate(&event.payload.to_string(), MAX_PAYLOAD_CHARS)
        );
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, ConfigAction};
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_config_path() {
        let cli = Cli::try_parse_from(["atlas"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/settings.json"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn explain_takes_type_and_id_after_global_config() {
        let cli = Cli::try_parse_from(["atlas", "--config", "/tmp/s.json", "explain", "goal", "7"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/s.json"));
        match cli.command {
            Some(Commands::Explain {
                entity_type,
                entity_id,
            }) => {
                assert_eq!(entity_type, "goal");
                assert_eq!(entity_id, "7");
            }
            _ => panic!("expected explain"),
        }
    }

    #[test]
    fn explain_without_id_is_rejected() {
        assert!(Cli::try_parse_from(["atlas", "explain", "goal"]).is_err());
        assert!(Cli::try_parse_from(["atlas", "replay"]).is_err());
    }

    #[test]
    fn config_set_parses_key_and_value() {
        let cli = Cli::try_parse_from(["atlas", "config", "set", "query.default_limit", "50"])
            .unwrap();
        match cli.command {
            Some(Commands::Config {
                action: ConfigAction::Set { key, value },
            }) => {
                assert_eq!(key, "query.default_limit");
                assert_eq!(value, "50");
            }
            _ => panic!("expected config set"),
        }
    }

    #[test]
    fn count_accepts_optional_entity_type() {
        let cli = Cli::try_parse_from(["atlas", "count", "task"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Count { entity_type: Some(ref entity_type) }) if entity_type == "task"
        ));
    }
}
