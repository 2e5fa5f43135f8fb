use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use session_sync::store::HttpStore;
use session_sync::{FileEntity, SyncConfig, SyncEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-sync", version, about = "Mirror files and comments into session records")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the store base URL from the config
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update the session for a file
    SyncFile {
        path: String,
        /// Read the file body from this local file
        #[arg(long)]
        content_file: Option<PathBuf>,
        /// Write even when nothing changed
        #[arg(long)]
        force: bool,
    },
    /// Point an existing session at a new path
    Rename { key: String, new_path: String },
    /// Delete every session at or below a folder
    DeleteFolder { folder: String },
    /// Rebuild files and comments from stored sessions
    LoadReverse,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        let api_key_env = config.store.as_ref().and_then(|s| s.api_key_env.clone());
        config.store = Some(session_sync::config::StoreConfig {
            base_url,
            api_key_env,
        });
    }

    let store_config = config
        .store
        .clone()
        .ok_or_else(|| anyhow!("No store configured; set [store] base_url or pass --base-url"))?;
    let store = Arc::new(HttpStore::from_config(&store_config)?);
    let engine = SyncEngine::new(config, store.clone(), store);

    let output = match cli.command {
        Command::SyncFile {
            path,
            content_file,
            force,
        } => {
            let content = match content_file {
                Some(local) => std::fs::read_to_string(&local)
                    .context(format!("Failed to read {}", local.display()))?,
                None => String::new(),
            };
            let outcome = engine
                .sync_file_to_entity(&FileEntity::new(path, content), true, force)
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Rename { key, new_path } => {
            let renamed = engine
                .rename_entity(&key, &FileEntity::new(new_path, String::new()))
                .await?;
            serde_json::to_value(renamed)?
        }
        Command::DeleteFolder { folder } => {
            let entities = engine.list_entities().await?;
            let report = engine.delete_entities_by_folder(&folder, &entities).await;
            serde_json::to_value(report)?
        }
        Command::LoadReverse => serde_json::to_value(engine.load_reverse().await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
