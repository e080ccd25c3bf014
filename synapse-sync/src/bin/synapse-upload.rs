use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use synapse_sync::config::SyncConfig;
use synapse_sync::manifest::load_upload_manifest;
use synapse_sync::session::{AccessToken, login};
use synapse_sync::sync::engine::Reconciler;
use synapse_sync::sync::remote::SynapseStore;

/// Upload the local files listed in a CSV manifest into a Synapse folder.
#[derive(Debug, Parser)]
#[command(name = "synapse-upload")]
struct Cli {
    /// File holding a Synapse personal access token.
    #[arg(long = "authToken", visible_alias = "tokenfile")]
    auth_token: PathBuf,
    /// CSV with a `files` column and optional annotation columns.
    #[arg(long = "file_path")]
    file_path: PathBuf,
    /// Folder or project that receives the uploads.
    #[arg(long = "parent_id")]
    parent_id: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    synapse_sync::logging::init();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    let token = AccessToken::from_file(&cli.auth_token)?;
    let session = login(&config, &token).await?;
    println!("Logged in as {}", session.profile.user_name);

    let store = SynapseStore::new(
        session.client,
        config.download_staging_dir(),
        config.upload_part_size,
    );
    let reconciler = Reconciler::new(store);
    let parent = reconciler
        .validate_entity(&cli.parent_id)
        .await
        .context("invalid parent")?;
    if !parent.kind.is_container() {
        tracing::warn!(id = %parent.id, kind = %parent.type_descriptor, "parent is not a folder or project");
    }

    let entries = load_upload_manifest(&cli.file_path)?;
    reconciler
        .upload_manifest(entries, &parent.id)
        .await
        .context("upload aborted")?;
    Ok(())
}
