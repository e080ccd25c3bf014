use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use synapse_sync::config::SyncConfig;
use synapse_sync::manifest::load_download_manifest;
use synapse_sync::session::{AccessToken, login};
use synapse_sync::sync::engine::Reconciler;
use synapse_sync::sync::remote::SynapseStore;

/// Download the Synapse files and folders listed in a CSV manifest.
#[derive(Debug, Parser)]
#[command(name = "synapse-download")]
struct Cli {
    /// File holding a Synapse personal access token.
    #[arg(long = "authToken", visible_alias = "tokenfile")]
    auth_token: PathBuf,
    /// CSV with `synapse_id` and `save_path` columns.
    #[arg(long = "file_path")]
    file_path: PathBuf,
    /// Root for relative save paths.
    #[arg(long = "output_dir")]
    output_dir: PathBuf,
    /// Replace files that already exist locally.
    #[arg(long)]
    overwrite: bool,
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

    let entries = load_download_manifest(&cli.file_path)?;
    let store = SynapseStore::new(
        session.client,
        config.download_staging_dir(),
        config.upload_part_size,
    );
    Reconciler::new(store)
        .download_manifest(entries, &cli.output_dir, cli.overwrite)
        .await
        .context("download aborted")?;
    Ok(())
}
