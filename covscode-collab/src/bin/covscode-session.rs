//! Join a workspace directory to a repository session and keep it synced
//! until Ctrl-C.
//!
//! Usage: `covscode-session <config.json> [workspace_dir]`

use std::sync::Arc;

use covscode_collab::{LocalWorkspace, LogUi, RepoSession, SessionConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: covscode-session <config.json> [workspace_dir]");
        std::process::exit(2);
    };
    let root = args.next().unwrap_or_else(|| ".".to_string());

    if let Err(e) = run(&config_path, &root).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config_path: &str, root: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::from_path(config_path)?;
    log::info!(
        "Starting session for {} in repository {} ({:?})",
        config.user_id,
        config.repo_id,
        config.mode
    );

    let workspace = Arc::new(LocalWorkspace::new(root));
    let session = RepoSession::new(config, workspace, Arc::new(LogUi::new()))?;
    session.connect_repo().await?;

    tokio::signal::ctrl_c().await?;
    log::info!("Interrupted, leaving repository...");
    session.close_repo().await?;
    Ok(())
}
