use log::info;
use pioneer::Core;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init_timed();

    let journal_dir = std::env::var("PIONEER_JOURNAL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_journal_dir());

    info!("starting core, watching {}", journal_dir.display());

    let core = std::sync::Arc::new(Core::new(journal_dir));

    let _token = core.subscribe_state_change(|change| {
        info!("state change: {} -> {}", change.section, change.data);
    });

    core.start().await?;

    info!(
        "replay complete, {} events processed, initialized={}",
        core.events_processed_count(),
        core.is_initialized()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    core.stop().await;

    Ok(())
}

fn default_journal_dir() -> PathBuf {
    std::env::var("USERPROFILE")
        .or_else(|_| std::env::var("HOME"))
        .map(|home| PathBuf::from(home).join("Saved Games").join("Frontier Developments").join("Elite Dangerous"))
        .unwrap_or_else(|_| PathBuf::from("."))
}
