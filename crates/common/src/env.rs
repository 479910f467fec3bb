//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use tracing::{info, warn};

/// Ensure the local storage root exists when one is configured.
/// Without a data directory everything stays in memory, which is only
/// suitable for development.
pub async fn ensure_env(data_dir: Option<&str>) -> anyhow::Result<()> {
    match data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| anyhow::anyhow!("cannot create {dir}: {e}"))?;
            info!(%dir, "storage data directory ready");
        }
        None => warn!("no storage data directory configured; state is kept in memory only"),
    }
    Ok(())
}
