use std::path::PathBuf;

/// Runtime configuration, loaded from the environment (`.env` honored).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub page_size: usize,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let db_path = std::env::var("EDDY_DB_PATH").unwrap_or_else(|_| "eddy.db".into());
        let page_size: usize = std::env::var("EDDY_PAGE_SIZE")
            .unwrap_or_else(|_| "20".into())
            .parse()?;

        Ok(Self { db_path: PathBuf::from(db_path), page_size })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { db_path: PathBuf::from("eddy.db"), page_size: 20 }
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins; defaults to debug for
/// this workspace.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eddy=debug".into()),
        )
        .init();
}
