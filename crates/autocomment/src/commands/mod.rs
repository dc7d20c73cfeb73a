//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

use autocomment::config::{self, Config, WorkspacePaths};
use autocomment::connector::{GatewayConnector, GatewaySettings};
use autocomment::control::Controller;
use autocomment::engine::EngineHandle;
use autocomment::store::AccountRegistry;
use autocomment::store::file::FileStateStore;

pub mod account;
pub mod comment;
pub mod logs;
pub mod run;
pub mod serve;

/// Loaded config plus the paths derived from it.
pub struct Workspace {
    pub config: Config,
    pub paths: WorkspacePaths,
    config_path: String,
}

impl Workspace {
    pub async fn load(config_path: &str) -> Result<Self> {
        let config = Config::load(config_path)
            .await
            .with_context(|| format!("failed to load config '{config_path}'"))?;
        let paths = WorkspacePaths::resolve(Path::new(config_path), &config);
        Ok(Self {
            config,
            paths,
            config_path: config_path.to_string(),
        })
    }

    pub fn registry(&self) -> AccountRegistry {
        let store = Arc::new(FileStateStore::new(&self.paths.state_file));
        AccountRegistry::new(store, &self.paths.sessions_dir)
    }

    /// Start the engine loop backed by the configured gateway command.
    pub fn start_engine(&self) -> Result<EngineHandle> {
        let mut settings = GatewaySettings::from_config(&self.config)?;
        // Resolve command path relative to config file
        if settings.command.contains('/') {
            settings.command =
                config::resolve_path(Path::new(&self.config_path), Path::new(&settings.command))
                    .to_string_lossy()
                    .to_string();
        }
        std::fs::create_dir_all(&self.paths.sessions_dir).with_context(|| {
            format!(
                "failed to create sessions directory '{}'",
                self.paths.sessions_dir.display()
            )
        })?;

        let connector = Arc::new(GatewayConnector::new(settings));
        let engine = EngineHandle::start(connector).context("failed to start engine loop")?;
        Ok(engine)
    }

    pub fn controller(&self) -> Result<Controller> {
        Ok(Controller::new(self.registry(), self.start_engine()?))
    }
}

/// Resolve on Ctrl+C, SIGTERM or (when given) an HTTP shutdown request.
pub async fn shutdown_signal(http_shutdown: Option<oneshot::Receiver<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let http = async {
        match http_shutdown {
            Some(rx) => {
                let _ = rx.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = http => info!("Received shutdown request via HTTP, shutting down..."),
    }
}
