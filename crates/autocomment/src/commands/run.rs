//! Headless engine command: start every signed-in account and run until
//! interrupted.

use anyhow::{Result, bail};
use tracing::{info, warn};

use super::{Workspace, shutdown_signal};

pub async fn run(workspace: Workspace) -> Result<()> {
    let controller = workspace.controller()?;
    let engine = controller.engine().clone();

    let report = match controller.start().await {
        Ok(report) => report,
        Err(e) => {
            engine.shutdown().await;
            return Err(e.into());
        }
    };
    for failure in &report.errors {
        warn!(account = %failure.account, error = %failure.error, "Account not started");
    }
    if report.started_count() == 0 {
        engine.shutdown().await;
        bail!("no session could be started");
    }

    info!(sessions = report.started_count(), "Engine running, press Ctrl+C to stop");
    shutdown_signal(None).await;
    engine.shutdown().await;
    Ok(())
}
