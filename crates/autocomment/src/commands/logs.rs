use anyhow::{Context, Result};

use autocomment::logging;

use super::Workspace;

pub async fn run(workspace: &Workspace, lines: Option<usize>) -> Result<()> {
    let path = &workspace.paths.log_file;
    let lines = lines.unwrap_or(workspace.config.logging.tail_lines);
    let tail = logging::tail(path, lines)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
