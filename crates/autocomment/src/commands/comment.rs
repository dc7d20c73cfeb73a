//! Comment pool commands. Changes apply at the next engine start.

use anyhow::{Result, bail};

use super::Workspace;

pub async fn list(workspace: &Workspace) -> Result<()> {
    let comments = workspace.registry().comments().await?;
    if comments.is_empty() {
        println!("No comments.");
    }
    for (i, comment) in comments.iter().enumerate() {
        println!("{:>3}. {}", i + 1, comment);
    }
    Ok(())
}

pub async fn add(workspace: &Workspace, text: &str) -> Result<()> {
    let comments = workspace.registry().add_comment(text).await?;
    println!("Comment added ({} total).", comments.len());
    Ok(())
}

pub async fn remove(workspace: &Workspace, text: &str) -> Result<()> {
    if !workspace.registry().remove_comment(text).await? {
        bail!("comment not found: {text}");
    }
    println!("Comment removed.");
    Ok(())
}
