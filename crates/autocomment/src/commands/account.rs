//! Account management commands.

use anyhow::{Result, bail};

use autocomment::api::ListAccountsResponse;
use autocomment::control::Confirmation;

use super::Workspace;

pub async fn list(workspace: &Workspace) -> Result<()> {
    let state = workspace.registry().snapshot().await?;
    let accounts = ListAccountsResponse::from(&state).accounts;
    if accounts.is_empty() {
        println!("No accounts.");
        return Ok(());
    }
    for account in accounts {
        let status = if account.signed_in {
            "signed in"
        } else if account.code_pending {
            "code requested"
        } else {
            "not signed in"
        };
        println!("{:<20} {}", account.phone, status);
    }
    Ok(())
}

pub async fn request_code(workspace: &Workspace, phone: &str) -> Result<()> {
    let controller = workspace.controller()?;
    let result = controller.request_code(phone).await;
    controller.engine().shutdown().await;
    result?;

    println!("Verification code sent to {phone}.");
    println!("Run `autocomment account confirm {phone} <CODE>` to finish signing in.");
    Ok(())
}

pub async fn confirm(
    workspace: &Workspace,
    phone: &str,
    code: &str,
    password: Option<&str>,
) -> Result<()> {
    let controller = workspace.controller()?;
    let result = controller.confirm(phone, code, password).await;
    controller.engine().shutdown().await;

    match result? {
        Confirmation::SignedIn => {
            println!("Account {phone} signed in.");
            Ok(())
        }
        Confirmation::NotAuthorized => bail!("sign-in for {phone} was not completed"),
    }
}

pub async fn remove(workspace: &Workspace, phone: &str) -> Result<()> {
    if !workspace.registry().remove_account(phone).await? {
        bail!("account {phone} not found");
    }
    println!("Account {phone} removed.");
    Ok(())
}
