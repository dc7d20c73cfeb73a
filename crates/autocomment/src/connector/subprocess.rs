//! Subprocess gateway connector.
//!
//! Spawns one external gateway process per account and bridges its stdio to
//! the engine with the JSON Lines protocol from `autocomment-gateway-protocol`.
//! Replies are correlated to requests by `request_id`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use autocomment_gateway_protocol::{GatewayCommand, GatewayEvent, MessageData, codes};

use super::{
    AccountIdentity, Connected, Connection, ConnectionError, Connector, InboundEvent, IncomingPost,
};
use crate::config::{Config, ConfigError};

/// Environment variable carrying the API id to the gateway.
pub const API_ID_ENV: &str = "AUTOCOMMENT_API_ID";
/// Environment variable carrying the API hash to the gateway.
pub const API_HASH_ENV: &str = "AUTOCOMMENT_API_HASH";

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

type PendingReplies = Arc<DashMap<String, oneshot::Sender<GatewayEvent>>>;

// ============================================================================
// Settings
// ============================================================================

/// How to launch gateway processes.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub api_id: i64,
    pub api_hash: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl GatewaySettings {
    /// Build settings from the loaded config. API credentials are required.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let (api_id, api_hash) = config.telegram.credentials()?;
        Ok(Self {
            command: config.gateway.command.clone(),
            args: config.gateway.args.clone(),
            env: config.gateway.env.clone(),
            api_id,
            api_hash: api_hash.to_string(),
            connect_timeout: Duration::from_secs(config.gateway.connect_timeout_seconds),
            request_timeout: Duration::from_secs(config.gateway.request_timeout_seconds),
        })
    }
}

// ============================================================================
// Connector
// ============================================================================

/// [`Connector`] that runs each account inside its own gateway process.
pub struct GatewayConnector {
    settings: GatewaySettings,
}

impl GatewayConnector {
    pub fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }

    /// Spawn the child process with proper configuration.
    fn spawn_child(&self, identity: &AccountIdentity) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.settings.command);
        cmd.args(&self.settings.args)
            .arg("--account")
            .arg(&identity.key)
            .arg("--session")
            .arg(&identity.credential)
            .envs(&self.settings.env)
            .env(API_ID_ENV, self.settings.api_id.to_string())
            .env(API_HASH_ENV, &self.settings.api_hash)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // On Linux, set PR_SET_PDEATHSIG so the gateway dies with us
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.spawn()
    }

    /// Spawn a gateway for `identity` and wait for its `ready` event.
    async fn launch(
        &self,
        identity: &AccountIdentity,
    ) -> Result<(GatewayLink, bool, mpsc::Receiver<InboundEvent>), ConnectionError> {
        let child = self.spawn_child(identity).map_err(|e| {
            ConnectionError::network(format!(
                "failed to spawn gateway '{}': {e}",
                self.settings.command
            ))
        })?;

        info!(account = %identity.key, command = %self.settings.command, "Spawned gateway");

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (evt_tx, evt_rx) = mpsc::channel(EVENT_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let pending: PendingReplies = Arc::new(DashMap::new());

        tokio::spawn(run_bridge(
            identity.key.clone(),
            child,
            cmd_rx,
            evt_tx,
            ready_tx,
            pending.clone(),
            self.settings.request_timeout,
        ));

        let link = GatewayLink {
            account: identity.key.clone(),
            cmd_tx,
            pending,
            request_timeout: self.settings.request_timeout,
        };

        match tokio::time::timeout(self.settings.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(authorized))) => Ok((link, authorized, evt_rx)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(ConnectionError::network(
                "gateway exited before becoming ready",
            )),
            Err(_) => {
                link.shutdown().await;
                Err(ConnectionError::network(format!(
                    "gateway not ready after {}s",
                    self.settings.connect_timeout.as_secs_f32()
                )))
            }
        }
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(&self, identity: &AccountIdentity) -> Result<Connected, ConnectionError> {
        let (link, authorized, events) = self.launch(identity).await?;
        Ok(Connected {
            connection: Arc::new(GatewayConnection {
                link,
                closed: AtomicBool::new(false),
            }),
            authorized,
            events,
        })
    }

    async fn request_code(&self, identity: &AccountIdentity) -> Result<String, ConnectionError> {
        let (link, _, _events) = self.launch(identity).await?;
        let request_id = new_request_id();
        let reply = link
            .request(
                &request_id,
                GatewayCommand::RequestCode {
                    request_id: request_id.clone(),
                    phone: identity.key.clone(),
                },
            )
            .await;
        link.shutdown().await;

        match reply? {
            GatewayEvent::CodeSent {
                phone_code_hash, ..
            } => Ok(phone_code_hash),
            GatewayEvent::CommandError { code, message, .. } => {
                Err(command_error(&identity.key, &code, message))
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn sign_in(
        &self,
        identity: &AccountIdentity,
        code: &str,
        phone_code_hash: &str,
        password: Option<&str>,
    ) -> Result<bool, ConnectionError> {
        let (link, authorized, _events) = self.launch(identity).await?;
        if authorized {
            link.shutdown().await;
            return Ok(true);
        }

        let request_id = new_request_id();
        let reply = link
            .request(
                &request_id,
                GatewayCommand::SignIn {
                    request_id: request_id.clone(),
                    phone: identity.key.clone(),
                    code: code.to_string(),
                    phone_code_hash: phone_code_hash.to_string(),
                    password: password.map(str::to_string),
                },
            )
            .await;
        link.shutdown().await;

        match reply? {
            GatewayEvent::SignedIn { .. } => Ok(true),
            GatewayEvent::CommandError { code, message, .. } => {
                Err(command_error(&identity.key, &code, message))
            }
            other => Err(unexpected_reply(&other)),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A signed-in account backed by a running gateway process.
pub struct GatewayConnection {
    link: GatewayLink,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for GatewayConnection {
    fn account(&self) -> &str {
        &self.link.account
    }

    async fn send_comment(
        &self,
        chat_id: i64,
        message_id: i64,
        content: &str,
    ) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }

        let request_id = new_request_id();
        let reply = self
            .link
            .request(
                &request_id,
                GatewayCommand::SendComment {
                    request_id: request_id.clone(),
                    chat_id,
                    message_id,
                    content: content.to_string(),
                },
            )
            .await?;

        match reply {
            GatewayEvent::CommandOk { .. } => Ok(()),
            GatewayEvent::CommandError { code, message, .. } => {
                Err(command_error(&self.link.account, &code, message))
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.link.shutdown().await;
        Ok(())
    }
}

// ============================================================================
// Link (request/reply correlation)
// ============================================================================

struct GatewayLink {
    account: String,
    cmd_tx: mpsc::Sender<GatewayCommand>,
    pending: PendingReplies,
    request_timeout: Duration,
}

impl GatewayLink {
    /// Send a command and wait for the event carrying the same request id.
    async fn request(
        &self,
        request_id: &str,
        command: GatewayCommand,
    ) -> Result<GatewayEvent, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(request_id.to_string(), reply_tx);

        if self.cmd_tx.send(command).await.is_err() {
            self.pending.remove(request_id);
            return Err(ConnectionError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(ConnectionError::network(format!(
                "gateway exited before answering request {request_id}"
            ))),
            Err(_) => {
                self.pending.remove(request_id);
                Err(ConnectionError::network(format!(
                    "no reply to request {request_id} within {}s",
                    self.request_timeout.as_secs_f32()
                )))
            }
        }
    }

    async fn shutdown(&self) {
        if self.cmd_tx.send(GatewayCommand::Shutdown).await.is_err() {
            debug!(account = %self.account, "Gateway already stopped");
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Bridge the child's stdio until it exits, is told to shut down, or every
/// command sender is dropped.
///
/// After `shutdown` is written the bridge keeps routing replies so requests
/// already sent still get their answer. It stops once the child exits or the
/// drain deadline passes: `request_timeout` while replies are outstanding,
/// [`SHUTDOWN_GRACE`] once none are.
async fn run_bridge(
    account: String,
    mut child: Child,
    mut cmd_rx: mpsc::Receiver<GatewayCommand>,
    evt_tx: mpsc::Sender<InboundEvent>,
    ready_tx: oneshot::Sender<Result<bool, ConnectionError>>,
    pending: PendingReplies,
    request_timeout: Duration,
) {
    let mut ready_tx = Some(ready_tx);
    let mut shutdown_deadline: Option<Instant> = None;

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        error!(account = %account, "Gateway stdio was not piped");
        let _ = child.kill().await;
        return;
    };
    let mut stdout_reader = BufReader::new(stdout).lines();

    loop {
        if let Some(deadline) = shutdown_deadline.as_mut()
            && pending.is_empty()
        {
            *deadline = (*deadline).min(Instant::now() + SHUTDOWN_GRACE);
        }

        tokio::select! {
            biased;

            line = stdout_reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let event = match serde_json::from_str::<GatewayEvent>(&line) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(account = %account, line = %line, error = %e, "Failed to parse gateway event");
                                continue;
                            }
                        };
                        if !handle_event(&account, event, &evt_tx, &mut ready_tx, &pending) {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(account = %account, "Gateway stdout closed");
                        break;
                    }
                    Err(e) => {
                        error!(account = %account, error = %e, "Error reading gateway stdout");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv(), if shutdown_deadline.is_none() => {
                let Some(command) = cmd else {
                    debug!(account = %account, "Command channel closed");
                    break;
                };
                let is_shutdown = matches!(command, GatewayCommand::Shutdown);
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(account = %account, error = %e, "Failed to serialize command");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut stdin, &json).await {
                    error!(account = %account, error = %e, "Failed to write to gateway stdin");
                    break;
                }
                if is_shutdown {
                    let drain = if pending.is_empty() { SHUTDOWN_GRACE } else { request_timeout };
                    debug!(account = %account, outstanding = pending.len(), "Draining gateway replies");
                    shutdown_deadline = Some(Instant::now() + drain);
                }
            }

            _ = sleep_until(shutdown_deadline.unwrap_or_else(Instant::now)), if shutdown_deadline.is_some() => {
                if !pending.is_empty() {
                    warn!(account = %account, outstanding = pending.len(), "Gateway did not answer before shutdown");
                }
                break;
            }

            status = child.wait() => {
                match status {
                    Ok(status) => info!(account = %account, status = %status, "Gateway exited"),
                    Err(e) => error!(account = %account, error = %e, "Error waiting for gateway"),
                }
                break;
            }
        }
    }

    // Fail anything still waiting on this gateway
    drop(cmd_rx);
    pending.clear();

    let _ = child.kill().await;
    let _ = child.wait().await;
    debug!(account = %account, "Gateway bridge finished");
}

/// Route one gateway event. Returns `false` when the bridge should stop.
fn handle_event(
    account: &str,
    event: GatewayEvent,
    evt_tx: &mpsc::Sender<InboundEvent>,
    ready_tx: &mut Option<oneshot::Sender<Result<bool, ConnectionError>>>,
    pending: &PendingReplies,
) -> bool {
    match event {
        GatewayEvent::Ready {
            authorized,
            version,
            ..
        } => {
            info!(account = %account, version = %version, authorized, "Gateway ready");
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(Ok(authorized));
            }
        }
        GatewayEvent::NewMessage(data) => {
            forward(account, evt_tx, InboundEvent::NewMessage(post(*data)))
        }
        GatewayEvent::MessageEdited(data) => {
            forward(account, evt_tx, InboundEvent::MessageEdited(post(*data)))
        }
        GatewayEvent::Error {
            code,
            message,
            fatal,
        } => {
            if fatal {
                error!(account = %account, code = %code, message = %message, "Fatal gateway error");
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(command_error(account, &code, message)));
                }
                return false;
            }
            warn!(account = %account, code = %code, message = %message, "Gateway error");
        }
        GatewayEvent::Shutdown { reason } => {
            info!(account = %account, reason = %reason, "Gateway shutting down");
            return false;
        }
        reply => {
            let waiter = reply.request_id().and_then(|id| pending.remove(id));
            match waiter {
                Some((_, tx)) => {
                    let _ = tx.send(reply);
                }
                None => debug!(account = %account, "Dropping reply with no pending request"),
            }
        }
    }
    true
}

/// Hand an inbound event to the session without blocking the bridge.
fn forward(account: &str, evt_tx: &mpsc::Sender<InboundEvent>, event: InboundEvent) {
    match evt_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(account = %account, "Event queue full, dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(account = %account, "No listener for inbound events");
        }
    }
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, json: &str) -> std::io::Result<()> {
    stdin.write_all(json.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

// ============================================================================
// Helpers
// ============================================================================

fn new_request_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

fn post(data: MessageData) -> IncomingPost {
    IncomingPost {
        chat_id: data.chat.id,
        chat_kind: data.chat.kind,
        message_id: data.message_id,
        text: data.text,
    }
}

/// Map a gateway error code onto the connection error taxonomy.
fn command_error(account: &str, code: &str, message: String) -> ConnectionError {
    match code {
        codes::AUTH_REQUIRED | codes::INVALID_CODE | codes::INVALID_PASSWORD => {
            ConnectionError::AuthRequired(account.to_string())
        }
        codes::PASSWORD_REQUIRED => ConnectionError::SecondFactorRequired(account.to_string()),
        _ => ConnectionError::Network(format!("{code}: {message}")),
    }
}

fn unexpected_reply(event: &GatewayEvent) -> ConnectionError {
    ConnectionError::network(format!("unexpected gateway reply: {event:?}"))
}
