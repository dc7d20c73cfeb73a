//! Shared API types used by both the HTTP handlers and the CLI.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineStatus, StartReport, StopReport};
use crate::store::RegistryState;

// ============================================================================
// Account Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub phone: String,
    pub signed_in: bool,
    /// A verification code was requested and not yet confirmed.
    pub code_pending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAccountsResponse {
    pub accounts: Vec<AccountSummary>,
}

impl From<&RegistryState> for ListAccountsResponse {
    fn from(state: &RegistryState) -> Self {
        Self {
            accounts: state
                .accounts
                .iter()
                .map(|(phone, record)| AccountSummary {
                    phone: phone.clone(),
                    signed_in: record.signed_in,
                    code_pending: !record.signed_in && record.phone_code_hash.is_some(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAccountRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountActionResponse {
    pub phone: String,
    pub status: String,
}

// ============================================================================
// Comment Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCommentsResponse {
    pub comments: Vec<String>,
}

// ============================================================================
// Engine Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartFailureSummary {
    pub phone: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartEngineResponse {
    pub started: Vec<String>,
    pub failed: Vec<StartFailureSummary>,
}

impl From<&StartReport> for StartEngineResponse {
    fn from(report: &StartReport) -> Self {
        Self {
            started: report.started.clone(),
            failed: report
                .errors
                .iter()
                .map(|f| StartFailureSummary {
                    phone: f.account.clone(),
                    code: f.error.code().to_string(),
                    message: f.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopEngineResponse {
    pub closed: Vec<String>,
}

impl From<&StopReport> for StopEngineResponse {
    fn from(report: &StopReport) -> Self {
        Self {
            closed: report.closed.clone(),
        }
    }
}

/// Body of `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

// ============================================================================
// Log Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}
