//! V1 API handlers.

mod accounts;
mod comments;
mod engine;
mod logs;
mod status;

pub use accounts::{confirm_account, list_accounts, remove_account, request_code, stop_account};
pub use comments::{add_comment, list_comments, remove_comment};
pub use engine::{start_engine, stop_engine};
pub use logs::get_logs;
pub use status::get_status;

use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::connector::ConnectionError;
use crate::control::ControlError;
use crate::engine::EngineError;
use crate::handlers::problem_details;
use crate::store::RegistryError;

/// Map a control failure to a problem details response.
fn control_error(e: ControlError) -> Response {
    let detail = e.to_string();
    let problem = match e {
        ControlError::Registry(RegistryError::AlreadySignedIn(_))
        | ControlError::AlreadyRunning => problem_details::conflict(detail),
        ControlError::Registry(RegistryError::CodeNotRequested(_))
        | ControlError::Registry(RegistryError::EmptyComment)
        | ControlError::Registry(RegistryError::InvalidAccount(_))
        | ControlError::NotEnoughAccountsOrComments
        | ControlError::NoSignedInAccounts => problem_details::bad_request(detail),
        ControlError::Engine(EngineError::Connection(
            ConnectionError::AuthRequired(_) | ConnectionError::SecondFactorRequired(_),
        )) => problem_details::bad_request(detail),
        ControlError::Engine(EngineError::Connection(_)) => problem_details::bad_gateway(detail),
        ControlError::Engine(EngineError::Runner(_)) => {
            error!(error = %detail, "Engine unavailable");
            problem_details::service_unavailable(detail)
        }
        ControlError::Registry(RegistryError::Storage(_)) => {
            error!(error = %detail, "Registry storage failed");
            problem_details::internal_error("failed to access account registry")
        }
    };
    problem.into_response()
}
