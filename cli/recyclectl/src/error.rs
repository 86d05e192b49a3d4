//! Error handling and display for the CLI.

use colored::Colorize;
use recycle_core::ControlPlaneError;
use recycle_id::RunId;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Not authenticated. Set `api_token` in the config or RECYCLE_API_TOKEN.")]
    NotAuthenticated,

    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("Recycle run {run_id} failed")]
    RunFailed {
        run_id: RunId,
        /// Desired count to restore by hand, if the restore failed.
        restore_to: Option<u32>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an API error from response details.
    pub fn api(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
            request_id,
        }
    }
}

impl From<CliError> for ControlPlaneError {
    fn from(err: CliError) -> Self {
        match err {
            CliError::Api {
                status: 404,
                message,
                ..
            }
            | CliError::NotFound(message) => ControlPlaneError::NotFound(message),
            CliError::Api {
                status: 409,
                message,
                ..
            } => ControlPlaneError::Conflict(message),
            CliError::Api {
                status, message, ..
            } => ControlPlaneError::Api { status, message },
            CliError::NotAuthenticated => ControlPlaneError::Api {
                status: 401,
                message: "not authenticated".to_string(),
            },
            other => ControlPlaneError::Transport(other.to_string()),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::NotAuthenticated => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `recyclectl config path` to find the config file.".yellow()
                );
            }
            CliError::Api { status, .. } if *status == 403 => {
                eprintln!(
                    "\n{}",
                    "Hint: The gateway token may not allow this operation.".yellow()
                );
            }
            CliError::Api {
                request_id: Some(request_id),
                ..
            } => {
                eprintln!("\nRequest ID: {}", request_id);
            }
            CliError::Network(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check your network connection and `api_url`.".yellow()
                );
            }
            CliError::InvalidEvent(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Expected {\"cluster_name\", \"service_name\", \"maintain_service_state\", \"wait_time\"}."
                        .yellow()
                );
            }
            CliError::RunFailed {
                restore_to: Some(desired),
                ..
            } => {
                eprintln!(
                    "\n{}",
                    format!(
                        "Hint: Desired count was not restored. Set it back to {} by hand.",
                        desired
                    )
                    .yellow()
                );
            }
            CliError::RunFailed { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Nothing is retried automatically. Fix the cause and run again."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
