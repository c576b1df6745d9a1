use smoke_poll::FetchError;
use thiserror::Error;

use crate::jsonpath::JsonPathError;

/// Errors from the `oc` command wrapper.
#[derive(Error, Debug)]
pub enum OcError {
    #[error("`{binary}` not found in PATH")]
    BinaryNotFound { binary: String },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}`: resource not found: {stderr}")]
    NotFound { command: String, stderr: String },

    #[error("`{command}`: unauthorized: {stderr}")]
    Unauthorized { command: String, stderr: String },

    #[error("`{command}`: unknown resource type: {stderr}")]
    UnknownKind { command: String, stderr: String },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command task failed: {0}")]
    Join(String),
}

impl OcError {
    /// Maps a non-zero exit to a variant by inspecting stderr.
    pub(crate) fn from_exit(
        command: String,
        code: Option<i32>,
        stderr: String,
    ) -> Self {
        let lower = stderr.to_ascii_lowercase();
        if lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("must be logged in")
            || lower.contains("you must log in")
        {
            OcError::Unauthorized { command, stderr }
        } else if lower.contains("doesn't have a resource type")
            || lower.contains("no matches for kind")
        {
            OcError::UnknownKind { command, stderr }
        } else if lower.contains("notfound") || lower.contains("not found") {
            OcError::NotFound { command, stderr }
        } else {
            OcError::Failed {
                command,
                code,
                stderr,
            }
        }
    }
}

impl From<OcError> for FetchError {
    fn from(value: OcError) -> Self {
        match value {
            OcError::NotFound { .. } => FetchError::NotFound(value.to_string()),
            OcError::Unauthorized { .. } => FetchError::Auth(value.to_string()),
            OcError::BinaryNotFound { .. } | OcError::UnknownKind { .. } => {
                FetchError::Invalid(value.to_string())
            }
            OcError::Spawn { .. } | OcError::Failed { .. } | OcError::Join(_) => {
                FetchError::Transient(value.to_string())
            }
        }
    }
}

/// Errors from building the kube-backed cluster client.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("failed to create kubernetes client: {0}")]
    Client(#[source] kube::Error),
}

/// Classifies a kube client error for the poller.
pub fn classify_kube_error(err: &kube::Error, context: &str) -> FetchError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 => FetchError::NotFound(format!("{context}: {}", resp.message)),
            401 | 403 => FetchError::Auth(format!("{context}: {}", resp.message)),
            400 | 422 => {
                FetchError::Invalid(format!("{context}: {}", resp.message))
            }
            _ => FetchError::Transient(format!("{context}: {}", resp.message)),
        },
        kube::Error::Auth(e) => FetchError::Auth(format!("{context}: {e}")),
        kube::Error::InferConfig(e) => {
            FetchError::Invalid(format!("{context}: {e}"))
        }
        kube::Error::Discovery(e) => {
            FetchError::Invalid(format!("{context}: {e}"))
        }
        other => FetchError::Transient(format!("{context}: {other}")),
    }
}

impl From<JsonPathError> for FetchError {
    fn from(value: JsonPathError) -> Self {
        FetchError::Invalid(value.to_string())
    }
}
